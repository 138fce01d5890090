use bridge_api::PluginError;

/// Почему запись не была доставлена, хотя ошибки клиента не было.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Запись без значения (tombstone).
    Absent,
    /// Тип значения не поддерживается нормализатором.
    Unsupported { kind: &'static str },
    /// Map не удалось сериализовать в JSON.
    Unencodable(String),
    /// Sink ожидает текст или байты.
    NonBytePayload { kind: &'static str },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Absent => f.write_str("absent value"),
            SkipReason::Unsupported { kind } => write!(f, "unsupported value type '{kind}'"),
            SkipReason::Unencodable(e) => write!(f, "json encode failed: {e}"),
            SkipReason::NonBytePayload { kind } => write!(f, "expected text or bytes, got '{kind}'"),
        }
    }
}

/// Результат обработки одной записи.
#[derive(Debug, Clone)]
pub enum Outcome {
    Delivered,
    Skipped(SkipReason),
    /// Ошибка клиента или формата на этой записи; цикл продолжается.
    TransientError(PluginError),
}

/// Причина остановки цикла.
#[derive(Debug, Clone)]
pub enum StopReason {
    /// Внешний сигнал остановки.
    Cancelled,
    /// Достигнут `max_records`.
    LimitReached,
    /// `max_idle_polls` пустых poll'ов подряд.
    IdleTimeout,
    /// Неустранимая ошибка handle'а.
    Fatal(PluginError),
    /// Задача цикла паниковала.
    Panicked(String),
    /// Цикл не запускался (отмена до старта в sequential режиме).
    NotStarted,
}

impl StopReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, StopReason::Fatal(_) | StopReason::Panicked(_))
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::LimitReached => f.write_str("record limit reached"),
            StopReason::IdleTimeout => f.write_str("idle poll limit reached"),
            StopReason::Fatal(e) => write!(f, "fatal error: {e}"),
            StopReason::Panicked(msg) => write!(f, "panicked: {msg}"),
            StopReason::NotStarted => f.write_str("not started"),
        }
    }
}

/// Итог работы одного цикла.
#[derive(Debug, Clone)]
pub struct LoopReport {
    pub delivered: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Транспортные ошибки poll'а (запись не получена).
    pub poll_errors: u64,
    pub empty_polls: u64,
    pub stop: StopReason,
}

impl Default for LoopReport {
    fn default() -> Self {
        Self {
            delivered: 0,
            skipped: 0,
            failed: 0,
            poll_errors: 0,
            empty_polls: 0,
            stop: StopReason::NotStarted,
        }
    }
}

impl LoopReport {
    pub fn stopped(stop: StopReason) -> Self {
        Self { stop, ..Self::default() }
    }

    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Delivered => self.delivered += 1,
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::TransientError(_) => self.failed += 1,
        }
    }
}

/// Итог работы pipeline целиком.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub relay: LoopReport,
    pub sink: LoopReport,
    /// Сколько записей показал preview (только sequential режим).
    pub previewed: Option<usize>,
}

impl PipelineReport {
    pub fn has_failure(&self) -> bool {
        self.relay.stop.is_failure() || self.sink.stop.is_failure()
    }
}
