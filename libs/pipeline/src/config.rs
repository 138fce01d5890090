use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::PipelineError;

// ═══════════════════════════════════════════════════════════════
//  Endpoint Config
// ═══════════════════════════════════════════════════════════════

/// Один кластер очереди (source или destination).
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Backend клиента: "kafka" или "memory".
    #[serde(default = "default_queue_backend")]
    pub backend: String,
    /// Topic, который читает (source) или в который пишет (destination) pipeline.
    pub topic: String,
    /// Topic для sentinel-probe. Если не задан, используется topic
    /// destination'а (для обоих endpoint'ов).
    #[serde(default)]
    pub probe_topic: Option<String>,
    /// Client properties (`bootstrap.servers`, `group.id`, ...).
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl EndpointConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            backend: default_queue_backend(),
            topic: topic.into(),
            probe_topic: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn validate(&self, label: &str) -> Result<(), PipelineError> {
        if self.topic.trim().is_empty() {
            return Err(PipelineError::Config(format!("{label}: topic must not be empty")));
        }
        if matches!(&self.probe_topic, Some(t) if t.trim().is_empty()) {
            return Err(PipelineError::Config(format!("{label}: probe_topic must not be empty")));
        }
        Ok(())
    }
}

fn default_queue_backend() -> String {
    "kafka".into()
}

// ═══════════════════════════════════════════════════════════════
//  Store Config
// ═══════════════════════════════════════════════════════════════

/// Document store, в который пишет sink.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// "mongodb", "file" или "memory".
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default = "default_store_url")]
    pub url: String,
    pub database: String,
    pub collection: String,
    /// Каталог данных для backend = "file".
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl StoreConfig {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            backend: default_store_backend(),
            url: default_store_url(),
            database: database.into(),
            collection: collection.into(),
            data_dir: default_data_dir(),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.database.trim().is_empty() {
            return Err(PipelineError::Config("store: database must not be empty".into()));
        }
        if self.collection.trim().is_empty() {
            return Err(PipelineError::Config("store: collection must not be empty".into()));
        }
        Ok(())
    }
}

fn default_store_backend() -> String {
    "mongodb".into()
}
fn default_store_url() -> String {
    "mongodb://localhost:27017".into()
}
fn default_data_dir() -> String {
    "data".into()
}

// ═══════════════════════════════════════════════════════════════
//  Pipeline Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Relay и sink — независимые задачи.
    #[default]
    Concurrent,
    /// Relay, затем preview destination topic'а, затем sink.
    Sequential,
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "concurrent" => Ok(Self::Concurrent),
            "sequential" => Ok(Self::Sequential),
            other => Err(format!("unknown mode '{other}' (expected concurrent|sequential)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMode {
    /// Записать sentinel в probe topic и сделать flush. Sentinel остаётся
    /// в topic'е и позже попадает в store как `{"message": "<sentinel>"}`.
    #[default]
    Sentinel,
    /// Metadata-запрос к кластеру, без записи.
    Metadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    #[serde(default = "default_flush_timeout_ms")]
    pub flush_timeout_ms: u64,
    /// Relay останавливается после стольких доставленных записей.
    #[serde(default)]
    pub max_records: Option<u64>,
    /// Sink останавливается после стольких пустых poll'ов подряд.
    #[serde(default)]
    pub max_idle_polls: Option<u32>,
    /// Пересылать ключ исходной записи.
    #[serde(default)]
    pub forward_keys: bool,
    /// Сколько записей показать между relay и sink (sequential режим, 0 = выкл).
    #[serde(default = "default_preview_records")]
    pub preview_records: usize,
    #[serde(default = "default_preview_poll_timeout_ms")]
    pub preview_poll_timeout_ms: u64,
    #[serde(default)]
    pub probe: ProbeMode,
    #[serde(default = "default_sentinel_payload")]
    pub sentinel_payload: String,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            poll_timeout_ms: default_poll_timeout_ms(),
            flush_timeout_ms: default_flush_timeout_ms(),
            max_records: None,
            max_idle_polls: None,
            forward_keys: false,
            preview_records: default_preview_records(),
            preview_poll_timeout_ms: default_preview_poll_timeout_ms(),
            probe: ProbeMode::default(),
            sentinel_payload: default_sentinel_payload(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl PipelineConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn preview_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.preview_poll_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let timeouts = [
            ("poll_timeout_ms", self.poll_timeout_ms),
            ("flush_timeout_ms", self.flush_timeout_ms),
            ("preview_poll_timeout_ms", self.preview_poll_timeout_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(PipelineError::Config(format!("pipeline: {name} must be > 0")));
            }
        }
        if self.max_idle_polls == Some(0) {
            return Err(PipelineError::Config("pipeline: max_idle_polls must be > 0".into()));
        }
        // без лимита relay идёт до отмены, и preview/sink стартуют уже отменёнными
        if self.mode == ExecutionMode::Sequential && self.max_records.is_none() {
            return Err(PipelineError::Config(
                "pipeline: sequential mode requires max_records".into(),
            ));
        }
        if self.probe == ProbeMode::Sentinel && self.sentinel_payload.is_empty() {
            return Err(PipelineError::Config("pipeline: sentinel_payload must not be empty".into()));
        }
        Ok(())
    }
}

fn default_poll_timeout_ms() -> u64 {
    1000
}
fn default_flush_timeout_ms() -> u64 {
    10_000
}
fn default_preview_records() -> usize {
    5
}
fn default_preview_poll_timeout_ms() -> u64 {
    2000
}
fn default_sentinel_payload() -> String {
    "connection_test".into()
}
fn default_probe_timeout_ms() -> u64 {
    10_000
}
