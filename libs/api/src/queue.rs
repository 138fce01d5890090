use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::{ClusterInfo, PluginError, Record};

// ════════════════════════════════════════════════════════════════
//  Queue Client Traits
// ════════════════════════════════════════════════════════════════

/// Read cursor, привязанный к одному topic'у на всё время жизни.
///
/// Семантика доставки (at-least-once / best-effort) определяется
/// commit-политикой конкретного клиента, не pipeline'ом.
pub trait Consumer: Send {
    /// Topic, на который подписан consumer.
    fn topic(&self) -> &str;

    /// Bounded poll: вернуть следующую запись или `None`, если за `timeout`
    /// ничего не пришло. Обязан вернуть управление в пределах `timeout`.
    ///
    /// `Err` с kind != Fatal — транспортная ошибка конкретного poll'а;
    /// `ErrorKind::Fatal` — consumer непригоден (закрыт, сломан).
    fn poll(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Record>, PluginError>> + Send + '_>>;

    /// Закрыть consumer. Повторный вызов — no-op.
    fn close(&mut self) -> Result<(), PluginError>;
}

/// Write handle. Отправка асинхронная (enqueue), доставка подтверждается
/// только `flush`. Перед `close` обязателен `flush`.
pub trait Producer: Send {
    /// Поставить запись в очередь на отправку (fire-and-forget).
    fn send(&mut self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(), PluginError>;

    /// Дождаться доставки всех буферизованных записей (bounded).
    fn flush(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;

    /// Закрыть producer. Повторный вызов — no-op.
    fn close(&mut self) -> Result<(), PluginError>;
}

/// Фабрика handle'ов для одного кластера (endpoint'а).
pub trait QueueClient: Send + Sync {
    /// Создать consumer и подписать его на `topic`.
    fn new_consumer(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Consumer>, PluginError>> + Send + '_>>;

    /// Создать producer.
    fn new_producer(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Producer>, PluginError>> + Send + '_>>;

    /// Metadata-запрос к кластеру (без записи данных).
    /// По умолчанию не поддерживается.
    fn describe(
        &self,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<ClusterInfo, PluginError>> + Send + '_>> {
        Box::pin(async { Err(PluginError::unsupported("describe is not supported by this client")) })
    }
}
