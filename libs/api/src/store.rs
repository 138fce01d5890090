use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{DocumentId, PluginError};

// ════════════════════════════════════════════════════════════════
//  Document Store Traits
// ════════════════════════════════════════════════════════════════

/// Коллекция документов без схемы. Только запись.
pub trait DocumentCollection: Send + Sync {
    /// Имя коллекции (для логов).
    fn name(&self) -> &str;

    /// Вставить один документ, вернуть его id.
    fn insert_one(
        &self,
        document: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<DocumentId, PluginError>> + Send + '_>>;
}

/// Подключение к document store.
pub trait DocumentStore: Send + Sync {
    /// Handle коллекции `name` в базе `db`.
    fn collection(
        &self,
        db: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn DocumentCollection>, PluginError>> + Send + '_>>;

    /// Закрыть подключение. Повторный вызов — no-op.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>>;
}
