use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::RwLock;

use bridge_api::{DocumentCollection, DocumentId, DocumentStore, PluginError};

// ═══════════════════════════════════════════════════════════════
//  MemoryStoreConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_documents() -> usize {
    100_000
}

#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Максимум документов на коллекцию; старые вытесняются.
    pub max_documents: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_documents: default_max_documents(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryCollection
// ═══════════════════════════════════════════════════════════════

/// In-memory ring-buffer коллекция. Для тестов и прогонов без
/// внешнего document store.
pub struct MemoryCollection {
    name: String,
    documents: RwLock<VecDeque<(DocumentId, serde_json::Value)>>,
    max_documents: usize,
    next_id: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl MemoryCollection {
    /// Снимок документов в порядке вставки.
    pub async fn documents(&self) -> Vec<serde_json::Value> {
        self.documents.read().await.iter().map(|(_, d)| d.clone()).collect()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_one(
        &self,
        document: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<DocumentId, PluginError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed.load(Ordering::Acquire) {
                return Err(PluginError::closed("document store"));
            }
            let id = DocumentId(format!("{:024x}", self.next_id.fetch_add(1, Ordering::Relaxed)));
            let mut docs = self.documents.write().await;
            if docs.len() >= self.max_documents {
                docs.pop_front();
            }
            docs.push_back((id.clone(), document));
            Ok(id)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryDocumentStore
// ═══════════════════════════════════════════════════════════════

pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<(String, String), Arc<MemoryCollection>>>,
    config: MemoryStoreConfig,
    next_id: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

impl MemoryDocumentStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            config,
            next_id: Arc::new(AtomicU64::new(1)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Конкретный тип коллекции (для просмотра содержимого).
    pub async fn memory_collection(&self, db: &str, name: &str) -> Arc<MemoryCollection> {
        let mut collections = self.collections.write().await;
        collections
            .entry((db.to_string(), name.to_string()))
            .or_insert_with(|| {
                Arc::new(MemoryCollection {
                    name: name.to_string(),
                    documents: RwLock::new(VecDeque::new()),
                    max_documents: self.config.max_documents,
                    next_id: self.next_id.clone(),
                    closed: self.closed.clone(),
                })
            })
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn collection(
        &self,
        db: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn DocumentCollection>, PluginError>> + Send + '_>> {
        let db = db.to_string();
        let name = name.to_string();
        Box::pin(async move {
            if self.is_closed() {
                return Err(PluginError::closed("document store"));
            }
            let collection: Arc<dyn DocumentCollection> = self.memory_collection(&db, &name).await;
            Ok(collection)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::Release);
            Ok(())
        })
    }
}
