//! Выбор реализаций клиентов по `backend` из конфига.

#[cfg(feature = "kafka")]
mod kafka;
#[cfg(feature = "mongodb")]
mod mongo;

use std::sync::Arc;

use bridge_api::{DocumentStore, QueueClient};
use storage_file::{FileDocumentStore, FileStoreConfig};
use storage_memory::MemoryDocumentStore;
use topic_engine::{MemoryQueue, MemoryQueueConfig};

use crate::config::{EndpointConfig, StoreConfig};
use crate::error::BridgeError;

const PREVIEW_GROUP_SUFFIX: &str = "-preview";

// ═══════════════════════════════════════════════════════════════
//  Queue backends
// ═══════════════════════════════════════════════════════════════

pub enum Queue {
    Memory(MemoryQueue),
    #[cfg(feature = "kafka")]
    Kafka(kafka::KafkaQueue),
}

impl Queue {
    pub fn connect(label: &str, cfg: &EndpointConfig) -> Result<Self, BridgeError> {
        let queue = match cfg.backend.as_str() {
            "memory" => {
                let config = MemoryQueueConfig::from_properties(label, &cfg.properties)
                    .map_err(|e| e.with_context(label))?;
                Queue::Memory(MemoryQueue::new(config))
            }
            #[cfg(feature = "kafka")]
            "kafka" => Queue::Kafka(kafka::KafkaQueue::new(label, cfg.properties.clone())),
            #[cfg(not(feature = "kafka"))]
            "kafka" => {
                return Err(BridgeError::Backend {
                    backend: cfg.backend.clone(),
                    detail: "built without the 'kafka' feature".into(),
                });
            }
            other => {
                return Err(BridgeError::Backend {
                    backend: other.to_string(),
                    detail: format!("unknown queue backend for {label} (expected kafka | memory)"),
                });
            }
        };
        tracing::info!(endpoint = %label, backend = %cfg.backend, "queue client configured");
        Ok(queue)
    }

    /// Клиент того же кластера с отдельной consumer group и без commit'а
    /// offset'ов: preview не сдвигает позицию sink'а.
    pub fn preview_client(&self) -> Arc<dyn QueueClient> {
        match self {
            Queue::Memory(q) => {
                let group = format!("{}{PREVIEW_GROUP_SUFFIX}", q.config().group_id);
                Arc::new(q.with_group(group))
            }
            #[cfg(feature = "kafka")]
            Queue::Kafka(q) => Arc::new(q.preview(PREVIEW_GROUP_SUFFIX)),
        }
    }

    pub fn into_client(self) -> Arc<dyn QueueClient> {
        match self {
            Queue::Memory(q) => Arc::new(q),
            #[cfg(feature = "kafka")]
            Queue::Kafka(q) => Arc::new(q),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Document store backends
// ═══════════════════════════════════════════════════════════════

pub fn document_store(cfg: &StoreConfig) -> Result<Arc<dyn DocumentStore>, BridgeError> {
    let store: Arc<dyn DocumentStore> = match cfg.backend.as_str() {
        "memory" => Arc::new(MemoryDocumentStore::default()),
        "file" => Arc::new(FileDocumentStore::new(&FileStoreConfig { data_dir: cfg.data_dir.clone() })),
        #[cfg(feature = "mongodb")]
        "mongodb" => Arc::new(mongo::MongoStore::new(&cfg.url)?),
        #[cfg(not(feature = "mongodb"))]
        "mongodb" => {
            return Err(BridgeError::Backend {
                backend: cfg.backend.clone(),
                detail: "built without the 'mongodb' feature".into(),
            });
        }
        other => {
            return Err(BridgeError::Backend {
                backend: other.to_string(),
                detail: "unknown store backend (expected mongodb | file | memory)".into(),
            });
        }
    };
    tracing::info!(backend = %cfg.backend, database = %cfg.database, collection = %cfg.collection, "document store configured");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_api::RecordValue;
    use std::time::Duration;

    fn endpoint(backend: &str) -> EndpointConfig {
        let mut cfg = EndpointConfig::new("out");
        cfg.backend = backend.into();
        cfg
    }

    #[tokio::test]
    async fn memory_preview_client_has_own_group() {
        let q = MemoryQueue::new(MemoryQueueConfig::new("destination"));
        q.publish("out", None, RecordValue::Text("x".into()));
        let queue = Queue::Memory(q);

        let preview = queue.preview_client();
        let client = queue.into_client();

        let mut sink = client.new_consumer("out").await.unwrap();
        let mut peek = preview.new_consumer("out").await.unwrap();
        assert!(peek.poll(Duration::from_millis(10)).await.unwrap().is_some());
        // позиция основной группы не сдвинулась
        assert!(sink.poll(Duration::from_millis(10)).await.unwrap().is_some());
    }

    #[test]
    fn memory_backend_reads_client_properties() {
        let mut cfg = endpoint("memory");
        cfg.properties.insert("group.id".into(), "bridge".into());
        let queue = Queue::connect("destination", &cfg).unwrap();
        match &queue {
            Queue::Memory(q) => assert_eq!(q.config().group_id, "bridge"),
            #[allow(unreachable_patterns)]
            _ => panic!("expected memory queue"),
        }
    }

    #[test]
    fn unknown_backends_are_rejected() {
        assert!(matches!(
            Queue::connect("source", &endpoint("pulsar")),
            Err(BridgeError::Backend { .. })
        ));
        let mut store = StoreConfig::new("db", "c");
        store.backend = "redis".into();
        assert!(matches!(document_store(&store), Err(BridgeError::Backend { .. })));
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn kafka_requires_feature() {
        let err = Queue::connect("source", &endpoint("kafka")).err().unwrap();
        assert!(err.to_string().contains("'kafka' feature"));
    }

    #[tokio::test]
    async fn file_store_writes_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = StoreConfig::new("bridge", "events");
        cfg.backend = "file".into();
        cfg.data_dir = dir.path().to_string_lossy().into_owned();

        let store = document_store(&cfg).unwrap();
        let coll = store.collection(&cfg.database, &cfg.collection).await.unwrap();
        coll.insert_one(serde_json::json!({"a": 1})).await.unwrap();
        store.close().await.unwrap();

        assert!(dir.path().join("bridge").join("events.jsonl").exists());
    }

    #[test]
    fn bad_memory_properties_are_client_errors() {
        let mut cfg = endpoint("memory");
        cfg.properties.insert("auto.offset.reset".into(), "sideways".into());
        assert!(matches!(Queue::connect("source", &cfg), Err(BridgeError::Client(_))));
    }
}
