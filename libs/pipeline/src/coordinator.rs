use std::sync::Arc;

use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use bridge_api::{DocumentCollection, DocumentStore, QueueClient};

use crate::config::{EndpointConfig, ExecutionMode, PipelineConfig, StoreConfig};
use crate::error::PipelineError;
use crate::handles::{ConsumerHandle, ProducerHandle};
use crate::outcome::{LoopReport, PipelineReport, StopReason};
use crate::preview::preview;
use crate::probe::{ProbeSettings, probe};
use crate::relay::{RelayLoop, RelaySettings};
use crate::sink::{SinkLoop, SinkSettings};

/// Внешние клиенты pipeline'а. Создаются вызывающим, store закрывается
/// coordinator'ом после остановки обоих циклов.
#[derive(Clone)]
pub struct Clients {
    pub source: Arc<dyn QueueClient>,
    pub destination: Arc<dyn QueueClient>,
    /// Клиент для preview destination topic'а со своей consumer group,
    /// чтобы не сдвигать позицию sink'а. `None` — preview выключен.
    pub preview: Option<Arc<dyn QueueClient>>,
    pub store: Arc<dyn DocumentStore>,
}

/// Handle'ы, построенные до запуска циклов.
struct Handles {
    source: ConsumerHandle,
    producer: ProducerHandle,
    sink: ConsumerHandle,
    preview: Option<ConsumerHandle>,
    collection: Arc<dyn DocumentCollection>,
}

// ═══════════════════════════════════════════════════════════════
//  Coordinator
// ═══════════════════════════════════════════════════════════════

pub struct Coordinator {
    clients: Clients,
    source: EndpointConfig,
    destination: EndpointConfig,
    store: StoreConfig,
    pipeline: PipelineConfig,
}

impl Coordinator {
    pub fn new(
        clients: Clients,
        source: EndpointConfig,
        destination: EndpointConfig,
        store: StoreConfig,
        pipeline: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        source.validate("source")?;
        destination.validate("destination")?;
        store.validate()?;
        pipeline.validate()?;
        Ok(Self { clients, source, destination, store, pipeline })
    }

    /// Probe → handles → relay + sink → закрыть store.
    ///
    /// `Err` только при ошибке старта (ни один цикл не запускался).
    /// Store client закрывается в любом случае.
    pub async fn run(&self, token: CancellationToken) -> Result<PipelineReport, PipelineError> {
        let result = self.start(&token).await;
        match self.clients.store.close().await {
            Ok(()) => tracing::info!("document store closed"),
            Err(e) => tracing::warn!(error = ?e, "document store close failed"),
        }
        result
    }

    async fn start(&self, token: &CancellationToken) -> Result<PipelineReport, PipelineError> {
        self.check_connectivity().await?;
        let handles = self.build_handles().await?;
        tracing::info!(mode = ?self.pipeline.mode, "pipeline started");

        let report = match self.pipeline.mode {
            ExecutionMode::Concurrent => self.run_concurrent(handles, token).await,
            ExecutionMode::Sequential => self.run_sequential(handles, token).await,
        };

        tracing::info!(
            relay = %report.relay.stop,
            sink = %report.sink.stop,
            delivered = report.relay.delivered,
            stored = report.sink.delivered,
            "pipeline finished"
        );
        Ok(report)
    }

    /// Проверить оба endpoint'а (каждая неудача логируется), затем
    /// отказать, если хотя бы один недоступен.
    async fn check_connectivity(&self) -> Result<(), PipelineError> {
        let settings = ProbeSettings::from(&self.pipeline);
        let endpoints = [
            ("source", &self.clients.source, self.probe_topic(&self.source)),
            ("destination", &self.clients.destination, self.probe_topic(&self.destination)),
        ];

        let mut unreachable = Vec::new();
        for (label, client, topic) in endpoints {
            let ok = probe(&**client, topic, label, &settings)
                .instrument(tracing::info_span!("probe", endpoint = label))
                .await;
            if !ok {
                unreachable.push(label.to_string());
            }
        }

        if unreachable.is_empty() {
            Ok(())
        } else {
            tracing::error!(endpoints = ?unreachable, "connectivity check failed, not starting");
            Err(PipelineError::Unreachable(unreachable))
        }
    }

    /// Probe topic endpoint'а; по умолчанию destination topic.
    fn probe_topic<'a>(&'a self, endpoint: &'a EndpointConfig) -> &'a str {
        endpoint.probe_topic.as_deref().unwrap_or(&self.destination.topic)
    }

    /// Построить все handle'ы. При ошибке уже созданные закрываются
    /// (через `Drop`) до возврата.
    async fn build_handles(&self) -> Result<Handles, PipelineError> {
        let source_topic = &self.source.topic;
        let destination_topic = &self.destination.topic;

        let source = self
            .clients
            .source
            .new_consumer(source_topic)
            .await
            .map_err(|e| construct("source consumer", source_topic, e))?;
        let source = ConsumerHandle::new("relay source", source);
        tracing::info!(topic = %source_topic, "source consumer subscribed");

        let producer = self
            .clients
            .destination
            .new_producer()
            .await
            .map_err(|e| construct("destination producer", destination_topic, e))?;
        let producer = ProducerHandle::new("relay destination", producer);
        tracing::info!(topic = %destination_topic, "destination producer created");

        let sink = self
            .clients
            .destination
            .new_consumer(destination_topic)
            .await
            .map_err(|e| construct("sink consumer", destination_topic, e))?;
        let sink = ConsumerHandle::new("sink source", sink);
        tracing::info!(topic = %destination_topic, "sink consumer subscribed");

        let wants_preview = self.pipeline.mode == ExecutionMode::Sequential && self.pipeline.preview_records > 0;
        let preview = match &self.clients.preview {
            Some(client) if wants_preview => {
                let consumer = client
                    .new_consumer(destination_topic)
                    .await
                    .map_err(|e| construct("preview consumer", destination_topic, e))?;
                Some(ConsumerHandle::new("preview", consumer))
            }
            None if wants_preview => {
                // consumer sink'овой группы забрал бы записи у store
                tracing::warn!(topic = %destination_topic, "no separate preview client, preview disabled");
                None
            }
            _ => None,
        };

        let target = format!("{}.{}", self.store.database, self.store.collection);
        let collection = self
            .clients
            .store
            .collection(&self.store.database, &self.store.collection)
            .await
            .map_err(|e| construct("store collection", &target, e))?;
        tracing::info!(collection = %target, backend = %self.store.backend, "store collection ready");

        Ok(Handles { source, producer, sink, preview, collection })
    }

    fn relay(&self, source: ConsumerHandle, producer: ProducerHandle) -> RelayLoop {
        RelayLoop::from_handles(
            source,
            producer,
            self.destination.topic.clone(),
            RelaySettings::from(&self.pipeline),
        )
    }

    async fn run_concurrent(&self, handles: Handles, token: &CancellationToken) -> PipelineReport {
        let Handles { source, producer, sink, preview: _, collection } = handles;
        let relay = self.relay(source, producer);
        let sink = SinkLoop::from_handle(sink, collection, SinkSettings::from(&self.pipeline));

        let relay_task = tokio::spawn(relay.run(token.clone()).instrument(tracing::info_span!("relay")));
        let sink_task = tokio::spawn(sink.run(token.clone()).instrument(tracing::info_span!("sink")));
        let (relay, sink) = tokio::join!(relay_task, sink_task);

        PipelineReport {
            relay: joined("relay", relay),
            sink: joined("sink", sink),
            previewed: None,
        }
    }

    async fn run_sequential(&self, handles: Handles, token: &CancellationToken) -> PipelineReport {
        let Handles { source, producer, sink, preview: preview_consumer, collection } = handles;
        let relay = self.relay(source, producer);
        let sink = SinkLoop::from_handle(sink, collection, SinkSettings::from(&self.pipeline));

        let relay = tokio::spawn(relay.run(token.clone()).instrument(tracing::info_span!("relay"))).await;
        let relay = joined("relay", relay);

        let previewed = match preview_consumer {
            Some(mut consumer) => {
                let shown = preview(
                    &mut consumer,
                    self.pipeline.preview_records,
                    self.pipeline.preview_poll_timeout(),
                    token,
                )
                .instrument(tracing::info_span!("preview"))
                .await;
                consumer.shutdown();
                match shown {
                    Ok(n) => Some(n),
                    Err(e) => {
                        tracing::error!(error = ?e, "preview failed");
                        None
                    }
                }
            }
            None => None,
        };

        let sink = tokio::spawn(sink.run(token.clone()).instrument(tracing::info_span!("sink"))).await;
        PipelineReport {
            relay,
            sink: joined("sink", sink),
            previewed,
        }
    }
}

fn construct(handle: &'static str, target: &str, source: bridge_api::PluginError) -> PipelineError {
    tracing::error!(handle, target = %target, error = ?source, "handle construction failed");
    PipelineError::Construct { handle, target: target.to_string(), source }
}

/// Отчёт задачи цикла; паника превращается в `StopReason::Panicked`.
fn joined(name: &str, result: Result<LoopReport, JoinError>) -> LoopReport {
    match result {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(task = %name, error = %e, "loop task failed");
            LoopReport::stopped(StopReason::Panicked(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::pin::Pin;
    use std::time::Duration;

    use bridge_api::{DocumentId, Field, PluginError, RecordValue, StructuredMap};
    use serde_json::json;
    use storage_memory::MemoryDocumentStore;
    use topic_engine::{MemoryQueue, MemoryQueueConfig};
    use tracing_test::traced_test;

    use crate::config::ProbeMode;
    use crate::testing::CountingClient;

    fn endpoints() -> (EndpointConfig, EndpointConfig, StoreConfig) {
        (EndpointConfig::new("in"), EndpointConfig::new("out"), StoreConfig::new("bridge", "events"))
    }

    fn clients(
        source: Arc<dyn QueueClient>,
        destination: Arc<dyn QueueClient>,
        store: Arc<dyn DocumentStore>,
    ) -> Clients {
        Clients { source, destination, preview: None, store }
    }

    fn publish_sample(q: &MemoryQueue) {
        let mut map = StructuredMap::new();
        map.insert("a".into(), Field::Json(json!(1)));
        q.publish("in", None, RecordValue::Map(map));
        q.publish("in", None, RecordValue::Text("hello".into()));
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn both_probe_failures_are_logged_and_nothing_is_built() {
        let src_queue = MemoryQueue::new(MemoryQueueConfig::new("src"));
        let dst_queue = MemoryQueue::new(MemoryQueueConfig::new("dst"));
        src_queue.set_reachable(false);
        dst_queue.set_reachable(false);
        let src = CountingClient::new(src_queue);
        let dst = CountingClient::new(dst_queue);
        let store = Arc::new(MemoryDocumentStore::default());
        let (s, d, st) = endpoints();

        let coordinator =
            Coordinator::new(clients(src.clone(), dst.clone(), store.clone()), s, d, st, PipelineConfig::default())
                .unwrap();
        let err = coordinator.run(CancellationToken::new()).await.unwrap_err();

        match err {
            PipelineError::Unreachable(labels) => assert_eq!(labels, vec!["source", "destination"]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(src.consumers_built() + dst.consumers_built(), 0);
        assert_eq!(src.producers_built() + dst.producers_built(), 0);
        assert!(store.is_closed());
        assert!(logs_contain("endpoint=source"));
        assert!(logs_contain("endpoint=destination"));
        assert!(logs_contain("endpoint unreachable"));
    }

    #[tokio::test(start_paused = true)]
    async fn one_unreachable_endpoint_aborts_start() {
        let src = MemoryQueue::new(MemoryQueueConfig::new("src"));
        let dst = CountingClient::new(MemoryQueue::new(MemoryQueueConfig::new("dst")));
        dst.queue.set_reachable(false);
        let store = Arc::new(MemoryDocumentStore::default());
        let (s, d, st) = endpoints();

        let coordinator =
            Coordinator::new(clients(Arc::new(src), dst.clone(), store), s, d, st, PipelineConfig::default())
                .unwrap();
        let err = coordinator.run(CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Unreachable(ref l) if l == &vec!["destination".to_string()]));
        assert_eq!(dst.consumers_built(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_pipeline_relays_and_stores() {
        let src = MemoryQueue::new(MemoryQueueConfig::new("src"));
        let dst = MemoryQueue::new(MemoryQueueConfig::new("dst"));
        publish_sample(&src);
        let store = Arc::new(MemoryDocumentStore::default());
        let (s, d, st) = endpoints();
        let cfg = PipelineConfig { max_records: Some(2), max_idle_polls: Some(2), ..PipelineConfig::default() };

        let coordinator =
            Coordinator::new(clients(Arc::new(src.clone()), Arc::new(dst.clone()), store.clone()), s, d, st, cfg)
                .unwrap();
        let report = coordinator.run(CancellationToken::new()).await.unwrap();

        assert!(matches!(report.relay.stop, StopReason::LimitReached));
        assert!(matches!(report.sink.stop, StopReason::IdleTimeout));
        assert!(!report.has_failure());

        // sentinel probe пишет в destination topic на обоих кластерах
        assert_eq!(src.records("out").len(), 1);
        let relayed: Vec<RecordValue> = dst.records("out").into_iter().map(|r| r.value).collect();
        assert_eq!(
            relayed,
            vec![
                RecordValue::Bytes(b"connection_test".to_vec()),
                RecordValue::Bytes(br#"{"a":1}"#.to_vec()),
                RecordValue::Bytes(b"hello".to_vec()),
            ]
        );

        let docs = store.memory_collection("bridge", "events").await.documents().await;
        assert_eq!(
            docs,
            vec![json!({"message": "connection_test"}), json!({"a": 1}), json!({"message": "hello"})]
        );
        assert!(store.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_pipeline_previews_between_relay_and_sink() {
        let src = MemoryQueue::new(MemoryQueueConfig::new("src"));
        let dst = MemoryQueue::new(MemoryQueueConfig::new("dst"));
        publish_sample(&src);
        let store = Arc::new(MemoryDocumentStore::default());
        let (s, d, st) = endpoints();
        let cfg = PipelineConfig {
            mode: ExecutionMode::Sequential,
            probe: ProbeMode::Metadata,
            max_records: Some(2),
            max_idle_polls: Some(1),
            preview_records: 2,
            ..PipelineConfig::default()
        };
        let clients = Clients {
            source: Arc::new(src),
            destination: Arc::new(dst.clone()),
            preview: Some(Arc::new(dst.with_group("preview"))),
            store: store.clone(),
        };

        let report = Coordinator::new(clients, s, d, st, cfg)
            .unwrap()
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.previewed, Some(2));
        assert_eq!(report.relay.delivered, 2);
        assert_eq!(report.sink.delivered, 2);
        let docs = store.memory_collection("bridge", "events").await.documents().await;
        assert_eq!(docs, vec![json!({"a": 1}), json!({"message": "hello"})]);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn sequential_pipeline_without_preview_client_keeps_every_record() {
        let src = MemoryQueue::new(MemoryQueueConfig::new("src"));
        let dst = MemoryQueue::new(MemoryQueueConfig::new("dst"));
        publish_sample(&src);
        let store = Arc::new(MemoryDocumentStore::default());
        let (s, d, st) = endpoints();
        let cfg = PipelineConfig {
            mode: ExecutionMode::Sequential,
            probe: ProbeMode::Metadata,
            max_records: Some(2),
            max_idle_polls: Some(1),
            preview_records: 2,
            ..PipelineConfig::default()
        };

        let report = Coordinator::new(clients(Arc::new(src), Arc::new(dst), store.clone()), s, d, st, cfg)
            .unwrap()
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.previewed, None);
        assert_eq!(report.relay.delivered, 2);
        assert_eq!(report.sink.delivered, 2);
        let docs = store.memory_collection("bridge", "events").await.documents().await;
        assert_eq!(docs, vec![json!({"a": 1}), json!({"message": "hello"})]);
        assert!(logs_contain("preview disabled"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_both_loops() {
        let src = MemoryQueue::new(MemoryQueueConfig::new("src"));
        let dst = MemoryQueue::new(MemoryQueueConfig::new("dst"));
        let store = Arc::new(MemoryDocumentStore::default());
        let (s, d, st) = endpoints();
        let cfg = PipelineConfig { probe: ProbeMode::Metadata, ..PipelineConfig::default() };
        let coordinator =
            Coordinator::new(clients(Arc::new(src), Arc::new(dst), store.clone()), s, d, st, cfg).unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            canceller.cancel();
        });
        let report = coordinator.run(token).await.unwrap();

        assert!(matches!(report.relay.stop, StopReason::Cancelled));
        assert!(matches!(report.sink.stop, StopReason::Cancelled));
        assert!(store.is_closed());
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn construction_failure_closes_built_handles() {
        let src = MemoryQueue::new(MemoryQueueConfig::new("src"));
        let dst = CountingClient::new(MemoryQueue::new(MemoryQueueConfig::new("dst")));
        dst.fail_consumers(PluginError::io("group coordinator not available"));
        let store = Arc::new(MemoryDocumentStore::default());
        let (s, d, st) = endpoints();

        let err = Coordinator::new(clients(Arc::new(src), dst.clone(), store.clone()), s, d, st, PipelineConfig::default())
            .unwrap()
            .run(CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Construct { handle: "sink consumer", .. }));
        assert!(logs_contain("consumer closed"));
        assert!(logs_contain("producer dropped without flush"));
        assert!(store.is_closed());
    }

    /// Collection, паникующая на вставке.
    struct Exploding;

    fn explode() -> Result<DocumentId, PluginError> {
        panic!("insert exploded")
    }

    impl DocumentCollection for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn insert_one(
            &self,
            _document: serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<DocumentId, PluginError>> + Send + '_>> {
            Box::pin(async { explode() })
        }
    }

    struct ExplodingStore;

    impl DocumentStore for ExplodingStore {
        fn collection(
            &self,
            _db: &str,
            _name: &str,
        ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn DocumentCollection>, PluginError>> + Send + '_>> {
            Box::pin(async { Ok(Arc::new(Exploding) as Arc<dyn DocumentCollection>) })
        }

        fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_sink_does_not_affect_relay() {
        let src = MemoryQueue::new(MemoryQueueConfig::new("src"));
        let dst = MemoryQueue::new(MemoryQueueConfig::new("dst"));
        publish_sample(&src);
        let (s, d, st) = endpoints();
        let cfg = PipelineConfig { max_records: Some(2), ..PipelineConfig::default() };

        let report = Coordinator::new(clients(Arc::new(src), Arc::new(dst.clone()), Arc::new(ExplodingStore)), s, d, st, cfg)
            .unwrap()
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(report.sink.stop, StopReason::Panicked(_)));
        assert!(matches!(report.relay.stop, StopReason::LimitReached));
        assert!(report.has_failure());
        assert_eq!(dst.records("out").len(), 3);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let q: Arc<dyn QueueClient> = Arc::new(MemoryQueue::new(MemoryQueueConfig::new("c")));
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::default());
        let (_, d, st) = endpoints();
        let result = Coordinator::new(
            clients(q.clone(), q, store),
            EndpointConfig::new(""),
            d,
            st,
            PipelineConfig::default(),
        );
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
