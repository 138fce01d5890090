pub mod error;
mod topic;

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;

use bridge_api::{
    ClusterInfo, Consumer, PluginError, Producer, QueueClient, Record, RecordValue,
};

pub use error::TopicError;
pub use topic::{OffsetReset, Topic};

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

/// Настройки in-memory клиента. Читаются из тех же client properties,
/// что и у Kafka (`group.id`, `auto.offset.reset`,
/// `allow.auto.create.topics`), чтобы конфиги были взаимозаменяемы.
#[derive(Debug, Clone)]
pub struct MemoryQueueConfig {
    /// Имя кластера (для логов и ошибок).
    pub cluster: String,
    pub group_id: String,
    pub offset_reset: OffsetReset,
    pub auto_create_topics: bool,
}

impl MemoryQueueConfig {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            group_id: "default".into(),
            offset_reset: OffsetReset::Earliest,
            auto_create_topics: true,
        }
    }

    pub fn from_properties(
        cluster: &str,
        props: &BTreeMap<String, String>,
    ) -> Result<Self, PluginError> {
        let mut cfg = Self::new(cluster);
        if let Some(group) = props.get("group.id") {
            cfg.group_id = group.clone();
        }
        if let Some(reset) = props.get("auto.offset.reset") {
            cfg.offset_reset = match reset.as_str() {
                "earliest" | "smallest" | "beginning" => OffsetReset::Earliest,
                "latest" | "largest" | "end" => OffsetReset::Latest,
                other => {
                    return Err(PluginError::config(format!(
                        "auto.offset.reset: unknown value '{other}'"
                    )));
                }
            };
        }
        if let Some(create) = props.get("allow.auto.create.topics") {
            cfg.auto_create_topics = create.parse().map_err(|_| {
                PluginError::config(format!("allow.auto.create.topics: expected bool, got '{create}'"))
            })?;
        }
        Ok(cfg)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Broker
// ═══════════════════════════════════════════════════════════════

/// Общее состояние одного in-memory кластера.
struct Broker {
    cluster: String,
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    reachable: AtomicBool,
}

impl Broker {
    fn topic(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn create_topic(&self, name: &str) -> Arc<Topic> {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        topics
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(cluster = %self.cluster, topic = %name, "created topic");
                Arc::new(Topic::new(name.to_string()))
            })
            .clone()
    }

    fn resolve(&self, name: &str, auto_create: bool) -> Result<Arc<Topic>, PluginError> {
        match self.topic(name) {
            Some(t) => Ok(t),
            None if auto_create => Ok(self.create_topic(name)),
            None => Err(TopicError::NotFound(name.to_string()).into_plugin_error()),
        }
    }

    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Acquire)
    }

    fn check_reachable(&self) -> Result<(), PluginError> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(TopicError::Unreachable(self.cluster.clone()).into_plugin_error())
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryQueue — QueueClient impl
// ═══════════════════════════════════════════════════════════════

/// In-memory queue client. Клоны и `with_group` делят один кластер.
#[derive(Clone)]
pub struct MemoryQueue {
    broker: Arc<Broker>,
    config: MemoryQueueConfig,
}

impl MemoryQueue {
    pub fn new(config: MemoryQueueConfig) -> Self {
        Self {
            broker: Arc::new(Broker {
                cluster: config.cluster.clone(),
                topics: RwLock::new(HashMap::new()),
                reachable: AtomicBool::new(true),
            }),
            config,
        }
    }

    /// Клиент того же кластера с другой consumer group.
    pub fn with_group(&self, group_id: impl Into<String>) -> Self {
        let mut config = self.config.clone();
        config.group_id = group_id.into();
        Self { broker: self.broker.clone(), config }
    }

    pub fn config(&self) -> &MemoryQueueConfig {
        &self.config
    }

    pub fn topic(&self, name: &str) -> Option<Arc<Topic>> {
        self.broker.topic(name)
    }

    pub fn create_topic(&self, name: &str) -> Arc<Topic> {
        self.broker.create_topic(name)
    }

    /// Записать значение напрямую в лог (минуя producer).
    pub fn publish(&self, topic: &str, key: Option<Vec<u8>>, value: RecordValue) -> i64 {
        self.broker.create_topic(topic).append(key, value)
    }

    /// Все записи topic'а (пусто, если topic не существует).
    pub fn records(&self, topic: &str) -> Vec<Record> {
        self.broker.topic(topic).map(|t| t.snapshot()).unwrap_or_default()
    }

    /// Имитация недоступности кластера.
    pub fn set_reachable(&self, reachable: bool) {
        self.broker.reachable.store(reachable, Ordering::Release);
    }

    /// Следующий poll любого consumer'а topic'а вернёт `err`.
    pub fn inject_poll_error(&self, topic: &str, err: PluginError) {
        self.broker.create_topic(topic).inject_failure(err);
    }
}

impl QueueClient for MemoryQueue {
    fn new_consumer(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Consumer>, PluginError>> + Send + '_>> {
        let topic_name = topic.to_string();
        Box::pin(async move {
            self.broker.check_reachable()?;
            let topic = self.broker.resolve(&topic_name, self.config.auto_create_topics)?;
            let position = topic.join_group(&self.config.group_id, self.config.offset_reset);
            tracing::debug!(
                cluster = %self.config.cluster,
                topic = %topic_name,
                group = %self.config.group_id,
                position,
                "consumer subscribed"
            );
            Ok(Box::new(MemoryConsumer {
                broker: self.broker.clone(),
                len_rx: topic.watch_len(),
                topic,
                group: self.config.group_id.clone(),
                closed: false,
            }) as Box<dyn Consumer>)
        })
    }

    fn new_producer(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Producer>, PluginError>> + Send + '_>> {
        Box::pin(async move {
            self.broker.check_reachable()?;
            Ok(Box::new(MemoryProducer {
                broker: self.broker.clone(),
                auto_create: self.config.auto_create_topics,
                sent: 0,
                closed: false,
            }) as Box<dyn Producer>)
        })
    }

    fn describe(
        &self,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<ClusterInfo, PluginError>> + Send + '_>> {
        Box::pin(async move {
            self.broker.check_reachable()?;
            let mut topics: Vec<String> = self
                .broker
                .topics
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .keys()
                .cloned()
                .collect();
            topics.sort();
            Ok(ClusterInfo { brokers: 1, topics })
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryConsumer
// ═══════════════════════════════════════════════════════════════

pub struct MemoryConsumer {
    broker: Arc<Broker>,
    topic: Arc<Topic>,
    len_rx: watch::Receiver<usize>,
    group: String,
    closed: bool,
}

impl Consumer for MemoryConsumer {
    fn topic(&self) -> &str {
        &self.topic.name
    }

    fn poll(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Record>, PluginError>> + Send + '_>> {
        Box::pin(async move {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                if self.closed {
                    return Err(PluginError::closed("consumer"));
                }
                if !self.broker.is_reachable() {
                    // Как и настоящий клиент: ошибка транспорта не раньше таймаута.
                    tokio::time::sleep_until(deadline).await;
                    return Err(TopicError::Unreachable(self.broker.cluster.clone()).into_plugin_error());
                }
                if let Some(err) = self.topic.take_failure() {
                    return Err(err);
                }
                if let Some(record) = self.topic.next_for(&self.group) {
                    return Ok(Some(record));
                }

                let position = self.topic.position(&self.group);
                let woke = tokio::time::timeout_at(
                    deadline,
                    self.len_rx.wait_for(|len| *len > position),
                )
                .await
                .map(|changed| changed.is_ok());
                match woke {
                    Err(_) => return Ok(None),
                    Ok(false) => return Err(PluginError::fatal(format!("topic '{}' dropped", self.topic.name))),
                    Ok(true) => continue,
                }
            }
        })
    }

    fn close(&mut self) -> Result<(), PluginError> {
        if !self.closed {
            self.closed = true;
            tracing::debug!(topic = %self.topic.name, group = %self.group, "consumer closed");
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryProducer
// ═══════════════════════════════════════════════════════════════

/// Producer без буфера: запись видна consumer'ам сразу после `send`,
/// поэтому `flush` только проверяет состояние.
pub struct MemoryProducer {
    broker: Arc<Broker>,
    auto_create: bool,
    sent: u64,
    closed: bool,
}

impl MemoryProducer {
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl Producer for MemoryProducer {
    fn send(&mut self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(), PluginError> {
        if self.closed {
            return Err(PluginError::closed("producer"));
        }
        self.broker.check_reachable()?;
        let topic = self.broker.resolve(topic, self.auto_create)?;
        topic.append(key.map(<[u8]>::to_vec), RecordValue::Bytes(payload.to_vec()));
        self.sent += 1;
        Ok(())
    }

    fn flush(
        &mut self,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed {
                return Err(PluginError::closed("producer"));
            }
            self.broker.check_reachable()
        })
    }

    fn close(&mut self) -> Result<(), PluginError> {
        if !self.closed {
            self.closed = true;
            tracing::debug!(cluster = %self.broker.cluster, sent = self.sent, "producer closed");
        }
        Ok(())
    }
}
