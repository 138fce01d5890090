//! Kafka через rdkafka: `StreamConsumer` для чтения, `FutureProducer`
//! для записи. Client properties передаются в librdkafka как есть.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer as _, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};

use bridge_api::{ClusterInfo, Consumer, PluginError, Producer, QueueClient, Record, RecordValue};

fn kafka_err(context: &str, e: KafkaError) -> PluginError {
    let msg = format!("{context}: {e}");
    match &e {
        KafkaError::ClientConfig(..) | KafkaError::ClientCreation(_) | KafkaError::Subscription(_) => {
            PluginError::config(msg)
        }
        _ if e.rdkafka_error_code() == Some(RDKafkaErrorCode::Fatal) => PluginError::fatal(msg),
        _ => PluginError::io(msg),
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaQueue — QueueClient impl
// ═══════════════════════════════════════════════════════════════

pub struct KafkaQueue {
    label: String,
    properties: BTreeMap<String, String>,
}

impl KafkaQueue {
    pub fn new(label: &str, properties: BTreeMap<String, String>) -> Self {
        Self { label: label.to_string(), properties }
    }

    /// Тот же кластер, group.id с суффиксом и без auto commit.
    pub fn preview(&self, group_suffix: &str) -> Self {
        let mut properties = self.properties.clone();
        let group = properties.get("group.id").cloned().unwrap_or_else(|| "kafka-bridge".into());
        properties.insert("group.id".into(), format!("{group}{group_suffix}"));
        properties.insert("enable.auto.commit".into(), "false".into());
        Self { label: format!("{}{group_suffix}", self.label), properties }
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        for (key, value) in &self.properties {
            config.set(key, value);
        }
        config
    }

    fn producer(&self) -> Result<FutureProducer, PluginError> {
        self.client_config()
            .create()
            .map_err(|e| kafka_err(&format!("{} producer", self.label), e))
    }
}

impl QueueClient for KafkaQueue {
    fn new_consumer(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Consumer>, PluginError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            let consumer: StreamConsumer = self
                .client_config()
                .create()
                .map_err(|e| kafka_err(&format!("{} consumer", self.label), e))?;
            consumer
                .subscribe(&[topic.as_str()])
                .map_err(|e| kafka_err(&format!("subscribe '{topic}'"), e))?;
            tracing::debug!(cluster = %self.label, topic = %topic, "kafka consumer subscribed");
            Ok(Box::new(KafkaConsumer { consumer: Some(consumer), topic }) as Box<dyn Consumer>)
        })
    }

    fn new_producer(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Producer>, PluginError>> + Send + '_>> {
        Box::pin(async move {
            let producer = self.producer()?;
            Ok(Box::new(KafkaProducer { producer: Some(producer) }) as Box<dyn Producer>)
        })
    }

    fn describe(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<ClusterInfo, PluginError>> + Send + '_>> {
        Box::pin(async move {
            let producer = self.producer()?;
            // fetch_metadata блокирующий
            let metadata = tokio::task::spawn_blocking(move || producer.client().fetch_metadata(None, timeout))
                .await
                .map_err(|e| PluginError::io(format!("metadata task: {e}")))?
                .map_err(|e| kafka_err("fetch metadata", e))?;
            Ok(ClusterInfo {
                brokers: metadata.brokers().len(),
                topics: metadata.topics().iter().map(|t| t.name().to_string()).collect(),
            })
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaConsumer
// ═══════════════════════════════════════════════════════════════

pub struct KafkaConsumer {
    consumer: Option<StreamConsumer>,
    topic: String,
}

impl Consumer for KafkaConsumer {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn poll(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Record>, PluginError>> + Send + '_>> {
        Box::pin(async move {
            let Some(consumer) = self.consumer.as_ref() else {
                return Err(PluginError::closed("consumer"));
            };
            let msg = match tokio::time::timeout(timeout, consumer.recv()).await {
                Err(_) => return Ok(None),
                Ok(Err(e)) => return Err(kafka_err("poll", e)),
                Ok(Ok(msg)) => msg,
            };
            Ok(Some(Record {
                topic: msg.topic().to_string(),
                partition: msg.partition(),
                offset: msg.offset(),
                ts_ms: msg.timestamp().to_millis(),
                key: msg.key().map(<[u8]>::to_vec),
                value: match msg.payload() {
                    Some(payload) => RecordValue::Bytes(payload.to_vec()),
                    None => RecordValue::Absent,
                },
            }))
        })
    }

    fn close(&mut self) -> Result<(), PluginError> {
        if let Some(consumer) = self.consumer.take() {
            consumer.unsubscribe();
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  KafkaProducer
// ═══════════════════════════════════════════════════════════════

pub struct KafkaProducer {
    producer: Option<FutureProducer>,
}

impl Producer for KafkaProducer {
    fn send(&mut self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(), PluginError> {
        let Some(producer) = self.producer.as_ref() else {
            return Err(PluginError::closed("producer"));
        };
        let mut record = FutureRecord::<[u8], [u8]>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }
        let delivery = producer
            .send_result(record)
            .map_err(|(e, _)| kafka_err(&format!("enqueue to '{topic}'"), e))?;

        // Ошибка доставки видна только асинхронно: логируем, запись потеряна.
        let topic = topic.to_string();
        tokio::spawn(async move {
            match delivery.await {
                Ok(Ok(_)) => {}
                Ok(Err((e, _))) => tracing::error!(topic = %topic, error = %e, "kafka delivery failed"),
                Err(_) => tracing::warn!(topic = %topic, "kafka delivery status lost"),
            }
        });
        Ok(())
    }

    fn flush(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            let Some(producer) = self.producer.clone() else {
                return Err(PluginError::closed("producer"));
            };
            // flush librdkafka блокирует поток
            tokio::task::spawn_blocking(move || producer.flush(timeout))
                .await
                .map_err(|e| PluginError::io(format!("flush task: {e}")))?
                .map_err(|e| kafka_err("flush", e))
        })
    }

    fn close(&mut self) -> Result<(), PluginError> {
        self.producer = None;
        Ok(())
    }
}
