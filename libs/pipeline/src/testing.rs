//! Scripted клиенты для тестов циклов и coordinator'а.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bridge_api::{
    ClusterInfo, Consumer, DocumentCollection, DocumentId, PluginError, Producer, QueueClient, Record,
};
use topic_engine::MemoryQueue;

// ═══════════════════════════════════════════════════════════════
//  MockConsumer
// ═══════════════════════════════════════════════════════════════

/// Один шаг сценария poll'а.
pub enum PollStep {
    Record(Record),
    Empty,
    Error(PluginError),
}

#[derive(Default)]
struct ConsumerState {
    polls: AtomicUsize,
    closes: AtomicUsize,
}

/// Наблюдатель за consumer'ом, переданным в цикл.
#[derive(Clone)]
pub struct ConsumerProbe(Arc<ConsumerState>);

impl ConsumerProbe {
    pub fn polls(&self) -> usize {
        self.0.polls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.0.closes.load(Ordering::SeqCst)
    }
}

/// Consumer, отдающий шаги сценария по одному на poll. После конца
/// сценария каждый poll ждёт полный timeout и возвращает `None`.
pub struct MockConsumer {
    topic: String,
    script: VecDeque<PollStep>,
    state: Arc<ConsumerState>,
    closed: bool,
}

impl MockConsumer {
    pub fn scripted(topic: &str, script: Vec<PollStep>) -> (Self, ConsumerProbe) {
        let state = Arc::new(ConsumerState::default());
        let consumer = Self {
            topic: topic.to_string(),
            script: script.into(),
            state: state.clone(),
            closed: false,
        };
        (consumer, ConsumerProbe(state))
    }
}

impl Consumer for MockConsumer {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn poll(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Record>, PluginError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed {
                return Err(PluginError::closed("consumer"));
            }
            self.state.polls.fetch_add(1, Ordering::SeqCst);
            match self.script.pop_front() {
                Some(PollStep::Record(r)) => Ok(Some(r)),
                Some(PollStep::Error(e)) => Err(e),
                Some(PollStep::Empty) | None => {
                    tokio::time::sleep(timeout).await;
                    Ok(None)
                }
            }
        })
    }

    fn close(&mut self) -> Result<(), PluginError> {
        if !self.closed {
            self.closed = true;
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  MockProducer
// ═══════════════════════════════════════════════════════════════

pub type Sent = (String, Option<Vec<u8>>, Vec<u8>);

#[derive(Default)]
struct ProducerState {
    sent: Mutex<Vec<Sent>>,
    send_failures: Mutex<VecDeque<PluginError>>,
    flushes: AtomicUsize,
    closes: AtomicUsize,
    hang_flush: AtomicBool,
}

#[derive(Clone)]
pub struct ProducerProbe(Arc<ProducerState>);

impl ProducerProbe {
    pub fn sent(&self) -> Vec<Sent> {
        self.0.sent.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.sent().into_iter().map(|(_, _, p)| p).collect()
    }

    pub fn flushes(&self) -> usize {
        self.0.flushes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.0.closes.load(Ordering::SeqCst)
    }

    /// Следующий `send` вернёт `err`.
    pub fn fail_next_send(&self, err: PluginError) {
        self.0.send_failures.lock().unwrap().push_back(err);
    }

    /// `flush` никогда не завершится сам.
    pub fn hang_flush(&self) {
        self.0.hang_flush.store(true, Ordering::SeqCst);
    }
}

pub struct MockProducer {
    state: Arc<ProducerState>,
    closed: bool,
}

impl MockProducer {
    pub fn new() -> (Self, ProducerProbe) {
        let state = Arc::new(ProducerState::default());
        (Self { state: state.clone(), closed: false }, ProducerProbe(state))
    }
}

impl Producer for MockProducer {
    fn send(&mut self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(), PluginError> {
        if self.closed {
            return Err(PluginError::closed("producer"));
        }
        if let Some(err) = self.state.send_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.state
            .sent
            .lock()
            .unwrap()
            .push((topic.to_string(), key.map(<[u8]>::to_vec), payload.to_vec()));
        Ok(())
    }

    fn flush(
        &mut self,
        _timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            self.state.flushes.fetch_add(1, Ordering::SeqCst);
            if self.state.hang_flush.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            Ok(())
        })
    }

    fn close(&mut self) -> Result<(), PluginError> {
        if !self.closed {
            self.closed = true;
            self.state.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  MockCollection
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MockCollection {
    documents: Mutex<Vec<serde_json::Value>>,
    failures: Mutex<VecDeque<PluginError>>,
}

impl MockCollection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn documents(&self) -> Vec<serde_json::Value> {
        self.documents.lock().unwrap().clone()
    }

    /// Следующий `insert_one` вернёт `err`.
    pub fn fail_next_insert(&self, err: PluginError) {
        self.failures.lock().unwrap().push_back(err);
    }
}

impl DocumentCollection for MockCollection {
    fn name(&self) -> &str {
        "mock"
    }

    fn insert_one(
        &self,
        document: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<DocumentId, PluginError>> + Send + '_>> {
        Box::pin(async move {
            if let Some(err) = self.failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            let mut docs = self.documents.lock().unwrap();
            docs.push(document);
            Ok(DocumentId(format!("{:024x}", docs.len())))
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  CountingClient
// ═══════════════════════════════════════════════════════════════

/// `MemoryQueue`, считающий успешно созданные handle'ы.
pub struct CountingClient {
    pub queue: MemoryQueue,
    consumers: AtomicUsize,
    producers: AtomicUsize,
    consumer_failure: Mutex<Option<PluginError>>,
}

impl CountingClient {
    pub fn new(queue: MemoryQueue) -> Arc<Self> {
        Arc::new(Self {
            queue,
            consumers: AtomicUsize::new(0),
            producers: AtomicUsize::new(0),
            consumer_failure: Mutex::new(None),
        })
    }

    pub fn consumers_built(&self) -> usize {
        self.consumers.load(Ordering::SeqCst)
    }

    pub fn producers_built(&self) -> usize {
        self.producers.load(Ordering::SeqCst)
    }

    /// Все последующие `new_consumer` вернут `err`.
    pub fn fail_consumers(&self, err: PluginError) {
        *self.consumer_failure.lock().unwrap() = Some(err);
    }
}

impl QueueClient for CountingClient {
    fn new_consumer(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Consumer>, PluginError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            let failure = self.consumer_failure.lock().unwrap().clone();
            if let Some(err) = failure {
                return Err(err);
            }
            let consumer = self.queue.new_consumer(&topic).await?;
            self.consumers.fetch_add(1, Ordering::SeqCst);
            Ok(consumer)
        })
    }

    fn new_producer(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn Producer>, PluginError>> + Send + '_>> {
        Box::pin(async move {
            let producer = self.queue.new_producer().await?;
            self.producers.fetch_add(1, Ordering::SeqCst);
            Ok(producer)
        })
    }

    fn describe(
        &self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<ClusterInfo, PluginError>> + Send + '_>> {
        self.queue.describe(timeout)
    }
}
