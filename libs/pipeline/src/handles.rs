//! Владение handle'ами очереди: каждый закрывается ровно один раз,
//! в том числе при ошибке, отмене или панике цикла (через `Drop`).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bridge_api::{Consumer, PluginError, Producer, Record};

// ═══════════════════════════════════════════════════════════════
//  ConsumerHandle
// ═══════════════════════════════════════════════════════════════

pub struct ConsumerHandle {
    label: &'static str,
    topic: String,
    inner: Option<Box<dyn Consumer>>,
}

impl ConsumerHandle {
    pub fn new(label: &'static str, consumer: Box<dyn Consumer>) -> Self {
        Self {
            label,
            topic: consumer.topic().to_string(),
            inner: Some(consumer),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Закрыть consumer. Ошибка закрытия только логируется.
    pub fn shutdown(&mut self) {
        if let Some(mut consumer) = self.inner.take() {
            match consumer.close() {
                Ok(()) => tracing::info!(handle = self.label, topic = %self.topic, "consumer closed"),
                Err(e) => tracing::warn!(handle = self.label, topic = %self.topic, error = ?e, "consumer close failed"),
            }
        }
    }
}

impl Consumer for ConsumerHandle {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn poll(
        &mut self,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Record>, PluginError>> + Send + '_>> {
        match self.inner.as_mut() {
            Some(consumer) => consumer.poll(timeout),
            None => Box::pin(async { Err(PluginError::closed("consumer")) }),
        }
    }

    fn close(&mut self) -> Result<(), PluginError> {
        self.shutdown();
        Ok(())
    }
}

impl Drop for ConsumerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ═══════════════════════════════════════════════════════════════
//  ProducerHandle
// ═══════════════════════════════════════════════════════════════

pub struct ProducerHandle {
    label: &'static str,
    inner: Option<Box<dyn Producer>>,
}

impl ProducerHandle {
    pub fn new(label: &'static str, producer: Box<dyn Producer>) -> Self {
        Self { label, inner: Some(producer) }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    pub fn send(&mut self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<(), PluginError> {
        match self.inner.as_mut() {
            Some(producer) => producer.send(topic, key, payload),
            None => Err(PluginError::closed("producer")),
        }
    }

    /// Flush (не дольше `timeout`), затем close. Close выполняется
    /// даже если flush упал; возвращается первая ошибка.
    pub async fn flush_and_close(&mut self, timeout: Duration) -> Result<(), PluginError> {
        let Some(mut producer) = self.inner.take() else {
            return Ok(());
        };
        let flushed = match tokio::time::timeout(timeout, producer.flush(timeout)).await {
            Ok(result) => result,
            Err(_) => Err(PluginError::io(format!("flush timed out after {timeout:?}"))),
        };
        let closed = producer.close();
        match (&flushed, &closed) {
            (Ok(()), Ok(())) => tracing::info!(handle = self.label, "producer flushed and closed"),
            _ => tracing::warn!(
                handle = self.label,
                flush = ?flushed.as_ref().err(),
                close = ?closed.as_ref().err(),
                "producer shutdown incomplete"
            ),
        }
        flushed.and(closed)
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        if let Some(mut producer) = self.inner.take() {
            tracing::warn!(handle = self.label, "producer dropped without flush");
            if let Err(e) = producer.close() {
                tracing::warn!(handle = self.label, error = ?e, "producer close failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConsumer, MockProducer};

    #[tokio::test]
    async fn consumer_is_closed_once() {
        let (consumer, probe) = MockConsumer::scripted("in", vec![]);
        let mut handle = ConsumerHandle::new("test", Box::new(consumer));
        handle.shutdown();
        handle.shutdown();
        assert!(handle.is_closed());
        drop(handle);
        assert_eq!(probe.closes(), 1);
    }

    #[tokio::test]
    async fn poll_after_close_is_fatal() {
        let (consumer, _probe) = MockConsumer::scripted("in", vec![]);
        let mut handle = ConsumerHandle::new("test", Box::new(consumer));
        Consumer::close(&mut handle).unwrap();
        let err = handle.poll(Duration::from_millis(1)).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(handle.topic(), "in");
    }

    #[tokio::test]
    async fn drop_closes_consumer() {
        let (consumer, probe) = MockConsumer::scripted("in", vec![]);
        drop(ConsumerHandle::new("test", Box::new(consumer)));
        assert_eq!(probe.closes(), 1);
    }

    #[tokio::test]
    async fn producer_flushes_then_closes_once() {
        let (producer, probe) = MockProducer::new();
        let mut handle = ProducerHandle::new("test", Box::new(producer));
        handle.send("out", None, b"x").unwrap();
        handle.flush_and_close(Duration::from_secs(1)).await.unwrap();
        handle.flush_and_close(Duration::from_secs(1)).await.unwrap();
        drop(handle);
        assert_eq!(probe.flushes(), 1);
        assert_eq!(probe.closes(), 1);
        assert_eq!(probe.sent(), vec![("out".to_string(), None, b"x".to_vec())]);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_flush_is_bounded_and_still_closes() {
        let (producer, probe) = MockProducer::new();
        probe.hang_flush();
        let mut handle = ProducerHandle::new("test", Box::new(producer));
        let err = handle.flush_and_close(Duration::from_secs(2)).await.unwrap_err();
        assert_eq!(err.kind(), bridge_api::ErrorKind::Io);
        assert_eq!(probe.closes(), 1);
        assert!(handle.send("out", None, b"x").unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn dropped_producer_is_closed_without_flush() {
        let (producer, probe) = MockProducer::new();
        drop(ProducerHandle::new("test", Box::new(producer)));
        assert_eq!(probe.flushes(), 0);
        assert_eq!(probe.closes(), 1);
    }
}
