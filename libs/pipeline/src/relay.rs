use std::time::Duration;

use tokio_util::sync::CancellationToken;

use bridge_api::{Consumer, PluginError, Producer, Record, preview_text};

use crate::config::PipelineConfig;
use crate::handles::{ConsumerHandle, ProducerHandle};
use crate::normalize::{Normalized, normalize_for_send};
use crate::outcome::{LoopReport, Outcome, SkipReason, StopReason};

const LOG_PREVIEW_BYTES: usize = 256;

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub poll_timeout: Duration,
    pub flush_timeout: Duration,
    pub max_records: Option<u64>,
    pub forward_keys: bool,
}

impl From<&PipelineConfig> for RelaySettings {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            poll_timeout: cfg.poll_timeout(),
            flush_timeout: cfg.flush_timeout(),
            max_records: cfg.max_records,
            forward_keys: cfg.forward_keys,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Relay loop — source consumer → normalize → destination producer
// ═══════════════════════════════════════════════════════════════

/// Цикл пересылки. Владеет обоими handle'ами и закрывает их при выходе.
pub struct RelayLoop {
    consumer: ConsumerHandle,
    producer: ProducerHandle,
    destination: String,
    settings: RelaySettings,
}

impl RelayLoop {
    pub fn new(
        consumer: Box<dyn Consumer>,
        producer: Box<dyn Producer>,
        destination: impl Into<String>,
        settings: RelaySettings,
    ) -> Self {
        Self::from_handles(
            ConsumerHandle::new("relay source", consumer),
            ProducerHandle::new("relay destination", producer),
            destination,
            settings,
        )
    }

    pub fn from_handles(
        consumer: ConsumerHandle,
        producer: ProducerHandle,
        destination: impl Into<String>,
        settings: RelaySettings,
    ) -> Self {
        Self { consumer, producer, destination: destination.into(), settings }
    }

    /// Работать до отмены, лимита или фатальной ошибки, затем
    /// flush + close producer'а и close consumer'а.
    pub async fn run(mut self, token: CancellationToken) -> LoopReport {
        tracing::info!(
            source = %self.consumer.topic(),
            destination = %self.destination,
            max_records = ?self.settings.max_records,
            "relay started"
        );
        let mut report = LoopReport::default();
        let stop = self.consume(&token, &mut report).await;
        report.stop = stop;
        self.cleanup().await;

        match &report.stop {
            StopReason::Cancelled => tracing::info!(delivered = report.delivered, "relay cancelled"),
            StopReason::Fatal(e) => tracing::error!(error = ?e, delivered = report.delivered, "relay stopped on fatal error"),
            stop => tracing::info!(reason = %stop, delivered = report.delivered, "relay stopped"),
        }
        tracing::info!(
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            poll_errors = report.poll_errors,
            "relay finished"
        );
        report
    }

    async fn consume(&mut self, token: &CancellationToken, report: &mut LoopReport) -> StopReason {
        loop {
            if token.is_cancelled() {
                return StopReason::Cancelled;
            }
            if self.settings.max_records.is_some_and(|max| report.delivered >= max) {
                return StopReason::LimitReached;
            }

            let polled = tokio::select! {
                biased;
                _ = token.cancelled() => return StopReason::Cancelled,
                polled = self.consumer.poll(self.settings.poll_timeout) => polled,
            };

            match polled {
                Ok(None) => {
                    report.empty_polls += 1;
                    tracing::trace!("no record, polling again");
                }
                Ok(Some(record)) => match self.forward(&record) {
                    Ok(outcome) => report.record(&outcome),
                    Err(e) => return StopReason::Fatal(e),
                },
                Err(e) if e.is_fatal() => return StopReason::Fatal(e),
                Err(e) => {
                    report.poll_errors += 1;
                    tracing::error!(error = ?e, "consumer poll error");
                }
            }
        }
    }

    /// Переслать одну запись. `Err` только для ошибок, после которых
    /// producer непригоден; остальное — `Outcome`.
    pub fn forward(&mut self, record: &Record) -> Result<Outcome, PluginError> {
        let payload = match normalize_for_send(&record.value) {
            Normalized::Payload(bytes) => bytes,
            Normalized::Skip(reason) => {
                match &reason {
                    SkipReason::Absent => {
                        tracing::warn!(partition = record.partition, offset = record.offset, "absent value, skipping")
                    }
                    _ => tracing::error!(
                        partition = record.partition,
                        offset = record.offset,
                        reason = %reason,
                        value = ?record.value,
                        "cannot normalize record, skipping"
                    ),
                }
                return Ok(Outcome::Skipped(reason));
            }
        };

        let key = if self.settings.forward_keys { record.key.as_deref() } else { None };
        match self.producer.send(&self.destination, key, &payload) {
            Ok(()) => {
                tracing::debug!(
                    destination = %self.destination,
                    offset = record.offset,
                    value = %preview_text(&payload, LOG_PREVIEW_BYTES),
                    "forwarded record"
                );
                Ok(Outcome::Delivered)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::error!(
                    error = ?e,
                    destination = %self.destination,
                    value = %preview_text(&payload, LOG_PREVIEW_BYTES),
                    "publish failed, record dropped"
                );
                Ok(Outcome::TransientError(e))
            }
        }
    }

    async fn cleanup(&mut self) {
        if let Err(e) = self.producer.flush_and_close(self.settings.flush_timeout).await {
            tracing::warn!(error = ?e, "producer flush failed, buffered records may be lost");
        }
        self.consumer.shutdown();
    }
}
