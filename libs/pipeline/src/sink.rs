use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use bridge_api::{Consumer, DocumentCollection, PluginError, Record, RecordValue, preview_text};

use crate::config::PipelineConfig;
use crate::handles::ConsumerHandle;
use crate::normalize::normalize_for_store;
use crate::outcome::{LoopReport, Outcome, SkipReason, StopReason};

const LOG_PREVIEW_BYTES: usize = 256;

#[derive(Debug, Clone)]
pub struct SinkSettings {
    pub poll_timeout: Duration,
    pub max_idle_polls: Option<u32>,
}

impl From<&PipelineConfig> for SinkSettings {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            poll_timeout: cfg.poll_timeout(),
            max_idle_polls: cfg.max_idle_polls,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Sink loop — destination consumer → document → collection
// ═══════════════════════════════════════════════════════════════

/// Цикл записи в document store. Владеет consumer'ом; store client
/// принадлежит coordinator'у.
pub struct SinkLoop {
    consumer: ConsumerHandle,
    collection: Arc<dyn DocumentCollection>,
    settings: SinkSettings,
}

impl SinkLoop {
    pub fn new(
        consumer: Box<dyn Consumer>,
        collection: Arc<dyn DocumentCollection>,
        settings: SinkSettings,
    ) -> Self {
        Self::from_handle(ConsumerHandle::new("sink source", consumer), collection, settings)
    }

    pub fn from_handle(
        consumer: ConsumerHandle,
        collection: Arc<dyn DocumentCollection>,
        settings: SinkSettings,
    ) -> Self {
        Self { consumer, collection, settings }
    }

    pub async fn run(mut self, token: CancellationToken) -> LoopReport {
        tracing::info!(
            topic = %self.consumer.topic(),
            collection = %self.collection.name(),
            max_idle_polls = ?self.settings.max_idle_polls,
            "sink started"
        );
        let mut report = LoopReport::default();
        let stop = self.consume(&token, &mut report).await;
        report.stop = stop;
        self.consumer.shutdown();

        match &report.stop {
            StopReason::Cancelled => tracing::info!(stored = report.delivered, "sink cancelled"),
            StopReason::Fatal(e) => tracing::error!(error = ?e, stored = report.delivered, "sink stopped on fatal error"),
            stop => tracing::info!(reason = %stop, stored = report.delivered, "sink stopped"),
        }
        tracing::info!(
            stored = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            poll_errors = report.poll_errors,
            "sink finished"
        );
        report
    }

    async fn consume(&mut self, token: &CancellationToken, report: &mut LoopReport) -> StopReason {
        let mut idle: u32 = 0;
        loop {
            if token.is_cancelled() {
                return StopReason::Cancelled;
            }

            let polled = tokio::select! {
                biased;
                _ = token.cancelled() => return StopReason::Cancelled,
                polled = self.consumer.poll(self.settings.poll_timeout) => polled,
            };

            match polled {
                Ok(None) => {
                    report.empty_polls += 1;
                    idle += 1;
                    tracing::debug!(idle, "no new record");
                    if self.settings.max_idle_polls.is_some_and(|max| idle >= max) {
                        return StopReason::IdleTimeout;
                    }
                }
                Ok(Some(record)) => {
                    idle = 0;
                    let stored = tokio::select! {
                        biased;
                        _ = token.cancelled() => return StopReason::Cancelled,
                        stored = self.store(&record) => stored,
                    };
                    match stored {
                        Ok(outcome) => report.record(&outcome),
                        Err(e) => return StopReason::Fatal(e),
                    }
                }
                Err(e) if e.is_fatal() => return StopReason::Fatal(e),
                Err(e) => {
                    idle = 0;
                    report.poll_errors += 1;
                    tracing::error!(error = ?e, "consumer poll error");
                }
            }
        }
    }

    /// Сохранить одну запись как документ. `Err` только для ошибок,
    /// после которых collection непригодна.
    pub async fn store(&mut self, record: &Record) -> Result<Outcome, PluginError> {
        let Some(bytes) = record.value.raw_bytes() else {
            let reason = match &record.value {
                RecordValue::Absent => SkipReason::Absent,
                other => SkipReason::NonBytePayload { kind: other.kind_name() },
            };
            tracing::warn!(offset = record.offset, reason = %reason, "record not storable, skipping");
            return Ok(Outcome::Skipped(reason));
        };

        let document = match normalize_for_store(&bytes) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::error!(
                    error = ?e,
                    offset = record.offset,
                    raw = %preview_text(&bytes, LOG_PREVIEW_BYTES),
                    "cannot decode record, skipping"
                );
                return Ok(Outcome::TransientError(e));
            }
        };

        match self.collection.insert_one(document).await {
            Ok(id) => {
                tracing::debug!(id = %id, offset = record.offset, "document inserted");
                Ok(Outcome::Delivered)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::error!(
                    error = ?e,
                    collection = %self.collection.name(),
                    raw = %preview_text(&bytes, LOG_PREVIEW_BYTES),
                    "insert failed, record skipped"
                );
                Ok(Outcome::TransientError(e))
            }
        }
    }
}
