use std::time::Duration;

use bridge_api::{PluginError, QueueClient};

use crate::config::{PipelineConfig, ProbeMode};
use crate::handles::ProducerHandle;

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub mode: ProbeMode,
    pub sentinel_payload: Vec<u8>,
    /// Ограничение на всю проверку (создание handle'а, запись, flush).
    pub timeout: Duration,
}

impl From<&PipelineConfig> for ProbeSettings {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            mode: cfg.probe,
            sentinel_payload: cfg.sentinel_payload.as_bytes().to_vec(),
            timeout: cfg.probe_timeout(),
        }
    }
}

/// Проверить доступность endpoint'а. Ошибки не пробрасываются:
/// любая неудача логируется с `label` и превращается в `false`.
pub async fn probe(client: &dyn QueueClient, topic: &str, label: &str, settings: &ProbeSettings) -> bool {
    tracing::info!(endpoint = %label, topic = %topic, mode = ?settings.mode, "checking connectivity");
    let result = match tokio::time::timeout(settings.timeout, run_probe(client, topic, settings)).await {
        Ok(result) => result,
        Err(_) => Err(PluginError::io(format!("probe timed out after {:?}", settings.timeout))),
    };
    match result {
        Ok(()) => {
            tracing::info!(endpoint = %label, "endpoint reachable");
            true
        }
        Err(e) => {
            tracing::error!(endpoint = %label, topic = %topic, error = ?e, "endpoint unreachable");
            false
        }
    }
}

async fn run_probe(client: &dyn QueueClient, topic: &str, settings: &ProbeSettings) -> Result<(), PluginError> {
    match settings.mode {
        ProbeMode::Sentinel => {
            let mut producer = ProducerHandle::new("probe", client.new_producer().await?);
            producer.send(topic, None, &settings.sentinel_payload)?;
            producer.flush_and_close(settings.timeout).await
        }
        ProbeMode::Metadata => {
            let info = client.describe(settings.timeout).await?;
            tracing::debug!(brokers = info.brokers, topics = info.topics.len(), "cluster metadata");
            Ok(())
        }
    }
}
