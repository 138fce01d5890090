use std::time::Duration;

use tokio_util::sync::CancellationToken;

use bridge_api::QueueClient;
use pipeline::{ConsumerHandle, PipelineError};

use crate::backend::Queue;
use crate::config::{BridgeConfig, PreviewArgs};
use crate::error::BridgeError;

pub async fn run(config: BridgeConfig, args: PreviewArgs) -> Result<(), BridgeError> {
    config.destination.validate("destination")?;
    config.pipeline.validate()?;

    let topic = args.topic.unwrap_or_else(|| config.destination.topic.clone());
    let client = Queue::connect("destination", &config.destination)?.preview_client();

    let token = CancellationToken::new();
    let signals = tokio::spawn(super::shutdown_signal(token.clone()));

    let result = execute(&*client, &topic, args.count, config.pipeline.preview_poll_timeout(), &token).await;

    token.cancel();
    if let Err(e) = signals.await {
        tracing::warn!(error = %e, "signal task failed");
    }
    let shown = result?;
    tracing::info!(topic = %topic, shown, "preview done");
    Ok(())
}

/// Показать `count` записей `topic`, не сдвигая позицию основной группы.
pub async fn execute(
    client: &dyn QueueClient,
    topic: &str,
    count: usize,
    poll_timeout: Duration,
    token: &CancellationToken,
) -> Result<usize, BridgeError> {
    let preview_err = |source| PipelineError::Preview { topic: topic.to_string(), source };

    let consumer = client.new_consumer(topic).await.map_err(preview_err)?;
    let mut handle = ConsumerHandle::new("preview", consumer);
    let shown = pipeline::preview(&mut handle, count, poll_timeout, token)
        .await
        .map_err(preview_err)?;
    handle.shutdown();
    Ok(shown)
}
