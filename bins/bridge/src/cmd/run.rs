use tokio_util::sync::CancellationToken;

use pipeline::{Clients, Coordinator, PipelineReport};

use crate::backend::{self, Queue};
use crate::config::{BridgeConfig, RunArgs};
use crate::error::BridgeError;

pub async fn run(config: BridgeConfig, args: RunArgs) -> Result<(), BridgeError> {
    let token = CancellationToken::new();
    let signals = tokio::spawn(super::shutdown_signal(token.clone()));

    let result = execute(config, args, token.clone()).await;

    token.cancel();
    if let Err(e) = signals.await {
        tracing::warn!(error = %e, "signal task failed");
    }
    result.map(|_| ())
}

/// Собрать клиентов по конфигу и прогнать pipeline до остановки.
pub async fn execute(
    config: BridgeConfig,
    args: RunArgs,
    token: CancellationToken,
) -> Result<PipelineReport, BridgeError> {
    let mut settings = config.pipeline;
    if let Some(mode) = args.mode {
        settings.mode = mode;
    }

    let source = Queue::connect("source", &config.source)?;
    let destination = Queue::connect("destination", &config.destination)?;
    let preview = destination.preview_client();
    let clients = Clients {
        source: source.into_client(),
        destination: destination.into_client(),
        preview: Some(preview),
        store: backend::document_store(&config.store)?,
    };

    let coordinator = Coordinator::new(clients, config.source, config.destination, config.store, settings)?;
    let report = coordinator.run(token).await?;
    check_report(report)
}

fn check_report(report: PipelineReport) -> Result<PipelineReport, BridgeError> {
    if report.has_failure() {
        return Err(BridgeError::LoopFailed {
            relay: report.relay.stop.to_string(),
            sink: report.sink.stop.to_string(),
        });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bridge_api::PluginError;
    use pipeline::{ExecutionMode, LoopReport, StopReason};

    fn memory_config(extra: &str) -> BridgeConfig {
        BridgeConfig::parse(&format!(
            r#"
            [source]
            backend = "memory"
            topic = "in"
            [destination]
            backend = "memory"
            topic = "out"
            [store]
            backend = "memory"
            database = "bridge"
            collection = "events"
            [pipeline]
            poll_timeout_ms = 100
            max_idle_polls = 2
            {extra}
            "#
        ))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn memory_pipeline_runs_until_cancelled() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        });

        let report = execute(memory_config(""), RunArgs { mode: None }, token).await.unwrap();

        assert!(matches!(report.relay.stop, StopReason::Cancelled));
        assert!(matches!(report.sink.stop, StopReason::IdleTimeout));
        // sentinel probe'а destination'а попадает в store
        assert_eq!(report.sink.delivered, 1);
        assert!(report.previewed.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn mode_flag_overrides_config() {
        let report = execute(
            memory_config("max_records = 0\npreview_records = 1"),
            RunArgs { mode: Some(ExecutionMode::Sequential) },
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(matches!(report.relay.stop, StopReason::LimitReached));
        assert_eq!(report.previewed, Some(1));
        assert!(matches!(report.sink.stop, StopReason::IdleTimeout));
    }

    #[tokio::test]
    async fn invalid_pipeline_config_fails_before_start() {
        let err = execute(memory_config("flush_timeout_ms = 0"), RunArgs { mode: None }, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Pipeline(pipeline::PipelineError::Config(_))));
    }

    #[test]
    fn fatal_loop_maps_to_failure() {
        let report = PipelineReport {
            relay: LoopReport::stopped(StopReason::Fatal(PluginError::closed("producer"))),
            sink: LoopReport::stopped(StopReason::IdleTimeout),
            previewed: None,
        };
        let err = check_report(report).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("producer is closed"), "{text}");
        assert!(text.contains("idle poll limit reached"), "{text}");
    }
}
