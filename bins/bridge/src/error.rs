#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("config ({context}): {detail}")]
    Config { context: &'static str, detail: String },

    #[error("logging: {0}")]
    Telemetry(String),

    #[error("backend '{backend}': {detail}")]
    Backend { backend: String, detail: String },

    #[error("client: {0}")]
    Client(#[from] bridge_api::PluginError),

    #[error("{0}")]
    Pipeline(#[from] pipeline::PipelineError),

    #[error("pipeline stopped with failure (relay: {relay}, sink: {sink})")]
    LoopFailed { relay: String, sink: String },
}
