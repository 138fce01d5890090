use bridge_api::PluginError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(String),

    #[error("unreachable endpoints: {}", .0.join(", "))]
    Unreachable(Vec<String>),

    #[error("construct {handle} ({target}): {source}")]
    Construct {
        handle: &'static str,
        target: String,
        source: PluginError,
    },

    #[error("preview ({topic}): {source}")]
    Preview { topic: String, source: PluginError },
}
