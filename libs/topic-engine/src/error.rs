use bridge_api::PluginError;

#[derive(Debug, thiserror::Error)]
pub enum TopicError {
    #[error("topic '{0}' not found")]
    NotFound(String),

    #[error("cluster '{0}' is unreachable")]
    Unreachable(String),
}

impl TopicError {
    /// Convert to PluginError preserving the error category.
    ///
    /// `NotFound` → Config kind (неверное имя topic'а в конфиге).
    /// `Unreachable` → Io kind.
    pub fn into_plugin_error(self) -> PluginError {
        match self {
            TopicError::NotFound(_) => PluginError::config(self.to_string()),
            TopicError::Unreachable(_) => PluginError::io(self.to_string()),
        }
    }
}
