/// Category of a client error. Allows the pipeline to decide whether a
/// failure is a per-record skip or ends the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid configuration — permanent, fail at startup.
    Config,
    /// I/O or network error — transient, skip the record and keep polling.
    Io,
    /// Data format/parse error — bad input, skip record.
    Format,
    /// Logical error (not found, invalid state, generic).
    Logic,
    /// Handle closed or client in an unrecoverable state — the loop must stop.
    Fatal,
    /// Operation not supported by this client (e.g. metadata describe).
    Unsupported,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Config => f.write_str("config"),
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Logic => f.write_str("logic"),
            ErrorKind::Fatal => f.write_str("fatal"),
            ErrorKind::Unsupported => f.write_str("unsupported"),
        }
    }
}

/// Unified error type for all queue and store client methods.
///
/// Carries an `ErrorKind` for categorization and a human-readable message.
/// `From` impls assign the appropriate kind automatically and allow
/// ergonomic `?` in client implementations.
#[derive(Clone)]
pub struct PluginError {
    kind: ErrorKind,
    message: String,
}

impl PluginError {
    /// Generic logic error (default kind).
    pub fn new(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Logic, message: msg.into() }
    }

    /// Configuration error — permanent, fail at startup.
    pub fn config(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Config, message: msg.into() }
    }

    /// I/O error — transient.
    pub fn io(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Io, message: msg.into() }
    }

    /// Format/parse error — bad input, skip record.
    pub fn format_err(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Format, message: msg.into() }
    }

    /// Unrecoverable error — the owning loop stops.
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Fatal, message: msg.into() }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self { kind: ErrorKind::Unsupported, message: msg.into() }
    }

    /// Handle already closed. Fatal for the loop that owns it.
    pub fn closed(what: &str) -> Self {
        Self::fatal(format!("{what} is closed"))
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// `true` если ошибка должна завершить цикл, а не только текущую запись.
    pub fn is_fatal(&self) -> bool {
        self.kind == ErrorKind::Fatal
    }

    /// Prepend context to the message, keeping the kind.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        Self { kind: self.kind, message: format!("{ctx}: {}", self.message) }
    }
}

impl std::fmt::Debug for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for PluginError {}

impl From<String> for PluginError {
    fn from(s: String) -> Self { Self { kind: ErrorKind::Logic, message: s } }
}

impl From<&str> for PluginError {
    fn from(s: &str) -> Self { Self { kind: ErrorKind::Logic, message: s.to_string() } }
}

impl From<std::io::Error> for PluginError {
    fn from(e: std::io::Error) -> Self { Self { kind: ErrorKind::Io, message: e.to_string() } }
}

impl From<serde_json::Error> for PluginError {
    fn from(e: serde_json::Error) -> Self { Self { kind: ErrorKind::Format, message: e.to_string() } }
}

impl From<std::str::Utf8Error> for PluginError {
    fn from(e: std::str::Utf8Error) -> Self { Self { kind: ErrorKind::Format, message: e.to_string() } }
}

impl From<std::string::FromUtf8Error> for PluginError {
    fn from(e: std::string::FromUtf8Error) -> Self { Self { kind: ErrorKind::Format, message: e.to_string() } }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_assign_kinds() {
        let io: PluginError = std::io::Error::other("boom").into();
        assert_eq!(io.kind(), ErrorKind::Io);

        let utf8 = String::from_utf8(vec![0xff]).unwrap_err();
        let e: PluginError = utf8.into();
        assert_eq!(e.kind(), ErrorKind::Format);

        assert!(PluginError::closed("consumer").is_fatal());
        assert!(!PluginError::io("timeout").is_fatal());
    }

    #[test]
    fn context_keeps_kind() {
        let e = PluginError::config("missing url").with_context("store");
        assert_eq!(e.kind(), ErrorKind::Config);
        assert_eq!(e.message(), "store: missing url");
        assert_eq!(format!("{e:?}"), "[config] store: missing url");
    }
}
