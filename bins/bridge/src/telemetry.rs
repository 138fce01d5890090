use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LogConfig;
use crate::error::BridgeError;

/// Держит file writer живым; при drop дописывает буфер в файл.
pub struct TelemetryGuard {
    _file: Option<WorkerGuard>,
}

/// Глобальный subscriber: stderr + (опционально) файл.
/// `RUST_LOG` имеет приоритет над `[log].level`.
pub fn init(cfg: &LogConfig) -> Result<TelemetryGuard, BridgeError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .map_err(|e| BridgeError::Telemetry(format!("filter '{}': {e}", cfg.level)))?;
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let Some(path) = &cfg.file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr)
            .try_init()
            .map_err(|e| BridgeError::Telemetry(e.to_string()))?;
        return Ok(TelemetryGuard { _file: None });
    };

    let (dir, name) = split_log_path(path)?;
    let appender = tracing_appender::rolling::never(dir, name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init()
        .map_err(|e| BridgeError::Telemetry(e.to_string()))?;
    Ok(TelemetryGuard { _file: Some(guard) })
}

fn split_log_path(path: &str) -> Result<(&Path, &std::ffi::OsStr), BridgeError> {
    let path = Path::new(path);
    let name = path
        .file_name()
        .ok_or_else(|| BridgeError::Telemetry(format!("log file '{}' has no file name", path.display())))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    Ok((dir, name))
}
