use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

pub use pipeline::config::{EndpointConfig, ExecutionMode, PipelineConfig, StoreConfig};

use crate::error::BridgeError;

#[derive(Parser)]
#[command(name = "kafka-bridge", about = "Пересылка между Kafka topic'ами с выгрузкой в document store")]
pub struct Cli {
    /// Путь к TOML конфиг файлу
    #[arg(long, global = true, default_value = "config.toml", env = "BRIDGE_CONFIG")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Запустить relay + sink
    Run(RunArgs),
    /// Показать несколько записей topic'а и выйти
    Preview(PreviewArgs),
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Переопределить [pipeline].mode (concurrent | sequential)
    #[arg(long)]
    pub mode: Option<ExecutionMode>,
}

#[derive(Args, Clone, Debug)]
pub struct PreviewArgs {
    /// Topic destination-кластера (по умолчанию [destination].topic)
    #[arg(long)]
    pub topic: Option<String>,
    /// Сколько записей показать
    #[arg(long, default_value_t = 5)]
    pub count: usize,
}

// ---- TOML Config ----

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Дублировать логи в файл (без ротации).
    #[serde(default)]
    pub file: Option<String>,
    /// Фильтр по умолчанию, если не задан RUST_LOG.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { file: None, level: default_log_level() }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub source: EndpointConfig,
    pub destination: EndpointConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl BridgeConfig {
    pub fn load(path: &str) -> Result<Self, BridgeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| BridgeError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
