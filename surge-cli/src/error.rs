use std::path::PathBuf;
use surge::ConfigError;

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read config file {0}: {1}")]
    ReadConfig(PathBuf, #[source] std::io::Error),

    #[error("Invalid config file {0}: {1}")]
    ParseConfig(PathBuf, #[source] serde_json::Error),

    #[error("Failed to write summary to {0}: {1}")]
    WriteSummary(PathBuf, #[source] std::io::Error),

    #[error("Failed to serialize summary: {0}")]
    SerializeSummary(#[from] serde_json::Error),

    #[error("Failed to install Prometheus exporter: {0}")]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),
}
