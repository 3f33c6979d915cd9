use thiserror::Error;

/// Fatal configuration problems, reported before a run starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Stage `{0}` is malformed, expected `<duration>:<target>` (e.g. `30s:20`)")]
    MalformedStage(String),

    #[error("Invalid stage duration `{0}`: {1}")]
    InvalidDuration(String, String),

    #[error("Invalid stage target `{0}`")]
    InvalidTarget(String),

    #[error("A scenario needs at least one stage")]
    NoStages,

    #[error("Tick interval must be greater than zero")]
    ZeroTick,

    #[error("Unknown metric `{0}`")]
    UnknownMetric(String),

    #[error("Threshold `{0}` is malformed")]
    MalformedThreshold(String),

    #[error("Aggregate `{aggregate}` is not supported by metric `{metric}`")]
    UnsupportedAggregate { metric: String, aggregate: String },

    #[error("Percentile must be within 0..=100, got {0}")]
    InvalidPercentile(f64),

    #[error("Status set `{0}` is malformed, expected codes or ranges like `200,401` or `200-399`")]
    MalformedStatusSet(String),

    #[error("HTTP client could not be built: {0}")]
    HttpClient(String),

    #[error("Invalid URL `{0}`: {1}")]
    InvalidUrl(String, String),
}
