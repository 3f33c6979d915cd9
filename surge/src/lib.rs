#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod aggregator;
pub mod http;
pub mod reporter;
pub mod scenario;
pub mod scheduler;

mod pool;
mod timer;

pub use http::Http;
pub use reporter::{exit_code, Report};
pub use scenario::{stop_signal, Scenario, StopHandle, StopSignal};
pub use surge_core::{
    parse_duration, CheckTally, ConfigError, Metric, RequestResult, RunStatistics, Stage,
    StatusSet, Threshold, ThresholdOutcome, TrendSummary, DEFAULT_ACCOUNTS_URL, DEFAULT_BASE_URL,
    DEFAULT_ITERATION_PAUSE, DEFAULT_REQUEST_TIMEOUT, EXIT_CONFIG_ERROR, EXIT_PASSED,
    EXIT_THRESHOLD_FAILED, ScenarioConfig,
};
pub use surge_macros::scenario;

pub mod prelude {
    pub use crate::http::Http;
    pub use crate::reporter::Report;
    pub use crate::scenario::ConfigurableScenario;
    pub use surge_core::{RunStatistics, Stage, StatusSet, Threshold};
    pub use surge_macros::scenario;
}
