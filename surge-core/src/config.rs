use crate::{
    ConfigError, Stage, StatusSet, Threshold, DEFAULT_ITERATION_PAUSE, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_TICK_INTERVAL,
};
use std::num::NonZeroU32;
use std::time::Duration;

#[doc(hidden)]
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    pub name: String,
    pub stages: Vec<Stage>,
    pub thresholds: Vec<Threshold>,
    /// Pause between two iterations of the same virtual user.
    pub pause: Duration,
    pub tick: Duration,
    pub request_timeout: Duration,
    /// Global request-rate cap across all virtual users.
    pub rps: Option<NonZeroU32>,
    /// Hard limit on the run; once reached the run drains early.
    pub max_duration: Option<Duration>,
    pub expected_statuses: StatusSet,
}

impl ScenarioConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stages: vec![],
            thresholds: vec![],
            pause: DEFAULT_ITERATION_PAUSE,
            tick: DEFAULT_TICK_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            rps: None,
            max_duration: None,
            expected_statuses: StatusSet::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::NoStages);
        }

        if self.tick.is_zero() {
            return Err(ConfigError::ZeroTick);
        }

        Ok(())
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }
}
