use crate::ConfigError;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A ramp or plateau of target concurrency.
///
/// The target is reached at the end of the stage, starting from the previous stage's target (or
/// zero for the first stage).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", cfg_eval::cfg_eval, serde_as)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Stage {
    #[cfg_attr(feature = "serde", serde_as(as = "DurationSecondsWithFrac<f64>"))]
    pub duration: Duration,
    pub target: u32,
}

impl Stage {
    pub fn new(duration: Duration, target: u32) -> Self {
        Self { duration, target }
    }
}

impl FromStr for Stage {
    type Err = ConfigError;

    /// Parses `<duration>:<target>`, e.g. `30s:20` or `2m:100`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (duration, target) = s
            .split_once(':')
            .ok_or_else(|| ConfigError::MalformedStage(s.to_string()))?;

        let duration = parse_duration(duration)?;
        let target = target
            .trim()
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidTarget(target.trim().to_string()))?;

        Ok(Stage { duration, target })
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            humantime::format_duration(self.duration),
            self.target
        )
    }
}

/// Parse a humantime duration (`30s`, `2m`, `1h 30m`) into a [`Duration`].
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    humantime::parse_duration(s).map_err(|e| ConfigError::InvalidDuration(s.to_string(), e.to_string()))
}
