use crate::ThresholdOutcome;
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};
#[cfg(feature = "serde")]
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::time::Duration;

/// Statistics of a run, produced once every virtual user has been retired.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", cfg_eval::cfg_eval, serde_as)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RunStatistics {
    pub name: String,
    #[cfg_attr(feature = "serde", serde_as(as = "DurationSecondsWithFrac<f64>"))]
    pub elapsed: Duration,
    /// The run was stopped before its schedule ended.
    pub cancelled: bool,
    pub vus_max: u64,
    pub requests: u64,
    pub failed_requests: u64,
    /// Requests per second over the whole run.
    pub request_rate: f64,
    pub http_req_duration: TrendSummary,
    pub iterations: u64,
    pub failed_iterations: u64,
    pub iteration_duration: TrendSummary,
    pub checks: Vec<CheckTally>,
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_outcomes"))]
    pub thresholds: Vec<ThresholdOutcome>,
}

impl RunStatistics {
    pub fn error_rate(&self) -> f64 {
        if self.requests == 0 {
            0.
        } else {
            self.failed_requests as f64 / self.requests as f64
        }
    }

    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }
}

/// Distribution summary of a trend metric, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TrendSummary {
    pub count: u64,
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Pass/fail tally for one named check.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CheckTally {
    pub group: Option<String>,
    pub name: String,
    pub passes: u64,
    pub fails: u64,
}

#[cfg(feature = "serde")]
fn serialize_outcomes<S: Serializer>(
    outcomes: &[ThresholdOutcome],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeSeq;

    #[derive(Serialize)]
    struct Outcome {
        threshold: String,
        observed: Option<f64>,
        passed: bool,
    }

    let mut seq = serializer.serialize_seq(Some(outcomes.len()))?;
    for outcome in outcomes {
        seq.serialize_element(&Outcome {
            threshold: outcome.threshold.to_string(),
            observed: outcome.observed,
            passed: outcome.passed,
        })?;
    }
    seq.end()
}
