//! Target concurrency over time, and the run lifecycle.
use std::time::Duration;
use surge_core::Stage;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// An ordered sequence of [`Stage`]s.
///
/// Every stage ramps linearly from the previous stage's target (zero before the first stage) to its
/// own target. Evaluation is pure: the same elapsed time always yields the same target.
#[derive(Debug, Clone)]
pub struct Schedule {
    stages: Vec<Stage>,
}

impl Schedule {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Highest concurrency the schedule ever asks for.
    pub fn max_target(&self) -> u32 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// Index of the stage active at `elapsed`, if the schedule has not ended.
    pub fn stage_at(&self, elapsed: Duration) -> Option<usize> {
        let mut end = Duration::ZERO;
        for (idx, stage) in self.stages.iter().enumerate() {
            end += stage.duration;
            if elapsed < end {
                return Some(idx);
            }
        }
        None
    }

    /// Target concurrency at `elapsed`, rounded to the nearest integer. Zero once the schedule
    /// has ended.
    pub fn target_at(&self, elapsed: Duration) -> u32 {
        let mut start = Duration::ZERO;
        let mut from = 0u32;

        for stage in &self.stages {
            let end = start + stage.duration;
            if elapsed < end {
                // `elapsed < end` implies a non-zero stage duration here.
                let progress = (elapsed - start).as_secs_f64() / stage.duration.as_secs_f64();
                let from_f = from as f64;
                let value = from_f + (stage.target as f64 - from_f) * progress;
                return value.round().max(0.) as u32;
            }
            start = end;
            from = stage.target;
        }

        0
    }
}

/// Whole-run lifecycle. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    /// Stages are active and the pool follows the schedule.
    Ramping,
    /// Target is zero; waiting for in-flight iterations.
    Draining,
    /// Terminal. The report is produced exactly once here.
    Complete,
}

#[derive(Debug)]
pub struct Lifecycle {
    phase: Phase,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self { phase: Phase::Init }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Move to `next`. Returns `false`, leaving the phase untouched, if that would go backwards
    /// or stay in place.
    pub fn advance(&mut self, next: Phase) -> bool {
        if next > self.phase {
            debug!("Phase {:?} -> {:?}", self.phase, next);
            self.phase = next;
            true
        } else {
            error!("Refusing phase transition {:?} -> {:?}", self.phase, next);
            false
        }
    }
}
