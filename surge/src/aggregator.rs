//! Request, check and iteration statistics.
//!
//! Virtual users push [`Sample`]s into a lock-free [`AtomicBucket`]; the run loop drains the
//! bucket into [`AggregateStats`] on every tick. All updates are additive, so ingestion order does
//! not change the resulting statistics.
use metrics_util::{AtomicBucket, Summary};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_core::{
    Aggregate, CheckTally, Metric, MetricSource, Sample, ThresholdOutcome, TrendSummary,
};
#[allow(unused)]
use tracing::{debug, error, trace, warn};

/// Shared sink for samples produced by virtual users.
pub struct Aggregator {
    pending: AtomicBucket<Sample>,
    requests: AtomicU64,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            pending: AtomicBucket::new(),
            requests: AtomicU64::new(0),
        }
    }

    /// Append a sample. Safe to call from any number of tasks at once.
    pub fn record(&self, sample: Sample) {
        #[cfg(feature = "metrics")]
        emit(&sample);

        if matches!(sample, Sample::Request(_)) {
            self.requests.fetch_add(1, Ordering::Relaxed);
        }
        self.pending.push(sample);
    }

    /// Requests recorded so far, including ones not yet collected.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Move every pending sample into `stats`.
    pub fn collect(&self, stats: &mut AggregateStats) {
        self.pending.clear_with(|samples| {
            for sample in samples {
                stats.ingest(sample);
            }
        });
    }
}

#[cfg(feature = "metrics")]
fn emit(sample: &Sample) {
    match sample {
        Sample::Request(res) => {
            metrics::histogram!("http_req_duration").record(res.duration.as_secs_f64() * 1e3);
            metrics::counter!("http_reqs").increment(1);
            if res.failed {
                metrics::counter!("http_req_failed").increment(1);
            }
        }
        Sample::Check(check) => {
            let outcome = if check.passed { "pass" } else { "fail" };
            metrics::counter!("checks", "check" => check.name.to_string(), "outcome" => outcome)
                .increment(1);
        }
        Sample::Iteration(iteration) => {
            metrics::histogram!("iteration_duration")
                .record(iteration.duration.as_secs_f64() * 1e3);
            metrics::counter!("iterations").increment(1);
        }
    }
}

/// Streaming distribution of durations, in milliseconds.
///
/// Percentiles come from a DDSketch with bounded bucket count, so memory does not grow with the
/// number of samples.
struct Trend {
    sketch: Summary,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Trend {
    fn new() -> Self {
        Self {
            sketch: Summary::with_defaults(),
            count: 0,
            sum: 0.,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn add(&mut self, duration: Duration) {
        let ms = duration.as_secs_f64() * 1e3;
        self.sketch.add(ms);
        self.count += 1;
        self.sum += ms;
        self.min = self.min.min(ms);
        self.max = self.max.max(ms);
    }

    fn quantile(&self, q: f64) -> Option<f64> {
        if self.count == 0 {
            return None;
        }

        match self.sketch.quantile(q) {
            Some(v) if v.is_finite() => Some(v.clamp(self.min, self.max)),
            _ => {
                error!("Quantile {q} could not be computed");
                None
            }
        }
    }

    fn aggregate(&self, aggregate: Aggregate) -> Option<f64> {
        if self.count == 0 {
            return None;
        }

        match aggregate {
            Aggregate::Avg => Some(self.sum / self.count as f64),
            Aggregate::Min => Some(self.min),
            Aggregate::Max => Some(self.max),
            Aggregate::Med => self.quantile(0.5),
            Aggregate::Percentile(p) => self.quantile(p / 100.),
            Aggregate::Count => Some(self.count as f64),
            Aggregate::Rate | Aggregate::Value => None,
        }
    }

    fn summary(&self) -> TrendSummary {
        let get = |agg| self.aggregate(agg).unwrap_or(0.);
        TrendSummary {
            count: self.count,
            avg: get(Aggregate::Avg),
            min: get(Aggregate::Min),
            med: get(Aggregate::Med),
            max: get(Aggregate::Max),
            p90: get(Aggregate::Percentile(90.)),
            p95: get(Aggregate::Percentile(95.)),
            p99: get(Aggregate::Percentile(99.)),
        }
    }
}

/// Share of samples that matched some condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Rate {
    hits: u64,
    total: u64,
}

impl Rate {
    fn add(&mut self, hit: bool) {
        self.hits += hit as u64;
        self.total += 1;
    }

    fn share(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(self.hits as f64 / self.total as f64)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Gauge {
    value: u64,
    min: u64,
    max: u64,
    observed: bool,
}

impl Gauge {
    fn set(&mut self, value: u64) {
        if self.observed {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        } else {
            self.min = value;
            self.max = value;
            self.observed = true;
        }
        self.value = value;
    }

    fn aggregate(&self, aggregate: Aggregate) -> Option<f64> {
        if !self.observed {
            return None;
        }

        match aggregate {
            Aggregate::Value => Some(self.value as f64),
            Aggregate::Min => Some(self.min as f64),
            Aggregate::Max => Some(self.max as f64),
            _ => None,
        }
    }
}

type CheckKey = (Option<Arc<str>>, Arc<str>);

/// Aggregated statistics of a run. Owned by the run loop and only ever grown.
pub struct AggregateStats {
    http_req_duration: Trend,
    iteration_duration: Trend,
    // Hits are failures for requests and iterations, passes for checks.
    requests: Rate,
    iterations: Rate,
    checks: Rate,
    check_tallies: BTreeMap<CheckKey, Rate>,
    vus: Gauge,
    vus_max: Gauge,
    elapsed: Duration,
}

impl Default for AggregateStats {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregateStats {
    pub fn new() -> Self {
        Self {
            http_req_duration: Trend::new(),
            iteration_duration: Trend::new(),
            requests: Rate::default(),
            iterations: Rate::default(),
            checks: Rate::default(),
            check_tallies: BTreeMap::new(),
            vus: Gauge::default(),
            vus_max: Gauge::default(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn ingest(&mut self, sample: &Sample) {
        match sample {
            Sample::Request(res) => {
                self.http_req_duration.add(res.duration);
                self.requests.add(res.failed);
            }
            Sample::Check(check) => {
                self.checks.add(check.passed);
                self.check_tallies
                    .entry((check.group.clone(), check.name.clone()))
                    .or_default()
                    .add(check.passed);
            }
            Sample::Iteration(iteration) => {
                self.iteration_duration.add(iteration.duration);
                self.iterations.add(iteration.failed);
            }
        }
    }

    /// Record the current number of active and allocated virtual users.
    pub fn observe_vus(&mut self, live: usize, allocated: usize) {
        self.vus.set(live as u64);
        self.vus_max.set(allocated as u64);
    }

    /// Elapsed run time, used for per-second rates.
    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn requests(&self) -> u64 {
        self.requests.total
    }

    pub fn failed_requests(&self) -> u64 {
        self.requests.hits
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.total
    }

    pub fn failed_iterations(&self) -> u64 {
        self.iterations.hits
    }

    pub fn vus_max(&self) -> u64 {
        self.vus_max.max
    }

    pub fn http_req_duration(&self) -> TrendSummary {
        self.http_req_duration.summary()
    }

    pub fn iteration_duration(&self) -> TrendSummary {
        self.iteration_duration.summary()
    }

    /// Per-check tallies, ordered by group then name.
    pub fn check_tallies(&self) -> Vec<CheckTally> {
        self.check_tallies
            .iter()
            .map(|((group, name), rate)| CheckTally {
                group: group.as_deref().map(str::to_string),
                name: name.to_string(),
                passes: rate.hits,
                fails: rate.total - rate.hits,
            })
            .collect()
    }

    /// Evaluate every threshold against the current state.
    pub fn evaluate(&self, thresholds: &[surge_core::Threshold]) -> Vec<ThresholdOutcome> {
        thresholds.iter().map(|t| t.evaluate(self)).collect()
    }

    fn per_second(&self, count: u64) -> Option<f64> {
        if self.elapsed.is_zero() {
            None
        } else {
            Some(count as f64 / self.elapsed.as_secs_f64())
        }
    }

    fn counter(&self, count: u64, aggregate: Aggregate) -> Option<f64> {
        match aggregate {
            Aggregate::Count => Some(count as f64),
            Aggregate::Rate => self.per_second(count),
            _ => None,
        }
    }
}

impl MetricSource for AggregateStats {
    fn aggregate(&self, metric: Metric, aggregate: Aggregate) -> Option<f64> {
        match metric {
            Metric::HttpReqDuration => self.http_req_duration.aggregate(aggregate),
            Metric::IterationDuration => self.iteration_duration.aggregate(aggregate),
            Metric::HttpReqFailed => match aggregate {
                Aggregate::Rate => self.requests.share(),
                _ => None,
            },
            Metric::Checks => match aggregate {
                Aggregate::Rate => self.checks.share(),
                _ => None,
            },
            Metric::HttpReqs => self.counter(self.requests.total, aggregate),
            Metric::Iterations => self.counter(self.iterations.total, aggregate),
            Metric::Vus => self.vus.aggregate(aggregate),
            Metric::VusMax => self.vus_max.aggregate(aggregate),
        }
    }
}
