//! Pass/fail predicates over aggregated run metrics.
//!
//! Thresholds use the expression syntax of the `thresholds` block of a load test script:
//! `p(95)<500` for `http_req_duration`, `rate<0.01` for `http_req_failed`, and so on.
use crate::ConfigError;
use std::fmt;
use std::str::FromStr;

/// Built-in metrics a threshold can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    /// Request latency in milliseconds.
    HttpReqDuration,
    /// Share of requests that failed (network error or unexpected status).
    HttpReqFailed,
    /// Number of requests issued.
    HttpReqs,
    /// Share of checks that passed.
    Checks,
    /// Number of completed scenario iterations.
    Iterations,
    /// Iteration latency in milliseconds, including the scenario's requests.
    IterationDuration,
    /// Active virtual users.
    Vus,
    /// Allocated virtual users.
    VusMax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Trend,
    Rate,
    Counter,
    Gauge,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::HttpReqDuration,
        Metric::HttpReqFailed,
        Metric::HttpReqs,
        Metric::Checks,
        Metric::Iterations,
        Metric::IterationDuration,
        Metric::Vus,
        Metric::VusMax,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Metric::HttpReqDuration => "http_req_duration",
            Metric::HttpReqFailed => "http_req_failed",
            Metric::HttpReqs => "http_reqs",
            Metric::Checks => "checks",
            Metric::Iterations => "iterations",
            Metric::IterationDuration => "iteration_duration",
            Metric::Vus => "vus",
            Metric::VusMax => "vus_max",
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::HttpReqDuration | Metric::IterationDuration => MetricKind::Trend,
            Metric::HttpReqFailed | Metric::Checks => MetricKind::Rate,
            Metric::HttpReqs | Metric::Iterations => MetricKind::Counter,
            Metric::Vus | Metric::VusMax => MetricKind::Gauge,
        }
    }

    fn supports(&self, aggregate: Aggregate) -> bool {
        use Aggregate::*;
        match self.kind() {
            MetricKind::Trend => matches!(
                aggregate,
                Avg | Min | Max | Med | Percentile(_) | Count
            ),
            MetricKind::Rate => matches!(aggregate, Rate),
            MetricKind::Counter => matches!(aggregate, Count | Rate),
            MetricKind::Gauge => matches!(aggregate, Value | Min | Max),
        }
    }
}

impl FromStr for Metric {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.name() == s.trim())
            .ok_or_else(|| ConfigError::UnknownMetric(s.trim().to_string()))
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The statistic of a metric a threshold compares against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate {
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in `0..=100`, written `p(95)`.
    Percentile(f64),
    Count,
    /// Share for rate metrics, per-second throughput for counters.
    Rate,
    Value,
}

impl FromStr for Aggregate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let agg = match s {
            "avg" => Aggregate::Avg,
            "min" => Aggregate::Min,
            "max" => Aggregate::Max,
            "med" => Aggregate::Med,
            "count" => Aggregate::Count,
            "rate" => Aggregate::Rate,
            "value" => Aggregate::Value,
            _ => {
                let inner = s
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .ok_or_else(|| ConfigError::MalformedThreshold(s.to_string()))?;
                let p = inner
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ConfigError::MalformedThreshold(s.to_string()))?;
                if !(0. ..=100.).contains(&p) {
                    return Err(ConfigError::InvalidPercentile(p));
                }
                Aggregate::Percentile(p)
            }
        };
        Ok(agg)
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregate::Avg => f.write_str("avg"),
            Aggregate::Min => f.write_str("min"),
            Aggregate::Max => f.write_str("max"),
            Aggregate::Med => f.write_str("med"),
            Aggregate::Percentile(p) => write!(f, "p({p})"),
            Aggregate::Count => f.write_str("count"),
            Aggregate::Rate => f.write_str("rate"),
            Aggregate::Value => f.write_str("value"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    // Two-character operators first so `<=` is not read as `<`.
    const OPERATORS: [(&'static str, Comparison); 6] = [
        ("<=", Comparison::Le),
        (">=", Comparison::Ge),
        ("==", Comparison::Eq),
        ("!=", Comparison::Ne),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];

    pub fn holds(&self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => observed < bound,
            Comparison::Le => observed <= bound,
            Comparison::Gt => observed > bound,
            Comparison::Ge => observed >= bound,
            Comparison::Eq => observed == bound,
            Comparison::Ne => observed != bound,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

/// Read access to aggregated statistics.
///
/// Returns `None` when the metric has no samples yet.
pub trait MetricSource {
    fn aggregate(&self, metric: Metric, aggregate: Aggregate) -> Option<f64>;
}

/// A pass/fail predicate over one aggregate of one metric, e.g. `http_req_duration: p(95)<500`.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: Metric,
    pub aggregate: Aggregate,
    pub comparison: Comparison,
    pub bound: f64,
}

impl Threshold {
    /// Parse the expression part of a threshold (`p(95)<500`) for the given metric.
    pub fn parse(metric: Metric, expr: &str) -> Result<Self, ConfigError> {
        let malformed = || ConfigError::MalformedThreshold(expr.to_string());

        let (idx, symbol, comparison) = Comparison::OPERATORS
            .iter()
            .filter_map(|(symbol, cmp)| expr.find(symbol).map(|idx| (idx, *symbol, *cmp)))
            .min_by_key(|(idx, symbol, _)| (*idx, usize::MAX - symbol.len()))
            .ok_or_else(malformed)?;

        let aggregate: Aggregate = expr[..idx].parse()?;
        let bound = expr[idx + symbol.len()..]
            .trim()
            .parse::<f64>()
            .map_err(|_| malformed())?;

        if !metric.supports(aggregate) {
            return Err(ConfigError::UnsupportedAggregate {
                metric: metric.to_string(),
                aggregate: aggregate.to_string(),
            });
        }

        Ok(Self {
            metric,
            aggregate,
            comparison,
            bound,
        })
    }

    /// Evaluate against the current statistics. Never mutates `source`.
    ///
    /// A metric without samples fails its thresholds.
    pub fn evaluate(&self, source: &impl MetricSource) -> ThresholdOutcome {
        let observed = source.aggregate(self.metric, self.aggregate);
        let passed = observed.is_some_and(|v| self.comparison.holds(v, self.bound));
        ThresholdOutcome {
            threshold: self.clone(),
            observed,
            passed,
        }
    }
}

impl FromStr for Threshold {
    type Err = ConfigError;

    /// Parses `<metric>:<expression>`, e.g. `http_req_failed:rate<0.01`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (metric, expr) = s
            .split_once(':')
            .ok_or_else(|| ConfigError::MalformedThreshold(s.to_string()))?;
        Threshold::parse(metric.parse()?, expr.trim())
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}{}{}",
            self.metric,
            self.aggregate,
            self.comparison.symbol(),
            self.bound
        )
    }
}

/// Result of evaluating one [`Threshold`].
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub threshold: Threshold,
    pub observed: Option<f64>,
    pub passed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Fixed(HashMap<(Metric, String), f64>);

    impl MetricSource for Fixed {
        fn aggregate(&self, metric: Metric, aggregate: Aggregate) -> Option<f64> {
            self.0.get(&(metric, aggregate.to_string())).copied()
        }
    }

    fn source() -> Fixed {
        let mut values = HashMap::new();
        values.insert((Metric::HttpReqDuration, "p(95)".to_string()), 420.);
        values.insert((Metric::HttpReqFailed, "rate".to_string()), 0.02);
        Fixed(values)
    }

    #[test]
    fn parses_script_thresholds() {
        let t: Threshold = "http_req_duration:p(95)<500".parse().unwrap();
        assert_eq!(t.metric, Metric::HttpReqDuration);
        assert_eq!(t.aggregate, Aggregate::Percentile(95.));
        assert_eq!(t.comparison, Comparison::Lt);
        assert_eq!(t.bound, 500.);

        let t = Threshold::parse(Metric::HttpReqFailed, "rate<0.01").unwrap();
        assert_eq!(t.aggregate, Aggregate::Rate);
        assert_eq!(t.bound, 0.01);
    }

    #[test]
    fn two_char_operators_win() {
        let t = Threshold::parse(Metric::HttpReqDuration, "avg <= 200").unwrap();
        assert_eq!(t.comparison, Comparison::Le);
        assert_eq!(t.bound, 200.);

        let t = Threshold::parse(Metric::Checks, "rate>=0.99").unwrap();
        assert_eq!(t.comparison, Comparison::Ge);
    }

    #[test]
    fn rejects_bad_thresholds() {
        assert!(matches!(
            "http_req_duration:p(95)".parse::<Threshold>(),
            Err(ConfigError::MalformedThreshold(_))
        ));
        assert!(matches!(
            "nope:rate<1".parse::<Threshold>(),
            Err(ConfigError::UnknownMetric(_))
        ));
        assert!(matches!(
            "http_req_failed:p(95)<1".parse::<Threshold>(),
            Err(ConfigError::UnsupportedAggregate { .. })
        ));
        assert!(matches!(
            "http_req_duration:p(120)<1".parse::<Threshold>(),
            Err(ConfigError::InvalidPercentile(_))
        ));
        assert!(matches!(
            "http_req_duration:p(95)<fast".parse::<Threshold>(),
            Err(ConfigError::MalformedThreshold(_))
        ));
    }

    #[test]
    fn evaluation() {
        let source = source();
        let latency: Threshold = "http_req_duration:p(95)<500".parse().unwrap();
        let failed: Threshold = "http_req_failed:rate<0.01".parse().unwrap();

        let outcome = latency.evaluate(&source);
        assert!(outcome.passed);
        assert_eq!(outcome.observed, Some(420.));

        let outcome = failed.evaluate(&source);
        assert!(!outcome.passed);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let source = source();
        let t: Threshold = "http_req_duration:p(95)<500".parse().unwrap();
        assert_eq!(t.evaluate(&source), t.evaluate(&source));
    }

    #[test]
    fn missing_samples_fail() {
        let t: Threshold = "iterations:count>0".parse().unwrap();
        let outcome = t.evaluate(&source());
        assert!(!outcome.passed);
        assert_eq!(outcome.observed, None);
    }

    #[test]
    fn display_round_trips() {
        let t: Threshold = "checks:rate>=0.99".parse().unwrap();
        assert_eq!(t.to_string().parse::<Threshold>().unwrap(), t);
    }
}
