//! HTTP executor handed to every virtual user.
use crate::aggregator::Aggregator;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use surge_core::{
    CheckResult, ConfigError, IterationResult, RequestErrorKind, RequestResult, Sample,
    ScenarioConfig, StatusSet,
};
#[allow(unused)]
use tracing::{debug, error, trace, warn};

/// Handle used by a scenario to issue requests and record checks.
///
/// Cloning is cheap; clones share the connection pool and the aggregator. A request only suspends
/// the virtual user that awaits it.
#[derive(Clone)]
pub struct Http {
    client: reqwest::Client,
    aggregator: Arc<Aggregator>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    expected: Arc<StatusSet>,
    group: Option<Arc<str>>,
    vu: u64,
}

impl Http {
    pub(crate) fn new(config: &ScenarioConfig, aggregator: Arc<Aggregator>) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let limiter = config
            .rps
            .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

        Ok(Self {
            client,
            aggregator,
            limiter,
            expected: Arc::new(config.expected_statuses.clone()),
            group: None,
            vu: 0,
        })
    }

    pub(crate) fn for_vu(&self, vu: u64) -> Self {
        Self {
            vu,
            ..self.clone()
        }
    }

    /// Id of the virtual user owning this handle. Ids start at 1.
    pub fn vu(&self) -> u64 {
        self.vu
    }

    /// A handle whose requests and checks are labelled with `name`. Nested groups are joined
    /// with `::`.
    pub fn group(&self, name: &str) -> Self {
        let group = match &self.group {
            Some(parent) => format!("{parent}::{name}"),
            None => name.to_string(),
        };
        Self {
            group: Some(Arc::from(group)),
            ..self.clone()
        }
    }

    /// Issue a GET. Statuses outside the run's expected set count as failed requests.
    pub async fn get(&self, url: &str) -> RequestResult {
        let expected = self.expected.clone();
        self.get_expecting(url, &expected).await
    }

    /// Issue a GET, with `expected` deciding which statuses count as successful.
    ///
    /// Network errors and timeouts never propagate; they yield a failed result without status.
    pub async fn get_expecting(&self, url: &str, expected: &StatusSet) -> RequestResult {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let timestamp = SystemTime::now();
        let start = Instant::now();
        let (status, error) = match self.client.get(url).send().await {
            Ok(res) => {
                let status = res.status().as_u16();
                // Duration covers the whole body, not just the headers.
                match res.bytes().await {
                    Ok(_) => (Some(status), None),
                    Err(e) => (Some(status), Some(classify(&e))),
                }
            }
            Err(e) => (None, Some(classify(&e))),
        };
        let duration = start.elapsed();

        let failed = error.is_some() || status.map_or(true, |s| !expected.contains(s));
        if let Some(kind) = error {
            debug!(vu = self.vu, "GET {url} failed: {kind}");
        } else {
            trace!(vu = self.vu, "GET {url} -> {status:?} in {duration:?}");
        }

        let result = RequestResult {
            timestamp,
            url: Arc::from(url),
            group: self.group.clone(),
            duration,
            status,
            failed,
            error,
        };
        self.aggregator.record(Sample::Request(result.clone()));
        result
    }

    /// Record a named check and return its outcome.
    ///
    /// A failed check is only a sample; it does not stop the iteration.
    pub fn check(&self, name: &str, passed: bool) -> bool {
        if !passed {
            trace!(vu = self.vu, "Check `{name}` failed");
        }
        self.aggregator.record(Sample::Check(CheckResult {
            name: Arc::from(name),
            group: self.group.clone(),
            passed,
        }));
        passed
    }

    /// Check that `res` received a status within `accepted`.
    pub fn check_status(&self, name: &str, res: &RequestResult, accepted: &StatusSet) -> bool {
        let passed = res.status.is_some_and(|s| accepted.contains(s));
        self.check(name, passed)
    }

    pub(crate) fn record_iteration(&self, iteration: IterationResult) {
        self.aggregator.record(Sample::Iteration(iteration));
    }
}

fn classify(error: &reqwest::Error) -> RequestErrorKind {
    if error.is_timeout() {
        RequestErrorKind::Timeout
    } else if error.is_connect() {
        RequestErrorKind::Connect
    } else {
        RequestErrorKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::AggregateStats;
    use std::time::Duration;
    use surge_core::{Aggregate, Metric, MetricSource};

    fn http(config: &ScenarioConfig) -> (Http, Arc<Aggregator>) {
        let aggregator = Arc::new(Aggregator::new());
        let http = Http::new(config, aggregator.clone()).unwrap();
        (http, aggregator)
    }

    fn response(status: Option<u16>) -> RequestResult {
        RequestResult {
            timestamp: SystemTime::now(),
            url: Arc::from("http://localhost/api/admin/users/metrics"),
            group: None,
            duration: Duration::from_millis(5),
            status,
            failed: false,
            error: None,
        }
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(10_000)]
    async fn network_error_is_recorded() {
        let mut config = ScenarioConfig::new("unreachable");
        config.request_timeout = Duration::from_secs(2);
        let (http, aggregator) = http(&config);

        // Nothing listens on port 1.
        let res = http.get("http://127.0.0.1:1/").await;
        assert!(res.failed);
        assert_eq!(res.status, None);
        assert!(res.error.is_some());

        let mut stats = AggregateStats::new();
        aggregator.collect(&mut stats);
        assert_eq!(stats.requests(), 1);
        assert_eq!(stats.aggregate(Metric::HttpReqFailed, Aggregate::Rate), Some(1.));
    }

    #[tokio::test]
    async fn malformed_url_is_a_failed_request() {
        let (http, _) = http(&ScenarioConfig::new("malformed"));
        let res = http.get("not a url").await;
        assert!(res.failed);
        assert_eq!(res.error, Some(RequestErrorKind::Other));
    }

    #[test]
    fn admin_metrics_check_accepts_401() {
        let (http, aggregator) = http(&ScenarioConfig::new("checks"));
        let accepted = StatusSet::codes(&[200, 401]);

        assert!(http.check_status("metrics status is 200 or 401", &response(Some(200)), &accepted));
        assert!(http.check_status("metrics status is 200 or 401", &response(Some(401)), &accepted));
        assert!(!http.check_status("metrics status is 200 or 401", &response(Some(500)), &accepted));
        assert!(!http.check_status("metrics status is 200 or 401", &response(None), &accepted));

        let mut stats = AggregateStats::new();
        aggregator.collect(&mut stats);
        let tallies = stats.check_tallies();
        assert_eq!(tallies.len(), 1);
        assert_eq!((tallies[0].passes, tallies[0].fails), (2, 2));
    }

    #[test]
    fn groups_nest() {
        let (http, aggregator) = http(&ScenarioConfig::new("groups"));
        let inner = http.group("Admin").group("Metrics");
        inner.check("ok", true);

        let mut stats = AggregateStats::new();
        aggregator.collect(&mut stats);
        assert_eq!(
            stats.check_tallies()[0].group.as_deref(),
            Some("Admin::Metrics")
        );
    }
}
