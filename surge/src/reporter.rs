//! End-of-run verdict and human-readable summary.
use crate::aggregator::AggregateStats;
use std::fmt;
use surge_core::{
    Metric, RunStatistics, ScenarioConfig, TrendSummary, EXIT_PASSED, EXIT_THRESHOLD_FAILED,
};

/// Evaluate the thresholds one final time and freeze the statistics.
pub(crate) fn finalize(
    config: &ScenarioConfig,
    stats: &AggregateStats,
    cancelled: bool,
) -> RunStatistics {
    let elapsed = stats.elapsed();
    let request_rate = if elapsed.is_zero() {
        0.
    } else {
        stats.requests() as f64 / elapsed.as_secs_f64()
    };

    RunStatistics {
        name: config.name.clone(),
        elapsed,
        cancelled,
        vus_max: stats.vus_max(),
        requests: stats.requests(),
        failed_requests: stats.failed_requests(),
        request_rate,
        http_req_duration: stats.http_req_duration(),
        iterations: stats.iterations(),
        failed_iterations: stats.failed_iterations(),
        iteration_duration: stats.iteration_duration(),
        checks: stats.check_tallies(),
        thresholds: stats.evaluate(&config.thresholds),
    }
}

/// Process exit code for a finished run.
pub fn exit_code(stats: &RunStatistics) -> u8 {
    if stats.passed() {
        EXIT_PASSED
    } else {
        EXIT_THRESHOLD_FAILED
    }
}

/// Renders [`RunStatistics`] as a terminal summary.
pub struct Report<'a>(pub &'a RunStatistics);

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.0;

        writeln!(f)?;
        writeln!(
            f,
            "  scenario: {} ({}{})",
            stats.name,
            humantime::format_duration(std::time::Duration::from_millis(
                stats.elapsed.as_millis() as u64
            )),
            if stats.cancelled { ", cancelled" } else { "" }
        )?;
        writeln!(f)?;

        let mut group: Option<&str> = None;
        for check in &stats.checks {
            if check.group.as_deref() != group {
                group = check.group.as_deref();
                if let Some(name) = group {
                    writeln!(f, "  █ {name}")?;
                }
            }
            let mark = if check.fails == 0 { '✓' } else { '✗' };
            write!(f, "    {mark} {}", check.name)?;
            if check.fails > 0 {
                let total = check.passes + check.fails;
                let pct = check.passes as f64 / total as f64 * 100.;
                write!(
                    f,
                    "\n     ↳  {pct:.0}% ✓ {} / ✗ {}",
                    check.passes, check.fails
                )?;
            }
            writeln!(f)?;
        }
        if !stats.checks.is_empty() {
            writeln!(f)?;
        }

        let (passes, fails) = stats
            .checks
            .iter()
            .fold((0, 0), |(p, n), c| (p + c.passes, n + c.fails));
        if passes + fails > 0 {
            line(
                f,
                Metric::Checks,
                &format!(
                    "{:.2}% ✓ {passes} ✗ {fails}",
                    passes as f64 / (passes + fails) as f64 * 100.
                ),
            )?;
        }
        line(f, Metric::HttpReqDuration, &trend(&stats.http_req_duration))?;
        line(
            f,
            Metric::HttpReqFailed,
            &format!(
                "{:.2}% ✓ {} ✗ {}",
                stats.error_rate() * 100.,
                stats.failed_requests,
                stats.requests - stats.failed_requests
            ),
        )?;
        line(
            f,
            Metric::HttpReqs,
            &format!("{} {:.2}/s", stats.requests, stats.request_rate),
        )?;
        line(f, Metric::IterationDuration, &trend(&stats.iteration_duration))?;
        line(
            f,
            Metric::Iterations,
            &format!("{} ({} failed)", stats.iterations, stats.failed_iterations),
        )?;
        line(f, Metric::VusMax, &stats.vus_max.to_string())?;

        if !stats.thresholds.is_empty() {
            writeln!(f)?;
            writeln!(f, "  thresholds:")?;
            for outcome in &stats.thresholds {
                let mark = if outcome.passed { '✓' } else { '✗' };
                let observed = outcome
                    .observed
                    .map(|v| format!("{v:.4}"))
                    .unwrap_or_else(|| "no samples".to_string());
                writeln!(f, "    {mark} {} (observed {observed})", outcome.threshold)?;
            }
        }

        writeln!(f)?;
        if stats.passed() {
            writeln!(f, "  PASSED")
        } else {
            writeln!(f, "  FAILED: some thresholds have failed")
        }
    }
}

fn line(f: &mut fmt::Formatter<'_>, metric: Metric, value: &str) -> fmt::Result {
    let name = format!("{metric}");
    writeln!(f, "  {name:.<28}: {value}")
}

fn trend(t: &TrendSummary) -> String {
    format!(
        "avg={:.2}ms min={:.2}ms med={:.2}ms max={:.2}ms p(90)={:.2}ms p(95)={:.2}ms",
        t.avg, t.min, t.med, t.max, t.p90, t.p95
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};
    use surge_core::{CheckResult, RequestResult, Sample, Stage};

    fn stats_with(latency_ms: u64, failures: usize) -> AggregateStats {
        let mut stats = AggregateStats::new();
        for i in 0..1_000 {
            let failed = i < failures;
            stats.ingest(&Sample::Request(RequestResult {
                timestamp: SystemTime::now(),
                url: Arc::from("https://accounts.svc.plus/api/auth/session"),
                group: Some(Arc::from("Auth Session Check")),
                duration: Duration::from_millis(latency_ms),
                status: Some(if failed { 500 } else { 200 }),
                failed,
                error: None,
            }));
            stats.ingest(&Sample::Check(CheckResult {
                name: Arc::from("session status is 200"),
                group: Some(Arc::from("Auth Session Check")),
                passed: !failed,
            }));
        }
        stats.observe_vus(100, 100);
        stats.set_elapsed(Duration::from_secs(180));
        stats
    }

    fn script_config() -> ScenarioConfig {
        let mut config = ScenarioConfig::new("svc_plus");
        config.stages = vec![
            Stage::new(Duration::from_secs(30), 20),
            Stage::new(Duration::from_secs(120), 100),
            Stage::new(Duration::from_secs(30), 0),
        ];
        config.thresholds = vec![
            "http_req_duration:p(95)<500".parse().unwrap(),
            "http_req_failed:rate<0.01".parse().unwrap(),
        ];
        config
    }

    #[test]
    fn passing_run_exits_zero() {
        let stats = finalize(&script_config(), &stats_with(180, 5), false);
        assert!(stats.passed());
        assert_eq!(exit_code(&stats), EXIT_PASSED);
        assert_eq!(stats.requests, 1_000);
        assert_eq!(stats.vus_max, 100);
    }

    #[test]
    fn slow_run_exits_one() {
        let stats = finalize(&script_config(), &stats_with(650, 0), false);
        assert!(!stats.thresholds[0].passed);
        assert!(stats.thresholds[1].passed);
        assert_eq!(exit_code(&stats), EXIT_THRESHOLD_FAILED);
    }

    #[test]
    fn erroring_run_exits_one() {
        let stats = finalize(&script_config(), &stats_with(100, 10), false);
        assert!(stats.thresholds[0].passed);
        assert!(!stats.thresholds[1].passed);
        assert_eq!(exit_code(&stats), EXIT_THRESHOLD_FAILED);
    }

    #[test]
    fn renders_summary() {
        let stats = finalize(&script_config(), &stats_with(180, 5), false);
        let out = Report(&stats).to_string();

        assert!(out.contains("█ Auth Session Check"));
        assert!(out.contains("✗ session status is 200"));
        assert!(out.contains("✓ 995 / ✗ 5"));
        assert!(out.contains("http_req_duration"));
        assert!(out.contains("✓ http_req_duration:p(95)<500"));
        assert!(out.contains("PASSED"));
    }
}
