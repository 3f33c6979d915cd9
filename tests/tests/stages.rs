mod utils;
#[allow(unused)]
use utils::*;

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use surge::prelude::*;
use surge::{exit_code, Scenario, EXIT_PASSED, EXIT_THRESHOLD_FAILED};

static BASE: OnceLock<String> = OnceLock::new();

#[scenario]
async fn accounts(http: Http) {
    let Some(base) = BASE.get() else { return };
    let accepted = StatusSet::codes(&[200, 401]);

    let auth = http.group("Auth Session Check");
    let res = auth.get(&format!("{base}/api/auth/session")).await;
    auth.check("session status is 200", res.status == Some(200));

    let admin = http.group("Admin Metrics Payload");
    let res = admin
        .get_expecting(&format!("{base}/api/admin/users/metrics"), &accepted)
        .await;
    admin.check_status("metrics status is 200 or 401", &res, &accepted);
}

#[tracing_test::traced_test]
#[tokio::test]
#[ntest::timeout(30_000)]
async fn short_profile_passes_with_unauthorized_admin() {
    let base = init().await;
    BASE.get_or_init(|| base);

    let stats = accounts()
        .stage(Duration::from_secs(1), 5)
        .stage(Duration::from_secs(1), 10)
        .stage(Duration::from_millis(500), 0)
        .pause(Duration::from_millis(100))
        .tick(Duration::from_millis(20))
        .threshold("http_req_duration:p(95)<500".parse().unwrap())
        .threshold("http_req_failed:rate<0.01".parse().unwrap())
        .threshold("checks:rate==1".parse().unwrap())
        .await
        .unwrap();

    assert_eq!(stats.name, "accounts");
    assert!(stats.requests >= 20);
    assert_eq!(stats.requests, stats.iterations * 2);
    assert_eq!(stats.failed_requests, 0);
    assert!(stats.vus_max <= 10);
    assert!(stats.checks.iter().all(|c| c.fails == 0));
    assert_eq!(exit_code(&stats), EXIT_PASSED);
    assert!(logs_contain("Scenario complete"));
}

#[tracing_test::traced_test]
#[tokio::test]
#[ntest::timeout(30_000)]
async fn server_errors_fail_checks_and_thresholds() {
    let base = init().await;
    let url = format!("{base}/status/500");

    let stats = Scenario::new("errors", move |http: Http| {
        let url = url.clone();
        async move {
            let res = http.get(&url).await;
            http.check_status("metrics status is 200 or 401", &res, &StatusSet::codes(&[200, 401]));
        }
    })
    .stage(Duration::from_millis(500), 2)
    .pause(Duration::from_millis(50))
    .tick(Duration::from_millis(20))
    .threshold("http_req_failed:rate<0.01".parse().unwrap())
    .await
    .unwrap();

    assert_eq!(stats.failed_requests, stats.requests);
    assert_eq!(stats.checks[0].passes, 0);
    assert!(!stats.thresholds[0].passed);
    assert_eq!(exit_code(&stats), EXIT_THRESHOLD_FAILED);
}

#[tracing_test::traced_test]
#[tokio::test]
#[ntest::timeout(30_000)]
async fn unreachable_host_fails_the_run() {
    init().await;

    let stats = Scenario::new("unreachable", |http: Http| async move {
        // Nothing listens on port 1.
        http.get("http://127.0.0.1:1/api/auth/session").await;
    })
    .stage(Duration::from_millis(300), 2)
    .pause(Duration::from_millis(50))
    .tick(Duration::from_millis(20))
    .request_timeout(Duration::from_secs(2))
    .threshold("http_req_failed:rate<0.01".parse().unwrap())
    .await
    .unwrap();

    assert!(stats.requests > 0);
    assert_eq!(stats.error_rate(), 1.);
    assert_eq!(exit_code(&stats), EXIT_THRESHOLD_FAILED);
}

#[tracing_test::traced_test]
#[tokio::test]
#[ntest::timeout(30_000)]
async fn ramp_down_waits_for_slow_requests() {
    let base = init().await;
    let url = format!("{base}/delay/ms/400");
    let in_flight = Arc::new(AtomicUsize::new(0));
    let flight = in_flight.clone();

    let stats = Scenario::new("drain", move |http: Http| {
        let url = url.clone();
        let flight = flight.clone();
        async move {
            flight.fetch_add(1, Ordering::SeqCst);
            http.get(&url).await;
            flight.fetch_sub(1, Ordering::SeqCst);
        }
    })
    .stage(Duration::from_millis(600), 4)
    .stage(Duration::ZERO, 0)
    .pause(Duration::from_millis(10))
    .tick(Duration::from_millis(20))
    .await
    .unwrap();

    assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    assert_eq!(stats.requests, stats.iterations);
    assert_eq!(stats.failed_requests, 0);
    // Requests still running at the end of the schedule were completed, not dropped.
    assert!(stats.http_req_duration.min >= 390.);
    assert!(stats.elapsed >= Duration::from_millis(600));
}

#[tracing_test::traced_test]
#[tokio::test]
#[ntest::timeout(30_000)]
async fn rps_limit_keeps_server_under_its_quota() {
    let base = init().await;
    let url = format!("{base}/limited/50/key/rps");

    let stats = Scenario::new("rps", move |http: Http| {
        let url = url.clone();
        async move {
            http.get(&url).await;
        }
    })
    .stage(Duration::from_secs(2), 10)
    .pause(Duration::ZERO)
    .tick(Duration::from_millis(20))
    .rps(NonZeroU32::new(20).unwrap())
    .threshold("http_req_failed:rate==0".parse().unwrap())
    .await
    .unwrap();

    assert!(stats.requests <= 80, "{} requests", stats.requests);
    assert!(stats.passed(), "{:?}", stats.thresholds);
}

#[tracing_test::traced_test]
#[tokio::test]
#[ntest::timeout(30_000)]
async fn partial_failures_break_the_error_rate_threshold() {
    let base = init().await;
    let url = format!("{base}/flaky/10");

    let stats = Scenario::new("flaky", move |http: Http| {
        let url = url.clone();
        async move {
            http.get(&url).await;
        }
    })
    .stage(Duration::from_secs(1), 4)
    .pause(Duration::from_millis(5))
    .tick(Duration::from_millis(20))
    .threshold("http_req_failed:rate<0.01".parse().unwrap())
    .await
    .unwrap();

    // Roughly one request in ten answers 500.
    assert!(stats.requests >= 100, "{} requests", stats.requests);
    let rate = stats.error_rate();
    assert!((0.02..0.25).contains(&rate), "error rate {rate}");
    assert!(!stats.thresholds[0].passed);
    assert_eq!(exit_code(&stats), EXIT_THRESHOLD_FAILED);
}
