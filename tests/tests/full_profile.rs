mod utils;
#[allow(unused)]
use utils::*;

#[cfg(feature = "integration")]
mod tests {
    use super::*;

    use std::sync::OnceLock;
    use surge::prelude::*;
    use surge::{exit_code, EXIT_PASSED};

    static BASE: OnceLock<String> = OnceLock::new();

    /// The complete three minute stress profile against the mock accounts service.
    #[tokio::test(flavor = "multi_thread")]
    async fn stress_profile() {
        let base = init().await;
        BASE.get_or_init(|| base);

        let stats = svc_plus()
            .stages(vec![
                "30s:20".parse().unwrap(),
                "2m:100".parse().unwrap(),
                "30s:0".parse().unwrap(),
            ])
            .threshold("http_req_duration:p(95)<500".parse().unwrap())
            .threshold("http_req_failed:rate<0.01".parse().unwrap())
            .await
            .unwrap();

        println!("{}", Report(&stats));

        assert_eq!(stats.vus_max, 100);
        assert!(!stats.cancelled);
        // 100 VUs pausing one second each is a little under 100 iterations per second at peak.
        assert!(stats.iterations > 8_000, "{} iterations", stats.iterations);
        assert_eq!(exit_code(&stats), EXIT_PASSED);
    }

    #[scenario]
    async fn svc_plus(http: Http) {
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
}
