//! Built-in stress scenario against the svc.plus accounts service.
use std::sync::Arc;
use surge::prelude::*;
use surge::{ConfigError, Scenario};
use url::Url;

pub const SESSION_GROUP: &str = "Auth Session Check";
pub const SESSION_CHECK: &str = "session status is 200";
pub const METRICS_GROUP: &str = "Admin Metrics Payload";
pub const METRICS_CHECK: &str = "metrics status is 200 or 401";

#[derive(Debug, Clone)]
pub struct Targets {
    pub accounts_url: Url,
    /// Statuses the admin metrics check accepts. Unauthenticated runs get a 401.
    pub metrics_accept: StatusSet,
    /// Statuses of the admin metrics request that are not failed requests.
    pub metrics_expected: StatusSet,
}

impl Targets {
    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.accounts_url.as_str().trim_end_matches('/'))
    }
}

pub fn scenario(
    targets: Targets,
) -> impl ConfigurableScenario<Result<RunStatistics, ConfigError>> {
    let targets = Arc::new(targets);
    Scenario::new("svc_plus", move |http: Http| {
        let targets = targets.clone();
        async move { iteration(http, &targets).await }
    })
}

async fn iteration(http: Http, targets: &Targets) {
    let auth = http.group(SESSION_GROUP);
    let res = auth.get(&targets.endpoint("/api/auth/session")).await;
    auth.check(SESSION_CHECK, res.status == Some(200));

    let admin = http.group(METRICS_GROUP);
    let res = admin
        .get_expecting(
            &targets.endpoint("/api/admin/users/metrics"),
            &targets.metrics_expected,
        )
        .await;
    admin.check_status(METRICS_CHECK, &res, &targets.metrics_accept);
}
