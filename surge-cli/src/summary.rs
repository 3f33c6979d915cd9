//! JSON export of the end-of-run summary.
use crate::error::CliError;
use serde::Serialize;
use std::path::Path;
use std::time::SystemTime;
use surge::RunStatistics;
use uuid::Uuid;

#[derive(Serialize)]
pub struct SummaryExport<'a> {
    pub run_id: Uuid,
    #[serde(with = "rfc3339")]
    pub finished_at: SystemTime,
    pub passed: bool,
    pub exit_code: u8,
    #[serde(flatten)]
    pub stats: &'a RunStatistics,
}

mod rfc3339 {
    use serde::Serializer;
    use std::time::SystemTime;

    pub fn serialize<S: Serializer>(time: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_rfc3339_millis(*time))
    }
}

impl<'a> SummaryExport<'a> {
    pub fn new(run_id: Uuid, stats: &'a RunStatistics) -> Self {
        Self {
            run_id,
            finished_at: SystemTime::now(),
            passed: stats.passed(),
            exit_code: surge::exit_code(stats),
            stats,
        }
    }

    pub fn to_json(&self) -> Result<String, CliError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub async fn write(&self, path: &Path) -> Result<(), CliError> {
        let json = self.to_json()?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| CliError::WriteSummary(path.to_path_buf(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use surge::{CheckTally, TrendSummary};

    fn stats() -> RunStatistics {
        RunStatistics {
            name: "svc_plus".to_string(),
            elapsed: Duration::from_secs(180),
            cancelled: false,
            vus_max: 100,
            requests: 2_000,
            failed_requests: 4,
            request_rate: 11.1,
            http_req_duration: TrendSummary::default(),
            iterations: 1_000,
            failed_iterations: 0,
            iteration_duration: TrendSummary::default(),
            checks: vec![CheckTally {
                group: Some("Auth Session Check".to_string()),
                name: "session status is 200".to_string(),
                passes: 996,
                fails: 4,
            }],
            thresholds: vec![],
        }
    }

    #[test]
    fn exports_run_id_and_verdict() {
        let stats = stats();
        let id = Uuid::new_v4();
        let json = SummaryExport::new(id, &stats).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["run_id"], id.to_string());
        assert_eq!(value["passed"], true);
        assert_eq!(value["exit_code"], 0);
        assert_eq!(value["requests"], 2_000);
        assert_eq!(value["checks"][0]["fails"], 4);
        assert!(value["finished_at"].as_str().unwrap().ends_with('Z'));
    }
}
