//! Run settings, merged from the command line, the environment and an optional JSON file.
//!
//! Command-line and environment values win over the file, which wins over the built-in
//! defaults of the svc.plus stress profile.
use crate::error::CliError;
use clap::Args;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;
use surge::{
    parse_duration, ConfigError, Metric, Stage, StatusSet, Threshold, DEFAULT_ACCOUNTS_URL,
    DEFAULT_BASE_URL, DEFAULT_ITERATION_PAUSE, DEFAULT_REQUEST_TIMEOUT,
};
#[allow(unused)]
use tracing::{debug, info};
use url::Url;

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// JSON config file providing any of the settings below
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Load stage as DURATION:TARGET, e.g. `30s:20` (repeatable)
    #[arg(short, long = "stage", value_name = "DURATION:TARGET")]
    pub stages: Vec<Stage>,

    /// Threshold as METRIC:EXPR, e.g. `http_req_duration:p(95)<500` (repeatable)
    #[arg(short, long = "threshold", value_name = "METRIC:EXPR")]
    pub thresholds: Vec<Threshold>,

    /// Pause between iterations of a virtual user
    #[arg(long, value_parser = parse_duration)]
    pub pause: Option<Duration>,

    /// Per-request timeout
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Global request-rate cap, in requests per second
    #[arg(long)]
    pub rps: Option<NonZeroU32>,

    /// Stop the run early once it has lasted this long
    #[arg(long, value_parser = parse_duration)]
    pub max_duration: Option<Duration>,

    /// Statuses accepted from the admin metrics endpoint, e.g. `200,401`
    #[arg(long, value_name = "STATUSES")]
    pub metrics_accept: Option<StatusSet>,

    /// Statuses of the admin metrics request that do not count toward `http_req_failed`.
    /// Defaults to the accepted set; pass `200-399` to count 401s as failed requests.
    #[arg(long, value_name = "STATUSES")]
    pub metrics_expected: Option<StatusSet>,

    #[arg(long, env = "BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long, env = "ACCOUNTS_URL")]
    pub accounts_url: Option<String>,

    /// Write the end-of-run summary as JSON to FILE
    #[arg(long, value_name = "FILE")]
    pub summary_export: Option<PathBuf>,

    /// Serve Prometheus metrics on this address while running
    #[arg(long, value_name = "ADDR")]
    pub prometheus: Option<SocketAddr>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub stages: Vec<FileStage>,
    /// Metric name to threshold expressions, e.g. `{"http_req_failed": ["rate<0.01"]}`.
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
    pub pause: Option<String>,
    pub timeout: Option<String>,
    pub rps: Option<NonZeroU32>,
    pub max_duration: Option<String>,
    pub metrics_accept: Option<String>,
    pub metrics_expected: Option<String>,
    pub base_url: Option<String>,
    pub accounts_url: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct FileStage {
    pub duration: String,
    pub target: u32,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CliError::ReadConfig(path.to_path_buf(), e))?;
        serde_json::from_str(&raw).map_err(|e| CliError::ParseConfig(path.to_path_buf(), e))
    }

    fn stages(&self) -> Result<Vec<Stage>, ConfigError> {
        self.stages
            .iter()
            .map(|s| Ok(Stage::new(parse_duration(&s.duration)?, s.target)))
            .collect()
    }

    fn thresholds(&self) -> Result<Vec<Threshold>, ConfigError> {
        self.thresholds
            .iter()
            .map(|(metric, exprs)| {
                let metric: Metric = metric.parse()?;
                exprs
                    .iter()
                    .map(|expr| Threshold::parse(metric, expr))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<Vec<_>>, _>>()
            .map(|nested| nested.into_iter().flatten().collect())
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub stages: Vec<Stage>,
    pub thresholds: Vec<Threshold>,
    pub pause: Duration,
    pub request_timeout: Duration,
    pub rps: Option<NonZeroU32>,
    pub max_duration: Option<Duration>,
    pub metrics_accept: StatusSet,
    pub metrics_expected: StatusSet,
    pub base_url: Url,
    pub accounts_url: Url,
    pub summary_export: Option<PathBuf>,
    pub prometheus: Option<SocketAddr>,
}

impl RunSettings {
    pub fn resolve(args: RunArgs) -> Result<Self, CliError> {
        let file = match &args.config {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                FileConfig::load(path)?
            }
            None => FileConfig::default(),
        };
        Ok(Self::merge(args, file)?)
    }

    pub fn merge(args: RunArgs, file: FileConfig) -> Result<Self, ConfigError> {
        let stages = if !args.stages.is_empty() {
            args.stages
        } else if !file.stages.is_empty() {
            file.stages()?
        } else {
            default_stages()
        };

        let thresholds = if !args.thresholds.is_empty() {
            args.thresholds
        } else if !file.thresholds.is_empty() {
            file.thresholds()?
        } else {
            default_thresholds()
        };

        let pause = pick_duration(args.pause, file.pause.as_deref())?.unwrap_or(DEFAULT_ITERATION_PAUSE);
        let request_timeout =
            pick_duration(args.timeout, file.timeout.as_deref())?.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let max_duration = pick_duration(args.max_duration, file.max_duration.as_deref())?;

        let metrics_accept = match (args.metrics_accept, file.metrics_accept.as_deref()) {
            (Some(set), _) => set,
            (None, Some(raw)) => raw.parse()?,
            (None, None) => StatusSet::codes(&[200, 401]),
        };
        let metrics_expected = match (args.metrics_expected, file.metrics_expected.as_deref()) {
            (Some(set), _) => set,
            (None, Some(raw)) => raw.parse()?,
            (None, None) => metrics_accept.clone(),
        };

        let base_url = parse_url(
            args.base_url
                .as_deref()
                .or(file.base_url.as_deref())
                .unwrap_or(DEFAULT_BASE_URL),
        )?;
        let accounts_url = parse_url(
            args.accounts_url
                .as_deref()
                .or(file.accounts_url.as_deref())
                .unwrap_or(DEFAULT_ACCOUNTS_URL),
        )?;

        Ok(Self {
            stages,
            thresholds,
            pause,
            request_timeout,
            rps: args.rps.or(file.rps),
            max_duration,
            metrics_accept,
            metrics_expected,
            base_url,
            accounts_url,
            summary_export: args.summary_export,
            prometheus: args.prometheus,
        })
    }

    pub fn log(&self) {
        info!(
            "Stages: {}",
            self.stages.iter().map(Stage::to_string).collect::<Vec<_>>().join(", ")
        );
        for threshold in &self.thresholds {
            info!("Threshold: {threshold}");
        }
        info!("Base URL: {}, accounts URL: {}", self.base_url, self.accounts_url);
    }
}

pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new(Duration::from_secs(30), 20),
        Stage::new(Duration::from_secs(120), 100),
        Stage::new(Duration::from_secs(30), 0),
    ]
}

pub fn default_thresholds() -> Vec<Threshold> {
    // Both expressions are constant and covered by tests.
    [
        (Metric::HttpReqDuration, "p(95)<500"),
        (Metric::HttpReqFailed, "rate<0.01"),
    ]
    .into_iter()
    .filter_map(|(metric, expr)| Threshold::parse(metric, expr).ok())
    .collect()
}

fn pick_duration(arg: Option<Duration>, file: Option<&str>) -> Result<Option<Duration>, ConfigError> {
    match (arg, file) {
        (Some(d), _) => Ok(Some(d)),
        (None, Some(raw)) => parse_duration(raw).map(Some),
        (None, None) => Ok(None),
    }
}

fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(raw.to_string(), e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(ConfigError::InvalidUrl(
            raw.to_string(),
            format!("unsupported scheme `{scheme}`"),
        )),
    }
}
