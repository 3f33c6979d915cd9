use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::process::ExitCode;
use surge::prelude::*;
use surge::{exit_code, stop_signal, EXIT_CONFIG_ERROR, EXIT_PASSED};
#[allow(unused)]
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

mod config;
mod error;
mod summary;
mod svc_plus;

use config::{RunArgs, RunSettings};
use error::CliError;
use summary::SummaryExport;

// The binary is named `surge`, so its own events share the library's target prefix.
const DEFAULT_LOG_FILTER: &str = "surge=info";

/// Staged virtual-user HTTP load generator
#[derive(Parser, Debug)]
#[command(name = "surge", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the svc.plus stress scenario and evaluate its thresholds
    Run(RunArgs),
    /// Resolve and print the run settings without sending any request
    Validate(RunArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let res = match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Validate(args) => validate(args),
    };

    match res {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{e}");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn validate(args: RunArgs) -> Result<u8, CliError> {
    let settings = RunSettings::resolve(args)?;
    settings.log();
    info!("Configuration is valid.");
    Ok(EXIT_PASSED)
}

async fn run(args: RunArgs) -> Result<u8, CliError> {
    let settings = RunSettings::resolve(args)?;
    settings.log();

    if let Some(addr) = settings.prometheus {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!("Serving Prometheus metrics on {addr}");
    }

    let run_id = Uuid::new_v4();
    info!("Starting run {run_id}");

    let (handle, signal) = stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after in-flight iterations.");
            handle.stop();
        }
    });

    let mut scenario = svc_plus::scenario(svc_plus::Targets {
        accounts_url: settings.accounts_url.clone(),
        metrics_accept: settings.metrics_accept.clone(),
        metrics_expected: settings.metrics_expected.clone(),
    })
    .stages(settings.stages.clone())
    .thresholds(settings.thresholds.clone())
    .pause(settings.pause)
    .request_timeout(settings.request_timeout)
    .stop_signal(signal);

    if let Some(rps) = settings.rps {
        scenario = scenario.rps(rps);
    }
    if let Some(max) = settings.max_duration {
        scenario = scenario.max_duration(max);
    }

    let stats = scenario.await?;
    println!("{}", Report(&stats));

    if let Some(path) = &settings.summary_export {
        // The verdict stands even if the export fails.
        match SummaryExport::new(run_id, &stats).write(path).await {
            Ok(()) => info!("Summary written to {}", path.display()),
            Err(e) => error!("{e}"),
        }
    }

    Ok(exit_code(&stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "surge",
            "run",
            "--stage",
            "30s:20",
            "--stage",
            "2m:100",
            "--threshold",
            "http_req_duration:p(95)<500",
            "--metrics-accept",
            "200,401",
            "--rps",
            "20",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.stages.len(), 2);
        assert_eq!(args.stages[1].target, 100);
        assert_eq!(args.thresholds.len(), 1);
        assert!(args.metrics_accept.unwrap().contains(401));
    }

    #[test]
    fn default_log_filter_covers_the_binary() {
        assert!(module_path!().starts_with("surge::"));
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
        assert_eq!(DEFAULT_LOG_FILTER, "surge=info");
    }

    #[test]
    fn malformed_stage_is_rejected() {
        assert!(Cli::try_parse_from(["surge", "run", "--stage", "30s"]).is_err());
        assert!(Cli::try_parse_from(["surge", "run", "--threshold", "latency<5"]).is_err());
    }

    #[test]
    fn invalid_config_file_is_a_config_error() {
        let args = RunArgs {
            config: Some("/nonexistent/surge.json".into()),
            ..Default::default()
        };
        assert!(matches!(validate(args), Err(CliError::ReadConfig(..))));
    }
}
