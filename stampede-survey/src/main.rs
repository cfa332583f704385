use anyhow::Context;
use clap::Parser;
use stampede::ReqwestClient;
use stampede_survey::Cli;
use std::process::ExitCode;
use std::sync::Arc;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Exit status when the run completed but a threshold failed.
const THRESHOLDS_FAILED: u8 = 99;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stampede=info,stampede_survey=info"));
    FmtSubscriber::builder().with_env_filter(filter).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(THRESHOLDS_FAILED),
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Runs the load test and reports whether every threshold held.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let test = stampede_survey::load_test(&cli)?;
    let client = Arc::new(ReqwestClient::new(cli.request_timeout)?);

    let stop = test.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping the run");
            stop.stop();
        }
    });

    info!(base_url = %cli.base_url, journey = ?cli.journey, "Starting");
    let summary = test.run(client).await?;
    println!("{summary}");

    if let Some(path) = &cli.summary_path {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing the summary to {}", path.display()))?;
        info!("Summary written to {}", path.display());
    }

    Ok(summary.passed)
}
