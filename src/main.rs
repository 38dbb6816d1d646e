//! certpost binary: issue certificates for new form responses, now and every day.

use certpost::{AppContext, Config, run_with_shutdown};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "certpost",
    version,
    about = "Render certificates for new form responses and deliver them to network drives.",
    long_about = None,
)]
struct Cli {
    /// Configuration file (defaults to ~/.config/certpost/certpost.toml)
    #[arg(short, long, env = "CERTPOST_CONFIG")]
    config: Option<PathBuf>,

    /// Run the pipeline once and exit instead of following the schedule
    #[arg(long)]
    once: bool,

    /// Log filter, overriding RUST_LOG (e.g. "debug" or "certpost=trace")
    #[arg(long)]
    log_level: Option<String>,
}

fn init_tracing(cli: &Cli) {
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    let Some(config_path) = cli.config.clone().or_else(Config::default_path) else {
        eprintln!("certpost: no configuration file given and no config directory found");
        return ExitCode::FAILURE;
    };

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("certpost: {}: {}", config_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let context = match AppContext::init(config).await {
        Ok(context) => Arc::new(context),
        Err(e) => {
            eprintln!("certpost: startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.once {
        let summary = context.run_once().await;
        context.shutdown().await;
        println!(
            "certpost: {} new rows, {} certificates rendered, {} delivered, {} converted",
            summary.rows_fetched,
            summary.records_rendered,
            summary.primary_delivered,
            summary.secondary_delivered
        );
        return ExitCode::SUCCESS;
    }

    tracing::info!(config = %config_path.display(), "certpost started");
    let report = run_with_shutdown(context).await;
    println!("certpost: stopped after {} runs. Done.", report.runs);
    ExitCode::SUCCESS
}
