//! # certpost
//!
//! Scheduled certificate issuing: new form responses are turned into filled
//! presentation certificates and delivered to network drives, each with a converted
//! PDF copy.
//!
//! ## Pipeline
//!
//! - [`form_source`] yields form rows not processed yet
//! - [`normalize`] turns each row into a [`CanonicalRecord`](types::CanonicalRecord)
//! - [`template`] fills the certificate template for a record
//! - [`delivery`] mounts each destination, writes the certificate and converts it
//! - [`scheduler_task`] runs the pipeline at startup and then daily
//!
//! Every (record, destination) outcome is kept in a delivery ledger in the
//! [`db`], alongside stored credentials and the seen-row log.
//!
//! ## Quick Start
//!
//! ```no_run
//! use certpost::{AppContext, Config, run_with_shutdown};
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(std::path::Path::new("certpost.toml"))?;
//!     let context = Arc::new(AppContext::init(config).await?);
//!
//!     // Runs until SIGINT/SIGTERM, then stops the converter and closes the database
//!     let report = run_with_shutdown(context).await;
//!     println!("{} runs", report.runs);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Secondary-format conversion
pub mod converter;
/// Destination credentials
pub mod credentials;
/// Database persistence layer
pub mod db;
/// Certificate delivery to destinations
pub mod delivery;
/// Error types
pub mod error;
/// Form response sources
pub mod form_source;
/// Destination volume mounting
pub mod mount;
/// Row normalization
pub mod normalize;
/// Process context and pipeline run
pub mod pipeline;
/// Daily trigger computation
pub mod scheduler;
/// Scheduler loop
pub mod scheduler_task;
/// Certificate template rendering
pub mod template;
/// Core types
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::{Config, DestinationConfig, MountMethod};
pub use db::{Database, DeliveryStatus};
pub use error::{
    ConverterError, CredentialError, DatabaseError, DeliveryError, Error, FormSourceError,
    MountError, Result, TemplateError,
};
pub use pipeline::{AppContext, Components};
pub use scheduler::{DailyTrigger, Scheduler, Weekday};
pub use scheduler_task::{LoopReport, LoopState, ScheduledJob, SchedulerLoop};
pub use types::{CanonicalRecord, Identifier, RawRow, RunSummary};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run the scheduler loop until a termination signal, then shut the context down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// A run in progress when the signal arrives is finished before the loop stops.
pub async fn run_with_shutdown(context: Arc<AppContext>) -> LoopReport {
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    let signal_task = tokio::spawn(async move {
        wait_for_signal().await;
        signal_cancel.cancel();
    });

    let report = run_until_cancelled(context, cancel).await;
    signal_task.abort();
    report
}

/// Run the scheduler loop until `cancel` fires, then shut the context down
///
/// The converter listener, if any, is stopped and the database closed before this
/// returns.
pub async fn run_until_cancelled(context: Arc<AppContext>, cancel: CancellationToken) -> LoopReport {
    let schedule = &context.config().schedule;
    let scheduler = Scheduler::new(schedule.trigger(), chrono::Local::now());
    let report = SchedulerLoop::new(context.clone(), scheduler, schedule, cancel)
        .run()
        .await;

    context.shutdown().await;
    report
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
