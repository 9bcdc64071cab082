//! `record` command handler
//!
//! Runs the supervisor startup sequence, then copies stdin into the target
//! until end of input or SIGINT/SIGTERM.

use tracing::{info, warn};

use porla_core::config::PorlaConfig;
use porla_record::{
    CrontabJobStore, FileJobStore, IngestSettings, IngestWriter, JobStores, ProcessScheduler,
    Supervisor, SupervisorSettings,
};

use crate::cli::RecordCli;
use crate::error::CliError;
use crate::output::OutputWriter;

/// Execute the `record` command.
///
/// Only validation failures and target I/O failures are returned as errors.
/// Rotation setup problems are logged as warnings and ingestion proceeds.
pub async fn execute(cli: &RecordCli, config: &PorlaConfig) -> Result<(), CliError> {
    let request = cli.rotation_request();
    let supervisor = Supervisor::new(
        SupervisorSettings::from_config(config),
        JobStores {
            system: FileJobStore::new(&config.scheduler.job_table),
            user: CrontabJobStore::from_core(&config.scheduler),
        },
        ProcessScheduler::from_core(&config.scheduler),
    );

    if cli.dry_run {
        let preview = supervisor.preview(&request)?;
        return OutputWriter::new(cli.output).render(&preview);
    }

    let mut report = supervisor.start(&request).await?;
    info!(
        state = %report.state(),
        config_path = ?report.config_path,
        root_scope = ?report.root_scope,
        registration = ?report.registration,
        "startup complete"
    );

    let settings = IngestSettings::from_core(&config.ingest);
    let writer = IngestWriter::open(&report.target, settings).await?;
    let stats = writer.run(tokio::io::stdin(), shutdown_signal()).await?;
    report.stop();

    info!(
        state = %report.state(),
        lines = stats.lines,
        bytes = stats.bytes,
        stop_reason = ?stats.stop_reason,
        "record finished"
    );
    Ok(())
}

/// Resolves on SIGTERM or SIGINT.
///
/// If the handlers cannot be installed the future never resolves and
/// ingestion runs until end of input.
async fn shutdown_signal() {
    match wait_for_shutdown_signal().await {
        Ok(signal) => info!(signal, "shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "signal handlers unavailable, stopping only at end of input");
            std::future::pending::<()>().await;
        }
    }
}

async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
