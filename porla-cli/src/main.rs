//! `record` -- append standard input to a file with optional scheduled rotation.
//!
//! Exit codes: 0 ingestion ran, 1 validation failure, 2 configuration error,
//! 10 the target could not be written.

mod cli;
mod error;
mod logging;
mod output;
mod record;

use clap::Parser;

use porla_core::config::{DEFAULT_CONFIG_PATH, PorlaConfig};

use crate::cli::RecordCli;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = RecordCli::parse();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("record: {e}");
            e.exit_code()
        }
    };

    // A blocking stdin read would otherwise hold up runtime shutdown.
    std::process::exit(code);
}

async fn run(cli: RecordCli) -> Result<(), CliError> {
    let config = load_config(&cli).await?;

    logging::init_tracing(&config.general).map_err(|e| CliError::Command(e.to_string()))?;
    porla_core::metrics::describe_all();

    tracing::debug!(
        path = %cli.path.display(),
        config = ?cli.config,
        "record starting"
    );

    record::execute(&cli, &config).await
}

/// Load configuration with CLI flag overrides applied.
///
/// An explicit `--config` must exist; the default path is optional.
async fn load_config(cli: &RecordCli) -> Result<PorlaConfig, CliError> {
    let mut config = match &cli.config {
        Some(path) => PorlaConfig::load(path).await?,
        None => PorlaConfig::load_or_default(DEFAULT_CONFIG_PATH).await?,
    };

    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    config.validate()?;
    Ok(config)
}
