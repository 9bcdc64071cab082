//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use porla_record::RotationRequest;

/// Append standard input to a file, optionally rotating it on a schedule.
///
/// Rotation is opt-in: without `--rotate-at` or `--rotate-interval` the file
/// simply grows. With a trigger, a logrotate policy is written and a cron job
/// is registered to run it.
#[derive(Parser, Debug)]
#[command(name = "record", version, about, long_about = None)]
pub struct RecordCli {
    /// File to append standard input to (created if missing).
    pub path: PathBuf,

    /// Rotate on a 5-field cron schedule, e.g. "0 0 * * *".
    #[arg(long, value_name = "CRON", conflicts_with = "rotate_interval")]
    pub rotate_at: Option<String>,

    /// Rotate on a named interval: hourly, daily, weekly or monthly.
    #[arg(long, value_name = "NAME")]
    pub rotate_interval: Option<String>,

    /// Number of archives to keep.
    #[arg(long, value_name = "N")]
    pub rotate_count: Option<u32>,

    /// strftime suffix for archive names, e.g. "-%Y%m%d".
    #[arg(long, value_name = "STRFTIME", allow_hyphen_values = true)]
    pub date_format: Option<String>,

    /// Path to a porla.toml configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate and print the rotation setup without writing or ingesting.
    #[arg(long)]
    pub dry_run: bool,

    /// Output format for --dry-run.
    #[arg(long, default_value = "text")]
    pub output: OutputFormat,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl RecordCli {
    /// Raw rotation input for the supervisor.
    pub fn rotation_request(&self) -> RotationRequest {
        RotationRequest {
            target: self.path.clone(),
            rotate_at: self.rotate_at.clone(),
            rotate_interval: self.rotate_interval.clone(),
            rotate_count: self.rotate_count,
            date_format: self.date_format.clone(),
        }
    }
}
