//! Output formatting abstraction for text vs JSON rendering
//!
//! Reports flow through [`OutputWriter`], which handles format switching so
//! the command handler never branches on the format itself.

use std::io::Write;

use serde::Serialize;

use porla_record::{RotationPreview, Trigger};

use crate::cli::OutputFormat;
use crate::error::CliError;

/// Writes CLI output in the selected format.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Render a payload to stdout.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        self.render_to(payload, &mut handle)
    }

    /// Render a payload to an arbitrary writer.
    ///
    /// For `Text` format, delegates to `Render::render_text()`.
    /// For `Json` format, serialises via `serde_json`.
    pub fn render_to<T: Render + Serialize>(
        &self,
        payload: &T,
        w: &mut dyn Write,
    ) -> Result<(), CliError> {
        match self.format {
            OutputFormat::Text => {
                payload.render_text(w)?;
            }
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, payload)?;
                writeln!(w)?;
            }
        }
        w.flush()?;
        Ok(())
    }
}

/// Trait for human-readable text rendering.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

impl Render for RotationPreview {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Target:       {}", self.target.display())?;

        let Some(policy) = &self.policy else {
            writeln!(w, "Rotation:     disabled (no --rotate-at or --rotate-interval)")?;
            return render_warnings(self, w);
        };

        match policy.trigger() {
            Trigger::Named(interval) => writeln!(
                w,
                "Schedule:     {} ({interval})",
                policy.cron_expression()
            )?,
            Trigger::Cron(expr) => writeln!(w, "Schedule:     {expr}")?,
        }
        writeln!(w, "Keep:         {}", policy.retention_count())?;
        writeln!(w, "Date format:  {}", policy.date_format())?;
        if let Some(path) = &self.config_path {
            writeln!(w, "Config path:  {}", path.display())?;
        }
        if let Some(line) = &self.job_line {
            writeln!(w, "Job entry:    {line}")?;
        }
        render_warnings(self, w)?;

        if let Some(document) = &self.document {
            writeln!(w)?;
            writeln!(w, "--- {} ---", document.file_name())?;
            write!(w, "{}", document.contents())?;
        }
        Ok(())
    }
}

fn render_warnings(preview: &RotationPreview, w: &mut dyn Write) -> std::io::Result<()> {
    for warning in &preview.warnings {
        writeln!(w, "Warning:      {}", warning.message)?;
    }
    Ok(())
}
