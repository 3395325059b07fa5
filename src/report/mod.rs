//! Report rendering
//!
//! Turns a finished snapshot into JSON or a human-readable summary and
//! writes it out.

use std::fs;
use std::io::Write;
use std::path::Path;

use minijinja::Environment;
use tracing::{debug, info};

use crate::error::InfoError;
use crate::snapshot::Snapshot;

/// Output format for a rendered snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed JSON, the full snapshot
    #[default]
    Json,
    /// Plain text summary
    Text,
}

/// Snapshot renderer
pub struct Reporter {
    env: Environment<'static>,
}

impl Reporter {
    pub fn new() -> Result<Self, InfoError> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        env.add_template("summary", include_str!("templates/summary.txt.jinja"))
            .map_err(|e| InfoError::Render(e.to_string()))?;

        Ok(Self { env })
    }

    pub fn render(&self, snapshot: &Snapshot, format: OutputFormat) -> Result<String, InfoError> {
        debug!(format = ?format, "Rendering snapshot");
        match format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(snapshot).map_err(|e| InfoError::Render(e.to_string()))
            }
            OutputFormat::Text => self.render_summary(snapshot),
        }
    }

    fn render_summary(&self, snapshot: &Snapshot) -> Result<String, InfoError> {
        let template = self
            .env
            .get_template("summary")
            .map_err(|e| InfoError::Render(e.to_string()))?;

        template
            .render(minijinja::Value::from_serialize(snapshot))
            .map_err(|e| InfoError::Render(e.to_string()))
    }
}

/// Write `content` to `path`, or to stdout when no path is given
pub fn write_output(content: &str, path: Option<&Path>) -> Result<(), InfoError> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(path, ensure_newline(content))?;
            info!(path = ?path, "Wrote snapshot");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(ensure_newline(content).as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn ensure_newline(content: &str) -> String {
    if content.ends_with('\n') {
        content.to_string()
    } else {
        format!("{}\n", content)
    }
}
