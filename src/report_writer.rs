// Report persistence: serialize to JSON and replace the destination file in full.
// No partial-write guard; the next scheduled write recreates a truncated file.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::models::Report;

pub const FALLBACK_FILE_NAME: &str = "monitoring.json";

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ReportWriter {
    path: PathBuf,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of bytes written.
    #[instrument(
        skip(self, report),
        fields(operation = "write_report", path = %self.path.display())
    )]
    pub fn write(&self, report: &Report) -> Result<usize, WriteError> {
        let output = serde_json::to_vec(report)?;
        std::fs::write(&self.path, &output).map_err(|source| WriteError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        debug!(bytes = output.len(), "report written");
        Ok(output.len())
    }
}

/// Default destination for a job: `<artifacts_root>/<job_name>/.metadata/monitoring`.
pub fn default_output_path(artifacts_root: &Path, job_name: &str) -> PathBuf {
    artifacts_root
        .join(job_name)
        .join(".metadata")
        .join("monitoring")
}

/// Keeps `path` when its parent directory exists; otherwise falls back to
/// `<cwd>/monitoring.json`.
pub fn resolve_output_path(path: &Path, cwd: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if parent.is_dir() {
        return path.to_path_buf();
    }
    let fallback = cwd.join(FALLBACK_FILE_NAME);
    warn!(
        dir = %parent.display(),
        fallback = %fallback.display(),
        "output directory doesn't exist, falling back"
    );
    fallback
}
