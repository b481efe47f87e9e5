use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DownloadError {
    /// The downloader could not be found on `PATH`.
    #[error("{tool} not found in PATH: {source}")]
    ToolUnavailable {
        tool: String,
        #[source]
        source: which::Error,
    },
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}\nOutput: {output}")]
    Failed {
        tool: String,
        status: ExitStatus,
        output: String,
    },
}

/// Wrapper around the `gallery-dl` executable.
#[derive(Debug, Clone)]
pub struct GalleryDl {
    program: String,
}

impl Default for GalleryDl {
    fn default() -> Self {
        Self::new("gallery-dl")
    }
}

impl GalleryDl {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Resolve the executable on `PATH` (or as a direct path).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ToolUnavailable`] if it cannot be found.
    pub fn resolve(&self) -> Result<PathBuf, DownloadError> {
        which::which(&self.program).map_err(|source| DownloadError::ToolUnavailable {
            tool: self.program.clone(),
            source,
        })
    }

    /// Whether the executable resolves.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.resolve().is_ok()
    }

    /// Download everything at `url` flat into `dest`.
    ///
    /// Modification times are not preserved and gallery-dl's own directory
    /// nesting is disabled, so all files land directly in `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool is missing, cannot be started, or exits
    /// unsuccessfully. The failure carries the combined output.
    pub async fn download(&self, dest: &Path, url: &str) -> Result<(), DownloadError> {
        let program = self.resolve()?;

        debug!(url = %url, dest = %dest.display(), "Running gallery-dl");

        let output = Command::new(&program)
            .arg("--dest")
            .arg(dest)
            .args(["--no-mtime", "--option", "directory=[]"])
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DownloadError::Spawn {
                tool: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(DownloadError::Failed {
                tool: self.program.clone(),
                status: output.status,
                output: combined,
            });
        }

        Ok(())
    }
}
