//! Removal of local copies after a successful upload.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// What a cleanup pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub files_removed: usize,
    pub files_failed: usize,
    pub dir_removed: bool,
    pub ancestors_removed: usize,
}

/// Deletes archived entry directories and the empty scaffolding above them.
#[derive(Debug, Clone)]
pub struct CleanupManager {
    base_dir: PathBuf,
}

impl CleanupManager {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Delete the files directly inside `dir`, then `dir` itself, then any
    /// ancestors left empty, stopping at the base directory.
    ///
    /// A missing `dir` is not an error. Subdirectories are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error only if `dir` exists but cannot be listed.
    pub async fn cleanup(&self, dir: &Path) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();

        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            debug!(dir = %dir.display(), "Directory does not exist, nothing to clean up");
            return Ok(report);
        }

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .with_context(|| format!("Failed to read directory {}", dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to stat entry");
                    report.files_failed += 1;
                    continue;
                }
            };
            if file_type.is_dir() {
                continue;
            }

            let path = entry.path();
            match tokio::fs::remove_file(&path).await {
                Ok(()) => report.files_removed += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove file");
                    report.files_failed += 1;
                }
            }
        }

        match tokio::fs::remove_dir(dir).await {
            Ok(()) => report.dir_removed = true,
            Err(e) => {
                info!(dir = %dir.display(), error = %e, "Could not remove directory (may contain subdirectories)");
            }
        }

        if let Some(parent) = dir.parent() {
            report.ancestors_removed = self.prune_empty_ancestors(parent).await;
        }

        info!(
            dir = %dir.display(),
            files_removed = report.files_removed,
            files_failed = report.files_failed,
            "Cleanup completed"
        );
        Ok(report)
    }

    /// Remove `start` and its ancestors while they are empty.
    async fn prune_empty_ancestors(&self, start: &Path) -> usize {
        let base_parent = self.base_dir.parent();
        let mut removed = 0;
        let mut current = Some(start);

        while let Some(dir) = current {
            if dir == self.base_dir
                || Some(dir) == base_parent
                || !dir.starts_with(&self.base_dir)
            {
                break;
            }

            let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
                break;
            };
            match entries.next_entry().await {
                Ok(None) => {}
                _ => break,
            }

            if tokio::fs::remove_dir(dir).await.is_err() {
                break;
            }
            debug!(dir = %dir.display(), "Removed empty directory");
            removed += 1;
            current = dir.parent();
        }

        removed
    }
}
