use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use tracing::{info, warn};

use super::{build_archive_path, CleanupManager, CleanupReport, GalleryDl};
use crate::chibisafe::{UploadReport, Uploader};

/// Everything the archive sequence needs to know about one entry.
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    pub hash: String,
    pub url: String,
    pub author: String,
    pub category: String,
    pub title: String,
    pub published_at: DateTime<FixedOffset>,
}

/// How far the archive sequence got for a job.
#[derive(Debug)]
pub enum ArchiveOutcome {
    /// The downloader is not installed; nothing was written.
    ToolUnavailable,
    /// Downloaded, no upload target configured.
    Downloaded { dir: PathBuf },
    /// Downloaded and uploaded; `cleanup` is set when local copies were removed.
    Uploaded {
        dir: PathBuf,
        report: UploadReport,
        cleanup: Option<CleanupReport>,
    },
}

/// Download → upload → cleanup for a single entry.
#[derive(Debug, Clone)]
pub struct ArchivePipeline {
    base_dir: PathBuf,
    downloader: GalleryDl,
    uploader: Option<Uploader>,
    cleanup: Option<CleanupManager>,
}

impl ArchivePipeline {
    /// `cleanup_after_upload` only has an effect when an uploader is present.
    #[must_use]
    pub fn new(
        base_dir: impl Into<PathBuf>,
        downloader: GalleryDl,
        uploader: Option<Uploader>,
        cleanup_after_upload: bool,
    ) -> Self {
        let base_dir = base_dir.into();
        let cleanup = cleanup_after_upload.then(|| CleanupManager::new(base_dir.clone()));
        Self {
            base_dir,
            downloader,
            uploader,
            cleanup,
        }
    }

    /// Directory an entry is archived into.
    #[must_use]
    pub fn archive_dir(&self, job: &ArchiveJob) -> PathBuf {
        build_archive_path(
            &self.base_dir,
            &job.author,
            &job.category,
            &job.published_at,
            &job.hash,
        )
    }

    /// Run the archive sequence for one entry.
    ///
    /// A missing downloader is not an error; the entry is left un-archived.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, the download
    /// fails, or the upload cannot start (album or listing failure).
    pub async fn run(&self, job: &ArchiveJob) -> Result<ArchiveOutcome> {
        info!(hash = %job.hash, url = %job.url, "Starting download");

        if let Err(e) = self.downloader.resolve() {
            warn!(hash = %job.hash, "Skipping archive: {e}");
            return Ok(ArchiveOutcome::ToolUnavailable);
        }

        let dir = self.archive_dir(job);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;

        self.downloader
            .download(&dir, &job.url)
            .await
            .with_context(|| format!("Download failed for {}", job.url))?;
        info!(hash = %job.hash, dir = %dir.display(), "Download completed");

        let Some(uploader) = &self.uploader else {
            return Ok(ArchiveOutcome::Downloaded { dir });
        };

        let report = uploader
            .upload_directory(&dir, &job.category, &job.author, &job.title)
            .await
            .context("Chibisafe upload failed")?;
        info!(
            hash = %job.hash,
            uploaded = report.uploaded.len(),
            failed = report.failed,
            skipped = report.skipped,
            "Chibisafe upload completed"
        );

        let cleanup = match &self.cleanup {
            Some(manager) if report.is_complete() => match manager.cleanup(&dir).await {
                Ok(cleaned) => Some(cleaned),
                Err(e) => {
                    warn!(dir = %dir.display(), "Cleanup failed: {e:#}");
                    None
                }
            },
            Some(_) => {
                warn!(
                    dir = %dir.display(),
                    failed = report.failed,
                    "Keeping local copies because some uploads failed"
                );
                None
            }
            None => None,
        };

        Ok(ArchiveOutcome::Uploaded {
            dir,
            report,
            cleanup,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ArchiveJob {
        ArchiveJob {
            hash: "abc123".to_string(),
            url: "https://example.com/post".to_string(),
            author: "Jane".to_string(),
            category: "Patreon".to_string(),
            title: "My Post".to_string(),
            published_at: DateTime::parse_from_rfc3339("2024-03-15T10:00:00Z").unwrap(),
        }
    }

    #[test]
    fn test_archive_dir() {
        let pipeline = ArchivePipeline::new("/base", GalleryDl::default(), None, false);
        assert_eq!(
            pipeline.archive_dir(&job()),
            PathBuf::from("/base/Jane - Patreon/2024/03 - March/abc123")
        );
    }

    #[tokio::test]
    async fn test_missing_tool_leaves_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = ArchivePipeline::new(
            tmp.path(),
            GalleryDl::new("definitely-not-a-real-downloader-7f3a"),
            None,
            true,
        );

        let outcome = pipeline.run(&job()).await.unwrap();
        assert!(matches!(outcome, ArchiveOutcome::ToolUnavailable));
        assert!(!tmp.path().join("Jane - Patreon").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_only_without_uploader() {
        use std::os::unix::fs::PermissionsExt;

        let bin = tempfile::tempdir().unwrap();
        let script = bin.path().join("fake-gdl");
        std::fs::write(&script, "#!/bin/sh\ntouch \"$2/image.jpg\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let base = tempfile::tempdir().unwrap();
        let pipeline = ArchivePipeline::new(
            base.path(),
            GalleryDl::new(script.to_string_lossy()),
            None,
            true,
        );

        let outcome = pipeline.run(&job()).await.unwrap();
        let ArchiveOutcome::Downloaded { dir } = outcome else {
            panic!("expected download-only outcome");
        };
        // No uploader, so nothing is cleaned up
        assert!(dir.join("image.jpg").exists());
    }
}
