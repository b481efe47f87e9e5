pub mod cleanup;
pub mod gallerydl;
pub mod path;
pub mod pipeline;
pub mod worker;

pub use cleanup::{CleanupManager, CleanupReport};
pub use gallerydl::{DownloadError, GalleryDl};
pub use path::build_archive_path;
pub use pipeline::{ArchiveJob, ArchiveOutcome, ArchivePipeline};
pub use worker::{ArchivePool, ArchiveQueue, ArchiveSlot, QueueError};

/// Placeholder used when a path component would otherwise be empty.
pub const UNKNOWN_COMPONENT: &str = "unknown";

/// Make a string safe to use as a single path component.
///
/// Every character that is not a letter, a digit, `_` or `-` becomes `_`.
/// An empty input becomes `"unknown"`.
///
/// # Examples
///
/// ```
/// # use feed_media_archiver::archiver::sanitize_for_path;
/// assert_eq!(sanitize_for_path("My Post!"), "My_Post_");
/// assert_eq!(sanitize_for_path(""), "unknown");
/// ```
#[must_use]
pub fn sanitize_for_path(s: &str) -> String {
    if s.is_empty() {
        return UNKNOWN_COMPONENT.to_string();
    }

    s.chars()
        .map(|c| match c {
            '_' | '-' => c,
            c if c.is_alphanumeric() => c,
            _ => '_',
        })
        .collect()
}
