//! Deterministic on-disk layout for archived entries.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use super::sanitize_for_path;

/// Build the archive directory for an entry.
///
/// Layout: `{base}/{author} - {category}/{YYYY}/{MM} - {MonthName}/{hash}`.
/// Author and category are sanitized; year and month come from the publish
/// time in its own offset. The result depends only on the inputs.
#[must_use]
pub fn build_archive_path<Tz>(
    base: &Path,
    author: &str,
    category: &str,
    published_at: &DateTime<Tz>,
    hash: &str,
) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let bucket = format!(
        "{} - {}",
        sanitize_for_path(author),
        sanitize_for_path(category)
    );
    let year = published_at.format("%Y").to_string();
    let month = published_at.format("%m - %B").to_string();

    base.join(bucket).join(year).join(month).join(hash)
}
