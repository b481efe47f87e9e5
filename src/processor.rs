//! Per-entry handling of webhook events: dedup, record, archive, notify.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, info, warn};

use crate::archiver::{ArchiveJob, ArchiveQueue};
use crate::db::{Database, NewPost};
use crate::discord::DiscordNotifier;
use crate::miniflux::MinifluxClient;
use crate::model::{Entry, Feed};

/// What happened to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Already recorded; nothing was done.
    Duplicate,
    /// Recorded now and handed to the archive workers.
    Persisted,
}

#[derive(Debug, Clone)]
pub struct EntryProcessor {
    db: Database,
    queue: ArchiveQueue,
    miniflux: Option<MinifluxClient>,
    notifier: Option<DiscordNotifier>,
}

impl EntryProcessor {
    #[must_use]
    pub const fn new(
        db: Database,
        queue: ArchiveQueue,
        miniflux: Option<MinifluxClient>,
        notifier: Option<DiscordNotifier>,
    ) -> Self {
        Self {
            db,
            queue,
            miniflux,
            notifier,
        }
    }

    /// Record a new entry and start archiving it.
    ///
    /// A queue slot is reserved before the entry is recorded, so every recorded
    /// entry has an archive job. While the queue is full this waits for the
    /// workers to catch up. Archiving runs in the background; the caller never
    /// sees its outcome. Mark-read and notification failures are logged, not
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the dedup lookup or the insert fails, or if the
    /// archive queue has closed. The entry is not recorded in either case.
    pub async fn process(&self, feed: &Feed, entry: &Entry) -> Result<ProcessOutcome> {
        if self
            .db
            .exists(&entry.hash)
            .await
            .context("Failed to check for existing entry")?
        {
            debug!(hash = %entry.hash, "Entry already exists");
            return Ok(ProcessOutcome::Duplicate);
        }

        let slot = self
            .queue
            .reserve()
            .await
            .context("Cannot schedule archive job")?;

        let published_at = parse_published_at(&entry.published_at);

        let post = NewPost {
            site_url: feed.site_url.clone(),
            entry_id: entry.id,
            hash: entry.hash.clone(),
            title: entry.title.clone(),
            url: entry.url.clone(),
            published_at: published_at.to_rfc3339(),
            content: entry.content.clone(),
            author: entry.author.clone(),
            category_id: feed.category.id,
            category_title: feed.category.title.clone(),
        };

        let Some(post_id) = self
            .db
            .create(&post)
            .await
            .context("Failed to save entry")?
        else {
            debug!(hash = %entry.hash, "Entry recorded concurrently by another request");
            return Ok(ProcessOutcome::Duplicate);
        };
        info!(post_id, hash = %entry.hash, title = %entry.title, "Post saved");

        slot.send(ArchiveJob {
            hash: entry.hash.clone(),
            url: entry.url.clone(),
            author: entry.author.clone(),
            category: feed.category.title.clone(),
            title: entry.title.clone(),
            published_at,
        });

        if let Some(miniflux) = &self.miniflux {
            if let Err(e) = miniflux.mark_entry_read(entry.id).await {
                warn!(entry_id = entry.id, "Failed to mark entry as read: {e:#}");
            }
        }

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.notify(feed, entry).await {
                warn!(hash = %entry.hash, "Failed to send Discord notification: {e:#}");
            }
        }

        Ok(ProcessOutcome::Persisted)
    }
}

/// Parse an RFC3339 timestamp, substituting the current time when it is invalid.
fn parse_published_at(value: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(value).unwrap_or_else(|e| {
        warn!(value, "Invalid published_at, using current time: {e}");
        Utc::now().fixed_offset()
    })
}
