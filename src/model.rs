//! Miniflux webhook payload types.

use serde::{Deserialize, Serialize};

/// Event type that carries new entries; every other event is ignored.
pub const NEW_ENTRIES_EVENT: &str = "new_entries";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event_type: String,
    #[serde(default)]
    pub feed: Feed,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Feed {
    pub id: i64,
    pub site_url: String,
    pub title: String,
    pub feed_url: String,
    pub category: Category,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    pub id: i64,
    pub title: String,
}

/// One unit of content from a feed, identified by its `hash`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Entry {
    pub id: i64,
    pub hash: String,
    pub title: String,
    pub url: String,
    /// RFC3339 timestamp as sent by Miniflux.
    pub published_at: String,
    pub content: String,
    pub author: String,
    pub enclosures: Vec<Enclosure>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Enclosure {
    pub id: i64,
    pub url: String,
    pub mime_type: String,
}
