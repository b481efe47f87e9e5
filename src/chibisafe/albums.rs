//! Get-or-create resolution of albums (feed categories) and tags (authors).

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{ensure_created_or_ok, ChibisafeClient, KeyedLock};

#[derive(Debug, Clone, Deserialize)]
struct NamedEntity {
    uuid: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumsResponse {
    #[serde(default)]
    albums: Vec<NamedEntity>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    tags: Vec<NamedEntity>,
}

#[derive(Debug, Deserialize)]
struct CreateAlbumResponse {
    album: NamedEntity,
}

#[derive(Debug, Deserialize)]
struct CreateTagResponse {
    tag: NamedEntity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityKind {
    Album,
    Tag,
}

impl EntityKind {
    const fn label(self) -> &'static str {
        match self {
            Self::Album => "album",
            Self::Tag => "tag",
        }
    }

    const fn search_path(self) -> &'static str {
        match self {
            Self::Album => "/api/albums",
            Self::Tag => "/api/tags",
        }
    }

    const fn create_path(self) -> &'static str {
        match self {
            Self::Album => "/api/album/create",
            Self::Tag => "/api/tag/create",
        }
    }
}

/// Resolves names to album and tag UUIDs, creating missing ones.
///
/// Nothing is memoized: every call searches the server again. Calls for the
/// same kind and name (case-insensitive) are serialized within the process.
#[derive(Debug, Clone)]
pub struct AlbumTagResolver {
    client: ChibisafeClient,
    locks: Arc<KeyedLock>,
}

impl AlbumTagResolver {
    #[must_use]
    pub fn new(client: ChibisafeClient) -> Self {
        Self {
            client,
            locks: Arc::new(KeyedLock::new()),
        }
    }

    /// UUID of the album called `name`, created if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the search or the creation fails.
    pub async fn resolve_album(&self, name: &str) -> Result<String> {
        self.resolve(EntityKind::Album, name).await
    }

    /// UUID of the tag called `name`, created if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the search or the creation fails.
    pub async fn resolve_tag(&self, name: &str) -> Result<String> {
        self.resolve(EntityKind::Tag, name).await
    }

    async fn resolve(&self, kind: EntityKind, name: &str) -> Result<String> {
        let key = format!("{}:{}", kind.label(), name.to_lowercase());
        let _guard = self.locks.lock(&key).await;

        let wanted = name.to_lowercase();
        let existing = self.search(kind, name).await?;
        if let Some(found) = existing
            .into_iter()
            .find(|e| e.name.to_lowercase() == wanted)
        {
            debug!(kind = kind.label(), name = %found.name, uuid = %found.uuid, "Found existing entity");
            return Ok(found.uuid);
        }

        info!(kind = kind.label(), name = %name, "Creating entity");
        self.create(kind, name).await
    }

    async fn search(&self, kind: EntityKind, name: &str) -> Result<Vec<NamedEntity>> {
        let response = self
            .client
            .request(Method::GET, kind.search_path())
            .query(&[("search", name)])
            .send()
            .await
            .with_context(|| format!("Failed to search {}s", kind.label()))?;
        let response = ensure_created_or_ok(response, &format!("Search {}s", kind.label())).await?;

        let entities = match kind {
            EntityKind::Album => response.json::<AlbumsResponse>().await.map(|r| r.albums),
            EntityKind::Tag => response.json::<TagsResponse>().await.map(|r| r.tags),
        }
        .with_context(|| format!("Failed to decode {} search response", kind.label()))?;

        Ok(entities)
    }

    async fn create(&self, kind: EntityKind, name: &str) -> Result<String> {
        let response = self
            .client
            .request(Method::POST, kind.create_path())
            .json(&json!({ "name": name }))
            .send()
            .await
            .with_context(|| format!("Failed to create {}", kind.label()))?;
        let response = ensure_created_or_ok(response, &format!("Create {}", kind.label())).await?;

        let created = match kind {
            EntityKind::Album => response.json::<CreateAlbumResponse>().await.map(|r| r.album),
            EntityKind::Tag => response.json::<CreateTagResponse>().await.map(|r| r.tag),
        }
        .with_context(|| format!("Failed to decode create {} response", kind.label()))?;

        info!(kind = kind.label(), name = %created.name, uuid = %created.uuid, "Created entity");
        Ok(created.uuid)
    }
}
