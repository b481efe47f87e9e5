//! Cached upload-mode setting of the Chibisafe instance.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::Method;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use super::{ensure_created_or_ok, ChibisafeClient};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsResponse {
    #[serde(default)]
    use_network_storage: bool,
}

#[derive(Debug, Clone, Copy)]
struct CachedSetting {
    use_network_storage: bool,
    fetched_at: Instant,
}

/// Whether the server stores uploads on network storage (pre-signed URLs).
///
/// The value is fetched on first use and kept until it is older than the TTL.
/// Without a TTL it is kept for the lifetime of the process. A failed fetch
/// leaves the cache untouched so the next call tries again.
#[derive(Debug)]
pub struct SettingsCache {
    client: ChibisafeClient,
    ttl: Option<Duration>,
    state: RwLock<Option<CachedSetting>>,
}

impl SettingsCache {
    #[must_use]
    pub fn new(client: ChibisafeClient, ttl: Option<Duration>) -> Self {
        Self {
            client,
            ttl,
            state: RwLock::new(None),
        }
    }

    /// Current value, fetching it if nothing fresh is cached.
    ///
    /// # Errors
    ///
    /// Returns an error if a fetch was needed and failed.
    pub async fn use_network_storage(&self) -> Result<bool> {
        {
            let guard = self.state.read().await;
            if let Some(cached) = guard.as_ref().filter(|c| self.is_fresh(c)) {
                return Ok(cached.use_network_storage);
            }
        }

        let mut guard = self.state.write().await;
        // Populated by another caller while we waited for the write lock
        if let Some(cached) = guard.as_ref().filter(|c| self.is_fresh(c)) {
            return Ok(cached.use_network_storage);
        }

        let value = self.fetch().await?;
        *guard = Some(CachedSetting {
            use_network_storage: value,
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    /// Fetch the setting now, replacing any cached value.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails; the old value is kept in that case.
    pub async fn refresh(&self) -> Result<bool> {
        let value = self.fetch().await?;
        *self.state.write().await = Some(CachedSetting {
            use_network_storage: value,
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    /// The cached value, if any, without fetching.
    pub async fn cached(&self) -> Option<bool> {
        self.state.read().await.map(|c| c.use_network_storage)
    }

    fn is_fresh(&self, cached: &CachedSetting) -> bool {
        self.ttl.map_or(true, |ttl| cached.fetched_at.elapsed() < ttl)
    }

    async fn fetch(&self) -> Result<bool> {
        let response = self
            .client
            .request(Method::GET, "/api/settings")
            .send()
            .await
            .context("Failed to get Chibisafe settings")?;
        let response = ensure_created_or_ok(response, "Get settings").await?;

        let settings: SettingsResponse = response
            .json()
            .await
            .context("Failed to decode Chibisafe settings")?;

        info!(
            use_network_storage = settings.use_network_storage,
            "Chibisafe settings loaded"
        );
        Ok(settings.use_network_storage)
    }
}
