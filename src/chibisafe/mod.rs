//! Chibisafe asset host integration.
//!
//! Uploads archived files, files them into an album per feed category, and
//! tags them with the entry author.

pub mod albums;
pub mod keyed_lock;
pub mod settings;
pub mod upload;

pub use albums::AlbumTagResolver;
pub use keyed_lock::KeyedLock;
pub use settings::SettingsCache;
pub use upload::{UploadReport, UploadStrategy, UploadedFile, Uploader};

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};

use crate::config::Config;
use crate::constants::USER_AGENT;

/// Header carrying the static API key on every call.
const API_KEY_HEADER: &str = "x-api-key";
/// Header that files an upload into an album.
pub const ALBUM_HEADER: &str = "albumuuid";

/// Authenticated HTTP client for one Chibisafe instance.
#[derive(Clone)]
pub struct ChibisafeClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl ChibisafeClient {
    /// Create a client for `api_url` (trailing slash ignored).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(api_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let api_url = api_url.trim_end_matches('/');
        url::Url::parse(api_url).context("Invalid Chibisafe API URL")?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Build a client from configuration, or `None` when Chibisafe is not set up.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured URL is invalid.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        match (&config.chibisafe_api_url, &config.chibisafe_api_key) {
            (Some(url), Some(key)) => Self::new(url, key, config.http_timeout).map(Some),
            _ => Ok(None),
        }
    }

    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// A request to an API path, carrying the API key.
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.api_url))
            .header(API_KEY_HEADER, &self.api_key)
    }

    /// The bare HTTP client, for pre-signed storage URLs that must not see the key.
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

impl std::fmt::Debug for ChibisafeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChibisafeClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

/// Fail unless the response is 200 or 201, including the body in the error.
pub(crate) async fn ensure_created_or_ok(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status == StatusCode::OK || status == StatusCode::CREATED {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    anyhow::bail!("{action} failed: {status} - {body}");
}
