//! Miniflux API client used to mark processed entries as read.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::USER_AGENT;

const MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
struct UpdateEntriesRequest<'a> {
    entry_ids: [i64; 1],
    status: &'a str,
}

#[derive(Clone)]
pub struct MinifluxClient {
    http: reqwest::Client,
    api_url: String,
    api_token: String,
    retry_backoff: Duration,
}

impl MinifluxClient {
    /// Create a client for `api_url` (trailing slash ignored).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(api_url: &str, api_token: &str, timeout: Duration) -> Result<Self> {
        let api_url = api_url.trim_end_matches('/');
        url::Url::parse(api_url).context("Invalid Miniflux API URL")?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_url: api_url.to_string(),
            api_token: api_token.to_string(),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        })
    }

    /// Build a client from configuration, or `None` when the API is not set up.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured URL is invalid.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        match (&config.miniflux_api_url, &config.miniflux_api_token) {
            (Some(url), Some(token)) => Self::new(url, token, config.http_timeout).map(Some),
            _ => {
                warn!("Miniflux API URL or token not configured, entries will not be marked read");
                Ok(None)
            }
        }
    }

    /// Base delay between attempts; attempt `n` waits `n * backoff`.
    #[must_use]
    pub const fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Mark one entry as read.
    ///
    /// Transport failures are retried; an unexpected status is not.
    ///
    /// # Errors
    ///
    /// Returns an error if every attempt fails or Miniflux answers with
    /// anything other than 204.
    pub async fn mark_entry_read(&self, entry_id: i64) -> Result<()> {
        let url = format!("{}/entries", self.api_url);
        let body = UpdateEntriesRequest {
            entry_ids: [entry_id],
            status: "read",
        };

        let mut attempt = 1;
        let response = loop {
            let result = self
                .http
                .put(&url)
                .header("X-Auth-Token", &self.api_token)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(response) => break response,
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(entry_id, attempt, "Mark-read request failed: {e}");
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to mark entry {entry_id} read after {MAX_ATTEMPTS} attempts")
                    });
                }
            }
        };

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            let body = response.text().await.unwrap_or_default();
            debug!(entry_id, %status, body = %body, "Unexpected Miniflux response");
            anyhow::bail!("Unexpected status code {status}: {body}");
        }

        info!(entry_id, "Entry marked as read in Miniflux");
        Ok(())
    }
}

impl std::fmt::Debug for MinifluxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinifluxClient")
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(uri: &str) -> MinifluxClient {
        MinifluxClient::new(&format!("{uri}/v1/"), "token", Duration::from_secs(5))
            .unwrap()
            .with_retry_backoff(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_mark_read_success() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/entries"))
            .and(header("X-Auth-Token", "token"))
            .and(body_json(serde_json::json!({"entry_ids": [42], "status": "read"})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client(&server.uri()).mark_entry_read(42).await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_status_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/entries"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server.uri()).mark_entry_read(1).await.unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("500"));
        assert!(msg.contains("boom"));
    }

    #[tokio::test]
    async fn test_transport_failure_gives_up() {
        // Nothing listens on this port once the server is dropped
        let uri = {
            let server = MockServer::start().await;
            server.uri()
        };

        let err = client(&uri).mark_entry_read(7).await.unwrap_err();
        assert!(format!("{err:#}").contains("after 5 attempts"));
    }

    #[test]
    fn test_from_config_unconfigured() {
        let config = Config::for_testing();
        assert!(MinifluxClient::from_config(&config).unwrap().is_none());
    }
}
