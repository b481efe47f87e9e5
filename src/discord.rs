//! Discord webhook notifications for newly recorded entries.

use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::constants::USER_AGENT;
use crate::model::{Entry, Feed};

const UNCATEGORIZED: &str = "Uncategorized";
const DEFAULT_COLOR: u32 = 0xFF69B4;
const DEFAULT_ICON: &str = "https://i.imgur.com/Nyh7tRG.png";
const PLACEHOLDER_IMAGE: &str = "https://i.imgur.com/5zcBLRc.png";

const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp", ".svg", ".tiff",
];

static IMG_SRC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img[^>]+src="([^"]+)""#).expect("valid regex"));
static LINK_HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<a[^>]+href="([^"]+\.(?:jpg|jpeg|png|gif|webp|bmp|svg))""#).expect("valid regex")
});
static BARE_IMAGE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s"<>]+\.(?:jpg|jpeg|png|gif|webp|bmp|svg|tiff)"#).expect("valid regex")
});

/// Embed colour and footer icon for a category title. Matching is case-sensitive.
#[must_use]
pub fn category_style(category: &str) -> (u32, &'static str) {
    match category {
        "Patreon" => (0xFF5900, "https://i.imgur.com/07HA8CQ.png"),
        "Fanbox" => (0xFAF18A, "https://i.imgur.com/uXT06Tq.png"),
        "SubscribeStar" => (0x009587, "https://i.imgur.com/San8fH3.png"),
        "Mastodon" => (0x563ACC, "https://i.imgur.com/tUeKKz2.png"),
        "Bluesky" => (0x1185FE, "https://i.imgur.com/1mcXqLF.png"),
        "X" => (0x000000, "https://i.imgur.com/wXxVrmo.png"),
        _ => (DEFAULT_COLOR, DEFAULT_ICON),
    }
}

fn looks_like_image(url: &str) -> bool {
    let lower = url.to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.contains(ext))
}

/// First image URL found in entry HTML.
///
/// Tries `<img src>` values that look like images, then links ending in an
/// image extension, then any bare image URL.
#[must_use]
pub fn extract_image_from_content(content: &str) -> Option<String> {
    if let Some(url) = IMG_SRC_RE
        .captures_iter(content)
        .map(|c| c[1].to_string())
        .find(|url| looks_like_image(url))
    {
        return Some(url);
    }

    if let Some(caps) = LINK_HREF_RE.captures(content) {
        return Some(caps[1].to_string());
    }

    BARE_IMAGE_URL_RE
        .find(content)
        .map(|m| m.as_str().to_string())
}

/// Preview image: first image enclosure, else one from the content, else a placeholder.
#[must_use]
pub fn preview_image(entry: &Entry) -> String {
    entry
        .enclosures
        .iter()
        .find(|e| e.mime_type.starts_with("image/"))
        .map(|e| e.url.clone())
        .or_else(|| extract_image_from_content(&entry.content))
        .unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string())
}

#[derive(Debug, Serialize)]
struct WebhookMessage {
    embeds: Vec<Embed>,
    attachments: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    url: String,
    color: u32,
    author: EmbedAuthor,
    footer: EmbedFooter,
    timestamp: String,
    image: EmbedImage,
}

#[derive(Debug, Serialize)]
struct EmbedAuthor {
    name: String,
    url: String,
    icon_url: String,
}

#[derive(Debug, Serialize)]
struct EmbedFooter {
    text: String,
    icon_url: String,
}

#[derive(Debug, Serialize)]
struct EmbedImage {
    url: String,
}

/// Posts one embed per new entry to a Discord webhook.
#[derive(Clone)]
pub struct DiscordNotifier {
    http: reqwest::Client,
    webhook_url: String,
    delay: Duration,
}

impl DiscordNotifier {
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(webhook_url: &str, delay: Duration, timeout: Duration) -> Result<Self> {
        url::Url::parse(webhook_url).context("Invalid Discord webhook URL")?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            webhook_url: webhook_url.to_string(),
            delay,
        })
    }

    /// Build a notifier from configuration, or `None` when no webhook is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured URL is invalid.
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        config
            .discord_webhook_url
            .as_deref()
            .map(|url| Self::new(url, config.notify_delay, config.http_timeout))
            .transpose()
    }

    /// Send the embed for `entry`, then wait the configured delay.
    ///
    /// # Errors
    ///
    /// Returns an error if the webhook call fails or returns a status other
    /// than 200 or 204.
    pub async fn notify(&self, feed: &Feed, entry: &Entry) -> Result<()> {
        let category = if feed.category.title.is_empty() {
            UNCATEGORIZED
        } else {
            feed.category.title.as_str()
        };
        let (color, category_icon) = category_style(category);

        let icon_url = match self.feed_icon(&feed.feed_url).await {
            Some(icon) => icon,
            None => category_icon.to_string(),
        };

        let message = WebhookMessage {
            embeds: vec![Embed {
                title: entry.title.clone(),
                url: entry.url.clone(),
                color,
                author: EmbedAuthor {
                    name: entry.author.clone(),
                    url: feed.site_url.clone(),
                    icon_url,
                },
                footer: EmbedFooter {
                    text: category.to_string(),
                    icon_url: category_icon.to_string(),
                },
                timestamp: entry.published_at.clone(),
                image: EmbedImage {
                    url: preview_image(entry),
                },
            }],
            attachments: Vec::new(),
        };

        let response = self
            .http
            .post(&self.webhook_url)
            .json(&message)
            .send()
            .await
            .context("Failed to send Discord webhook")?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
            anyhow::bail!("Unexpected Discord status code: {status}");
        }

        info!(hash = %entry.hash, title = %entry.title, "Discord notification sent");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }

    /// Icon advertised by the feed document itself, if any.
    async fn feed_icon(&self, feed_url: &str) -> Option<String> {
        if feed_url.is_empty() {
            return None;
        }

        let body = match self.fetch_feed(feed_url).await {
            Ok(body) => body,
            Err(e) => {
                debug!(feed_url, "Could not fetch feed for icon: {e:#}");
                return None;
            }
        };

        let feed = match feed_rs::parser::parse(&body[..]) {
            Ok(feed) => feed,
            Err(e) => {
                debug!(feed_url, "Could not parse feed for icon: {e}");
                return None;
            }
        };

        let icon = feed
            .logo
            .map(|image| image.uri)
            .or_else(|| feed.icon.map(|image| image.uri))
            .filter(|uri| !uri.is_empty());
        if icon.is_none() {
            debug!(feed_url, "No icon found in feed");
        }
        icon
    }

    async fn fetch_feed(&self, feed_url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(feed_url)
            .send()
            .await
            .context("Failed to fetch feed")?;
        if !response.status().is_success() {
            anyhow::bail!("Feed fetch failed with status {}", response.status());
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .context("Failed to read feed body")
    }
}

impl std::fmt::Debug for DiscordNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordNotifier")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Enclosure};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(content: &str) -> Entry {
        Entry {
            id: 42,
            hash: "abc123".to_string(),
            title: "My Post".to_string(),
            url: "https://www.patreon.com/posts/1".to_string(),
            published_at: "2024-03-15T10:00:00Z".to_string(),
            content: content.to_string(),
            author: "Jane".to_string(),
            enclosures: Vec::new(),
        }
    }

    #[test]
    fn test_category_style() {
        assert_eq!(category_style("Patreon").0, 0xFF5900);
        assert_eq!(category_style("X"), (0x000000, "https://i.imgur.com/wXxVrmo.png"));
        // Case-sensitive lookup falls back to the default pair
        assert_eq!(category_style("patreon"), (DEFAULT_COLOR, DEFAULT_ICON));
        assert_eq!(category_style(UNCATEGORIZED), (DEFAULT_COLOR, DEFAULT_ICON));
    }

    #[test]
    fn test_extract_image_order() {
        let html = r#"<img src="https://a.com/track"><img src="https://a.com/pic.PNG?x=1"><a href="https://a.com/b.jpg">x</a>"#;
        assert_eq!(
            extract_image_from_content(html).as_deref(),
            Some("https://a.com/pic.PNG?x=1")
        );

        let html = r#"<p><a href="https://a.com/full.webp">full</a></p>"#;
        assert_eq!(
            extract_image_from_content(html).as_deref(),
            Some("https://a.com/full.webp")
        );

        let html = "see https://cdn.example.com/art.tiff for details";
        assert_eq!(
            extract_image_from_content(html).as_deref(),
            Some("https://cdn.example.com/art.tiff")
        );

        assert_eq!(extract_image_from_content("<p>no images</p>"), None);
    }

    #[test]
    fn test_preview_prefers_image_enclosure() {
        let mut e = entry(r#"<img src="https://a.com/content.png">"#);
        e.enclosures = vec![
            Enclosure {
                id: 1,
                url: "https://a.com/audio.mp3".to_string(),
                mime_type: "audio/mpeg".to_string(),
            },
            Enclosure {
                id: 2,
                url: "https://a.com/enc.jpg".to_string(),
                mime_type: "image/jpeg".to_string(),
            },
        ];
        assert_eq!(preview_image(&e), "https://a.com/enc.jpg");
        assert_eq!(preview_image(&entry("")), PLACEHOLDER_IMAGE);
    }

    #[tokio::test]
    async fn test_notify_uses_feed_icon() {
        let server = MockServer::start().await;
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Jane</title>
  <id>urn:jane</id>
  <updated>2024-03-15T10:00:00Z</updated>
  <logo>https://cdn.example.com/jane-logo.png</logo>
</feed>"#;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(atom))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "embeds": [{
                    "title": "My Post",
                    "color": 0xFF5900,
                    "author": {"name": "Jane", "icon_url": "https://cdn.example.com/jane-logo.png"},
                    "footer": {"text": "Patreon", "icon_url": "https://i.imgur.com/07HA8CQ.png"},
                    "timestamp": "2024-03-15T10:00:00Z",
                    "image": {"url": PLACEHOLDER_IMAGE}
                }],
                "attachments": []
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = DiscordNotifier::new(
            &format!("{}/hook", server.uri()),
            Duration::ZERO,
            Duration::from_secs(5),
        )
        .unwrap();
        let feed = Feed {
            feed_url: format!("{}/feed.xml", server.uri()),
            site_url: "https://www.patreon.com/jane".to_string(),
            category: Category {
                id: 2,
                title: "Patreon".to_string(),
            },
            ..Feed::default()
        };

        notifier.notify(&feed, &entry("")).await.unwrap();
    }

    #[tokio::test]
    async fn test_notify_uncategorized_and_status_check() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "embeds": [{
                    "color": DEFAULT_COLOR,
                    "author": {"icon_url": DEFAULT_ICON},
                    "footer": {"text": "Uncategorized"}
                }]
            })))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = DiscordNotifier::new(
            &format!("{}/hook", server.uri()),
            Duration::ZERO,
            Duration::from_secs(5),
        )
        .unwrap();

        let err = notifier
            .notify(&Feed::default(), &entry(""))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400"));
    }
}
