use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Web Server
    pub web_host: String,
    pub web_port: u16,

    // Database
    pub database_path: PathBuf,

    // Local archive
    pub archive_dir: PathBuf,
    pub gallery_dl_path: String,
    pub cleanup_after_upload: bool,

    // Archive Workers
    pub worker_concurrency: usize,
    pub archive_queue_capacity: usize,
    pub archive_timeout: Duration,

    // Miniflux
    pub miniflux_secret: Option<String>,
    pub miniflux_api_url: Option<String>,
    pub miniflux_api_token: Option<String>,

    // Chibisafe
    pub chibisafe_api_url: Option<String>,
    pub chibisafe_api_key: Option<String>,
    /// `None` keeps the fetched upload mode for the whole process lifetime.
    pub settings_ttl: Option<Duration>,

    // Discord
    pub discord_webhook_url: Option<String>,
    pub notify_delay: Duration,

    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Web Server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 8080)?,

            // Database
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/archive.sqlite")),

            // Local archive
            archive_dir: PathBuf::from(env_or_default("ARCHIVE_DIR", "./data/archive")),
            gallery_dl_path: env_or_default("GALLERY_DL_PATH", "gallery-dl"),
            cleanup_after_upload: parse_env_bool("CLEANUP_AFTER_UPLOAD", false)?,

            // Archive Workers
            worker_concurrency: parse_env_usize("WORKER_CONCURRENCY", 2)?,
            archive_queue_capacity: parse_env_usize("ARCHIVE_QUEUE_CAPACITY", 64)?,
            archive_timeout: Duration::from_secs(parse_env_u64("ARCHIVE_TIMEOUT_SECS", 1800)?),

            // Miniflux
            miniflux_secret: optional_env("MINIFLUX_SECRET"),
            miniflux_api_url: optional_env("MINIFLUX_API_URL"),
            miniflux_api_token: optional_env("MINIFLUX_API_TOKEN"),

            // Chibisafe
            chibisafe_api_url: optional_env("CHIBISAFE_API_URL"),
            chibisafe_api_key: optional_env("CHIBISAFE_API_KEY"),
            settings_ttl: parse_optional_env_u64("SETTINGS_TTL_SECS")?.map(Duration::from_secs),

            // Discord
            discord_webhook_url: optional_env("DISCORD_WEBHOOK_URL"),
            notify_delay: Duration::from_secs(parse_env_u64("NOTIFY_DELAY_SECS", 5)?),

            http_timeout: Duration::from_secs(parse_env_u64("HTTP_TIMEOUT_SECS", 60)?),
        })
    }

    /// Configuration with every remote integration disabled and no delays.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            web_host: "127.0.0.1".to_string(),
            web_port: 0,
            database_path: PathBuf::from(":memory:"),
            archive_dir: PathBuf::from("./data/archive"),
            gallery_dl_path: "gallery-dl".to_string(),
            cleanup_after_upload: false,
            worker_concurrency: 1,
            archive_queue_capacity: 8,
            archive_timeout: Duration::from_secs(30),
            miniflux_secret: None,
            miniflux_api_url: None,
            miniflux_api_token: None,
            chibisafe_api_url: None,
            chibisafe_api_key: None,
            settings_ttl: None,
            discord_webhook_url: None,
            notify_delay: Duration::ZERO,
            http_timeout: Duration::from_secs(10),
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "WORKER_CONCURRENCY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.archive_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                name: "ARCHIVE_QUEUE_CAPACITY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        for (name, value) in [
            ("MINIFLUX_API_URL", &self.miniflux_api_url),
            ("CHIBISAFE_API_URL", &self.chibisafe_api_url),
            ("DISCORD_WEBHOOK_URL", &self.discord_webhook_url),
        ] {
            if let Some(value) = value {
                url::Url::parse(value).map_err(|e| ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;
            }
        }
        Ok(())
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_optional_env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map(Some).map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(None),
    }
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    Ok(parse_optional_env_u64(name)?.unwrap_or(default))
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}
