//! Shared constants used across the application.

/// User agent sent on every outbound API call.
pub const USER_AGENT: &str = concat!("feed-media-archiver/", env!("CARGO_PKG_VERSION"));

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "feed-media-archiver";
