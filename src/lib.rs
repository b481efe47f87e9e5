//! Feed Media Archiver library.
//!
//! A service that receives Miniflux webhooks, records each new entry once,
//! archives its media with gallery-dl, uploads it to Chibisafe, and posts a
//! Discord notification.

// Allow raw string hashes for safety - they're harmless and prevent issues if content changes
#![allow(clippy::needless_raw_string_hashes)]

pub mod archiver;
pub mod chibisafe;
pub mod config;
pub mod constants;
pub mod db;
pub mod discord;
pub mod miniflux;
pub mod model;
pub mod processor;
pub mod web;
