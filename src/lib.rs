//! Download relay for Telegram: fetches a URL (plain HTTP or yt-dlp), uploads
//! the file to a backup channel with live progress and delivers a copy to the
//! requester.

/// HTTP surface
pub mod api;
/// Telegram messaging
pub mod bot;
/// Configuration and tunables
pub mod config;
/// Error taxonomy
pub mod error;
/// Job orchestration
pub mod job;
/// URL classification and download strategies
pub mod retrieval;
/// Text, size and retry helpers
pub mod utils;
