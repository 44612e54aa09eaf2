//! Utility functions for text shaping and size formatting.
//!
//! Regex patterns use the `lazy-regex` crate so they are validated at compile time
//! and initialized on first use.

// lazy_regex! uses once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;
use rand::seq::SliceRandom;

/// Characters that are not allowed in file names on common filesystems
static RE_INVALID_FILENAME: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r#"[<>:"/\\|?*\x00-\x1f]"#);

/// Maximum length of a sanitized file name, in characters
const MAX_FILENAME_CHARS: usize = 200;

/// Safely truncates a string to a maximum character length (not bytes).
///
/// This is UTF-8 safe and will not panic on multi-byte characters.
///
/// # Examples
///
/// ```
/// use oxide_relay::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Truncates to `max_chars` and appends `...` when anything was cut.
///
/// ```
/// use oxide_relay::utils::excerpt;
/// assert_eq!(excerpt("abcdef", 3), "abc...");
/// assert_eq!(excerpt("abc", 3), "abc");
/// ```
#[must_use]
pub fn excerpt(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    format!("{}...", truncate_str(s, max_chars))
}

/// Formats a byte count using binary units.
///
/// ```
/// use oxide_relay::utils::format_bytes;
/// assert_eq!(format_bytes(512), "512.00 B");
/// assert_eq!(format_bytes(10 * 1024 * 1024), "10.00 MB");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    let mut value = size as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} PB")
}

/// Size in mebibytes, for status narration
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn size_mb(size: u64) -> f64 {
    size as f64 / 1024.0 / 1024.0
}

/// Replaces characters that are invalid in file names and caps the length.
///
/// ```
/// use oxide_relay::utils::sanitize_filename;
/// assert_eq!(sanitize_filename("a/b:c?.mp4"), "a_b_c_.mp4");
/// ```
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned = RE_INVALID_FILENAME.replace_all(name.trim(), "_");
    truncate_str(cleaned, MAX_FILENAME_CHARS)
}

/// Picks a random user agent from the configured pool
#[must_use]
pub fn random_user_agent() -> &'static str {
    crate::config::USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default()
}

/// Picks a random proxy from the pool, `None` when the pool is empty
#[must_use]
pub fn random_proxy(pool: &[String]) -> Option<String> {
    pool.choose(&mut rand::thread_rng()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_unicode() {
        let s = "Привет, мир!";
        assert_eq!(truncate_str(s, 6), "Привет");
        assert_eq!(truncate_str(s, 50), "Привет, мир!");
    }

    #[test]
    fn test_excerpt_appends_ellipsis_only_when_cut() {
        let long = "e".repeat(250);
        let cut = excerpt(&long, 100);
        assert_eq!(cut.chars().count(), 103);
        assert!(cut.ends_with("..."));

        assert_eq!(excerpt("short", 100), "short");
    }

    #[test]
    fn test_format_bytes_units() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(2 * 1024 * 1024 * 1024), "2.00 GB");
    }

    #[test]
    fn test_sanitize_filename_controls_and_length() {
        assert_eq!(sanitize_filename("tab\there"), "tab_here");
        // Hyphens survive
        assert_eq!(sanitize_filename("my-file.zip"), "my-file.zip");
        assert_eq!(sanitize_filename(&"x".repeat(300)).chars().count(), 200);
    }

    #[test]
    fn test_random_proxy_from_pool() {
        assert_eq!(random_proxy(&[]), None);
        let pool = vec!["http://p:1".to_string()];
        assert_eq!(random_proxy(&pool).as_deref(), Some("http://p:1"));
        assert!(crate::config::USER_AGENTS.contains(&random_user_agent()));
    }
}
