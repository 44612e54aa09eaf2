//! Status message texts (Telegram HTML).

use crate::config::USER_ERROR_EXCERPT_CHARS;
use crate::retrieval::classify::UrlClass;
use crate::retrieval::MediaInfo;
use crate::utils::{excerpt, format_bytes, size_mb};
use html_escape::encode_text;

/// First message of every job
pub const RECEIVED: &str = "🚀 Server started working...\n⏬ Downloading...";

/// Narration after classification
#[must_use]
pub fn download_started(class: UrlClass) -> String {
    match class {
        UrlClass::ExtractorEligible(platform) => format!(
            "⏬ Downloading from <b>{}</b>...",
            encode_text(platform.display_name())
        ),
        UrlClass::DirectLink => "⏬ Downloading file...".to_string(),
        UrlClass::Unknown => "⏬ Trying to download...".to_string(),
    }
}

/// Narration after a successful metadata probe
#[must_use]
pub fn probed(class: UrlClass, info: &MediaInfo) -> String {
    let mut text = String::new();
    if let Some(ref title) = info.title {
        text.push_str(&format!("🎬 <b>{}</b>\n", encode_text(title)));
    }
    if let Some(ref uploader) = info.uploader {
        text.push_str(&format!("👤 {}\n", encode_text(uploader)));
    }
    if let Some(duration) = info.duration_secs {
        text.push_str(&format!("⏱ {}\n", format_duration(duration)));
    }
    text.push_str(&download_started(class));
    text
}

/// Narration once the file is on local disk
#[must_use]
pub fn download_complete(size: u64) -> String {
    format!(
        "✅ Download finished!\n📦 Size: {:.2} MB\n⏫ Starting upload to Telegram...",
        size_mb(size)
    )
}

/// Narration of one throttled upload tick
#[must_use]
pub fn upload_progress(percent: f64, current: u64, total: u64) -> String {
    format!(
        "⏫ Uploading...\n📊 {percent:.1}%\n📦 {} / {}",
        format_bytes(current),
        format_bytes(total)
    )
}

/// Narration after the backup upload
pub const UPLOAD_COMPLETE: &str = "✅ Upload finished!\n📤 Sending to you...";

/// Final success narration
#[must_use]
pub fn done(size: u64) -> String {
    format!("✅ Done!\n📦 {:.2} MB", size_mb(size))
}

/// Caption of the uploaded file
#[must_use]
pub fn caption(url: &str, user_id: i64, size: u64) -> String {
    format!(
        "🔗 {}\n👤 User: {user_id}\n📦 {}",
        encode_text(url),
        format_bytes(size)
    )
}

/// Shortened, escaped error text for the user
#[must_use]
pub fn error_excerpt(error: &str) -> String {
    encode_text(&excerpt(error, USER_ERROR_EXCERPT_CHARS)).into_owned()
}

/// Final failure narration with remediation hints
#[must_use]
pub fn failed(error: &str) -> String {
    format!(
        "❌ Download error:\n{}\n\n💡 Tips:\n\
         • If the link requires login, add cookies.txt\n\
         • Some sites may require a VPN",
        error_excerpt(error)
    )
}

/// `h:mm:ss` or `m:ss`
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}
