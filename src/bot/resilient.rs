//! Status message helpers for Telegram.
//!
//! Every call is a single attempt. Edits degrade to a logged `false` instead
//! of an error: status narration must never abort or stall a job.
//!
//! # Usage
//!
//! ```ignore
//! use oxide_relay::bot::resilient::{send_status_message, edit_status_message_safe};
//!
//! let msg = send_status_message(&bot, chat_id, "⏬ Downloading...", Some(reply_to)).await?;
//! let updated = edit_status_message_safe(&bot, chat_id, msg.id, "✅ Done!").await;
//! ```

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{ChatId, Message, MessageId, ParseMode, ReplyParameters};
use tracing::{debug, warn};

/// Telegram accepts 4096 characters per message; keep a margin for the suffix
const MAX_STATUS_CHARS: usize = 4000;

/// Send an HTML message, optionally as a reply.
///
/// # Errors
///
/// Returns the Telegram request error.
pub async fn send_status_message(
    bot: &Bot,
    chat_id: ChatId,
    text: impl Into<String>,
    reply_to: Option<MessageId>,
) -> Result<Message> {
    let mut req = bot
        .send_message(chat_id, text.into())
        .parse_mode(ParseMode::Html);
    if let Some(reply_to) = reply_to {
        req = req.reply_parameters(ReplyParameters::new(reply_to));
    }
    req.await
        .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
}

/// Edit the text of a message.
///
/// # Errors
///
/// Returns the Telegram request error.
pub async fn edit_status_message(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: impl Into<String>,
    parse_mode: Option<ParseMode>,
) -> Result<Message> {
    let mut req = bot.edit_message_text(chat_id, msg_id, text.into());
    if let Some(pm) = parse_mode {
        req = req.parse_mode(pm);
    }
    req.await
        .map_err(|e| anyhow::anyhow!("Telegram edit error: {e}"))
}

/// Edit message with graceful degradation.
///
/// - Truncates text to 4000 characters if needed
/// - Treats "message is not modified" and "not found" as expected
///
/// Returns `true` when the message was edited.
pub async fn edit_status_message_safe(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: &str,
) -> bool {
    let truncated = clamp_status_text(text);

    match edit_status_message(bot, chat_id, msg_id, truncated, Some(ParseMode::Html)).await {
        Ok(_) => true,
        Err(e) => {
            let err_msg = e.to_string();
            if is_benign_edit_error(&err_msg) {
                debug!("Message update skipped: {err_msg}");
            } else {
                warn!("Failed to edit message: {e}");
            }
            false
        }
    }
}

fn clamp_status_text(text: &str) -> String {
    if text.chars().count() > MAX_STATUS_CHARS {
        let truncated_text = crate::utils::truncate_str(text, MAX_STATUS_CHARS);
        format!("{truncated_text}...\n\n<i>(message truncated)</i>")
    } else {
        text.to_string()
    }
}

fn is_benign_edit_error(message: &str) -> bool {
    const ERROR_NOT_MODIFIED: &str = "message is not modified";
    const ERROR_NOT_FOUND: &str = "message to edit not found";
    message.contains(ERROR_NOT_MODIFIED) || message.contains(ERROR_NOT_FOUND)
}
