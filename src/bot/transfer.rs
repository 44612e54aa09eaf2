//! Transfer client: the messaging-platform operations a relay job needs.

use crate::bot::resilient::{edit_status_message_safe, send_status_message};
use crate::config::{Settings, SILENT_UPLOAD_THRESHOLD};
use crate::error::RelayError;
use crate::utils::format_bytes;
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, Message, MessageId, ParseMode, ReplyParameters};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// The single mutable narration message of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusHandle {
    /// Chat holding the message
    pub chat_id: i64,
    /// Message id
    pub message_id: i32,
}

/// Byte counter reported while a file is being uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferTick {
    /// Bytes handed to the platform so far
    pub current: u64,
    /// Total bytes of the file
    pub total: u64,
}

/// Channel the upload reports its progress on
pub type ProgressSender = mpsc::UnboundedSender<TransferTick>;

/// A file to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Destination chat
    pub chat_id: i64,
    /// Local file
    pub path: PathBuf,
    /// File name shown to recipients
    pub file_name: String,
    /// HTML caption
    pub caption: Option<String>,
    /// File size in bytes
    pub size: u64,
}

/// The uploaded artifact on the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedHandle {
    /// Chat the file was uploaded to
    pub chat_id: i64,
    /// Message carrying the file
    pub message_id: i32,
    /// Platform file identifier
    pub file_id: String,
}

/// Messaging operations consumed by the job orchestrator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Send a new status message, optionally replying to `reply_to`
    async fn send_status(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<StatusHandle, RelayError>;

    /// Replace the text of a status message. Never fails; returns whether the
    /// edit went through.
    async fn edit_status(&self, status: &StatusHandle, text: &str) -> bool;

    /// Upload a local file, reporting byte progress on `progress`
    async fn upload_file(
        &self,
        request: UploadRequest,
        progress: Option<ProgressSender>,
    ) -> Result<UploadedHandle, RelayError>;

    /// Copy a message into another chat without attribution
    async fn forward(
        &self,
        to_chat: i64,
        from_chat: i64,
        message_id: i32,
        reply_to: Option<i32>,
    ) -> Result<(), RelayError>;
}

/// Reject uploads above the configured maximum before any byte is sent
///
/// # Errors
///
/// Returns `RelayError::TooLarge` when `size > limit`.
pub fn check_upload_size(size: u64, limit: u64) -> Result<(), RelayError> {
    if size > limit {
        return Err(RelayError::TooLarge { size, limit });
    }
    Ok(())
}

/// Large uploads are delivered without a notification
#[must_use]
pub const fn is_silent(size: u64) -> bool {
    size > SILENT_UPLOAD_THRESHOLD
}

/// `AsyncRead` adapter that reports the running byte count
pub struct ProgressReader<R> {
    inner: R,
    sent: u64,
    total: u64,
    progress: Option<ProgressSender>,
}

impl<R> ProgressReader<R> {
    /// Wrap `inner`, a reader of `total` bytes
    pub const fn new(inner: R, total: u64, progress: Option<ProgressSender>) -> Self {
        Self {
            inner,
            sent: 0,
            total,
            progress,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            let read = (buf.filled().len() - before) as u64;
            if read > 0 {
                self.sent += read;
                let tick = TransferTick {
                    current: self.sent,
                    total: self.total,
                };
                if let Some(ref progress) = self.progress {
                    // Receiver gone means nobody narrates; the upload continues
                    let _ = progress.send(tick);
                }
            }
        }
        poll
    }
}

/// [`TransferClient`] backed by the Telegram Bot API
pub struct TelegramTransfer {
    bot: Bot,
    max_file_size: u64,
}

impl TelegramTransfer {
    /// Wrap an existing bot
    #[must_use]
    pub const fn new(bot: Bot, max_file_size: u64) -> Self {
        Self { bot, max_file_size }
    }

    /// Build the bot from settings: long client timeout for uploads and an
    /// optional self-hosted Bot API server.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Transfer` if the HTTP client or API URL is invalid.
    pub fn from_settings(settings: &Settings) -> Result<Self, RelayError> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(settings.transfer_timeout())
            .build()
            .map_err(|e| RelayError::Transfer(format!("HTTP client error: {e}")))?;
        let mut bot = Bot::with_client(settings.telegram_token.clone(), client);

        if let Some(ref api_url) = settings.telegram_api_url {
            let url = url::Url::parse(api_url)
                .map_err(|e| RelayError::Transfer(format!("Invalid Bot API URL: {e}")))?;
            info!(api_url = %url, "Using custom Bot API server");
            bot = bot.set_api_url(url);
        }

        Ok(Self::new(bot, settings.max_file_size))
    }

    /// The underlying bot
    #[must_use]
    pub const fn bot(&self) -> &Bot {
        &self.bot
    }
}

/// Identifier of whatever file the platform attached to the message
fn file_id_of(msg: &Message) -> Option<String> {
    msg.document()
        .map(|d| d.file.id.to_string())
        .or_else(|| msg.video().map(|v| v.file.id.to_string()))
        .or_else(|| msg.audio().map(|a| a.file.id.to_string()))
        .or_else(|| msg.animation().map(|a| a.file.id.to_string()))
}

#[async_trait]
impl TransferClient for TelegramTransfer {
    async fn send_status(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<StatusHandle, RelayError> {
        let msg = send_status_message(&self.bot, ChatId(chat_id), text, reply_to.map(MessageId))
            .await
            .map_err(|e| RelayError::Transfer(e.to_string()))?;
        Ok(StatusHandle {
            chat_id,
            message_id: msg.id.0,
        })
    }

    async fn edit_status(&self, status: &StatusHandle, text: &str) -> bool {
        edit_status_message_safe(
            &self.bot,
            ChatId(status.chat_id),
            MessageId(status.message_id),
            text,
        )
        .await
    }

    async fn upload_file(
        &self,
        request: UploadRequest,
        progress: Option<ProgressSender>,
    ) -> Result<UploadedHandle, RelayError> {
        check_upload_size(request.size, self.max_file_size)?;

        let silent = is_silent(request.size);
        info!(
            chat_id = request.chat_id,
            file_name = %request.file_name,
            size = %format_bytes(request.size),
            silent,
            "Uploading file"
        );

        let file = tokio::fs::File::open(&request.path).await?;
        let reader = ProgressReader::new(file, request.size, progress);
        let input = InputFile::read(reader).file_name(request.file_name.clone());

        let mut req = self
            .bot
            .send_document(ChatId(request.chat_id), input)
            .disable_notification(silent);
        if let Some(caption) = request.caption {
            req = req.caption(caption).parse_mode(ParseMode::Html);
        }
        let msg = req.await?;

        let file_id = file_id_of(&msg).ok_or_else(|| {
            RelayError::Transfer("Uploaded message carries no file".to_string())
        })?;
        debug!(message_id = msg.id.0, file_id = %file_id, "Upload finished");

        Ok(UploadedHandle {
            chat_id: request.chat_id,
            message_id: msg.id.0,
            file_id,
        })
    }

    async fn forward(
        &self,
        to_chat: i64,
        from_chat: i64,
        message_id: i32,
        reply_to: Option<i32>,
    ) -> Result<(), RelayError> {
        let mut req = self
            .bot
            .copy_message(ChatId(to_chat), ChatId(from_chat), MessageId(message_id));
        if let Some(reply_to) = reply_to {
            req = req.reply_parameters(ReplyParameters::new(MessageId(reply_to)));
        }
        req.await?;
        info!(to_chat, from_chat, message_id, "File forwarded");
        Ok(())
    }
}
