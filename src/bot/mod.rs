/// Single-attempt send/edit helpers over teloxide
pub mod resilient;
/// Transfer client trait and its Telegram implementation
pub mod transfer;

pub use transfer::{
    ProgressSender, StatusHandle, TelegramTransfer, TransferClient, TransferTick, UploadRequest,
    UploadedHandle,
};
