//! Centralized error taxonomy for the bot.
//!
//! Every variant that can reach a user maps to exactly one user-visible
//! message via [`BotError::user_message`]; nothing propagates past a single
//! interaction.

use thiserror::Error;

use crate::utils::format_size;

#[derive(Debug, Error)]
pub enum BotError {
    /// Malformed or unsupported URL
    #[error("invalid or unsupported URL")]
    InvalidUrl,
    /// Callback refers to a session that no longer exists or has already advanced
    #[error("session expired or already consumed")]
    StaleSession,
    /// Collection exceeds the configured item limit
    #[error("collection has {count} items, limit is {max}")]
    OversizeCollection { count: usize, max: usize },
    /// yt-dlp metadata extraction failed
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),
    /// yt-dlp download failed
    #[error("download failed: {0}")]
    DownloadFailed(String),
    /// Downloaded file exceeds the delivery size limit
    #[error("file too large for delivery: {size} bytes")]
    FileTooLarge { size: u64 },
    /// Telegram API error, delivery included
    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
    /// Filesystem errors
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
    /// Database errors
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Database migration errors
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    /// Data parsing errors
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Parse(format!("JSON parsing error: {}", err))
    }
}

impl From<strum::ParseError> for BotError {
    fn from(err: strum::ParseError) -> Self {
        BotError::Parse(format!("enum parsing error: {}", err))
    }
}

impl BotError {
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::ExtractionFailed(msg.into())
    }

    pub fn download(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    /// The single message shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            BotError::InvalidUrl => {
                "❌ That doesn't look like a valid YouTube link.".to_string()
            }
            BotError::StaleSession => {
                "❌ This session has expired. Send the link again.".to_string()
            }
            BotError::OversizeCollection { count, max } => {
                format!("❌ This playlist has {} items, the limit is {}.", count, max)
            }
            BotError::ExtractionFailed(_) => {
                "❌ Couldn't fetch information for this link. Try another one.".to_string()
            }
            BotError::DownloadFailed(_) => {
                "❌ Download failed. Try again or pick another link.".to_string()
            }
            BotError::FileTooLarge { size } => {
                format!("❌ The file is too large to send ({}).", format_size(*size))
            }
            BotError::Telegram(_) => "❌ Failed to deliver the file.".to_string(),
            _ => "❌ Something went wrong. Try again.".to_string(),
        }
    }
}

pub type BotResult<T> = Result<T, BotError>;

pub type HandlerResult = BotResult<()>;
