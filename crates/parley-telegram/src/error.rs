//! Error types for configuration, Bot API calls, delivery and cancellation.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for telegram operations.
pub type TelegramResult<T> = std::result::Result<T, TelegramError>;

/// Result type alias for a single Bot API call.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Failure of a single Bot API call. Never retried at the transport layer.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failure, timeout, or a response body that could not be decoded.
    #[error("network error: {0}")]
    Network(String),

    /// The platform answered with a non-success status (or `"ok": false`).
    ///
    /// `body` is the raw response body, kept for diagnostics.
    #[error("telegram API returned {status}: {body}")]
    Protocol { status: u16, body: String },
}

/// Missing or unreadable destination configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Bot token is missing from every configuration source.
    #[error("telegram bot token not found: set TELEGRAM_BOT_TOKEN or configure telegram.bot_token")]
    MissingBotToken,

    /// Destination channel is missing from every configuration source.
    #[error("telegram group id not found: set TELEGRAM_GROUP_ID or configure telegram.group_id")]
    MissingChannel,

    /// Replies are matched on the numeric chat id, so the destination must be one.
    #[error(
        "telegram group id '{0}' is not a numeric chat id: use the supergroup id (e.g. -1001234567890)"
    )]
    InvalidChannel(String),

    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid YAML for the expected shape.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors that can occur during Telegram conversation operations.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// Configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A non-send Bot API call failed (topic creation, `getMe`).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Every delivery attempt for a message failed.
    #[error("failed to send telegram message after {attempts} attempts: {last}")]
    Send {
        attempts: u32,
        #[source]
        last: TransportError,
    },

    /// The caller cancelled a pending wait for a reply.
    #[error("wait for reply was cancelled")]
    Cancelled,
}
