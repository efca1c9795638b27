//! # parley-telegram
//!
//! Telegram transport for human-in-the-loop conversations between an agent and
//! a human operator.
//!
//! Each agent task gets its own forum topic in a Telegram supergroup:
//!
//! - **Agent → Human**: status updates and questions are posted into the topic,
//!   rendered from a small Markdown dialect into Telegram HTML
//! - **Human → Agent**: the agent blocks on the topic until the human replies
//!   with free text or taps one of the offered buttons
//!
//! ## Key Components
//!
//! - [`markdown_to_telegram_html`]: Markdown subset to Telegram HTML
//! - [`Transport`] / [`HttpTransport`]: Bot API calls with bounded timeouts
//! - [`MessageSender`]: Rich delivery with a plain-text fallback
//! - [`EventPoller`]: Long-polls `getUpdates`
//! - [`ReplyWaiter`]: Resolves the next reply addressed to a session
//! - [`TelegramDesk`]: Session-oriented facade used by the MCP server and CLI
//! - [`error`]: Error types for config, transport, send, and cancellation

mod config;
mod desk;
pub mod error;
mod markup;
mod poller;
mod sender;
pub mod testing;
mod transport;
pub mod types;
mod waiter;

pub use config::{
    API_BASE_ENV, BOT_TOKEN_ENV, ConfigSources, DEFAULT_API_BASE, DEFAULT_CONFIG_FILE,
    GROUP_ID_ENV, TelegramConfig,
};
pub use desk::TelegramDesk;
pub use error::{ConfigError, TelegramError, TelegramResult, TransportError, TransportResult};
pub use markup::{escape_html, markdown_to_telegram_html};
pub use poller::{DEFAULT_LONG_POLL_SECS, EventPoller};
pub use sender::MessageSender;
pub use transport::{HttpTransport, POLL_REQUEST_TIMEOUT, REQUEST_TIMEOUT, Transport};
pub use types::{
    BotIdentity, ChannelId, DeliveredMessage, EventKind, InboundEvent, OutboundMessage,
    RenderMode, Reply, Session, ThreadId,
};
pub use waiter::{POLL_BACKOFF, PollCursor, ReplyWaiter, SELECTION_PREFIX};

/// Re-exported so callers can cancel a pending wait without depending on
/// `tokio-util` directly.
pub use tokio_util::sync::CancellationToken;
