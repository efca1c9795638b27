//! Domain types and Bot API wire models.
//!
//! The wire structs mirror the Telegram Bot API field names exactly; only the
//! fields this crate reads or writes are modelled.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::markup::markdown_to_telegram_html;

/// Forum topic identifier (`message_thread_id`).
pub type ThreadId = i64;

/// Maximum size of an inline button's `callback_data`, in bytes.
pub const CALLBACK_DATA_MAX_BYTES: usize = 64;

/// Update kinds requested from `getUpdates`.
pub const ALLOWED_UPDATES: [&str; 2] = ["message", "callback_query"];

// ─────────────────────────────────────────────────────────────────────────────
// DOMAIN TYPES
// ─────────────────────────────────────────────────────────────────────────────

/// Destination chat, by its numeric supergroup id (`-100…`).
///
/// Kept as text because that is how it travels in `chat_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether an inbound chat id refers to this destination.
    pub fn matches(&self, chat_id: i64) -> bool {
        self.0 == chat_id.to_string()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One task's conversation: a forum topic in a destination chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Session {
    pub channel: ChannelId,
    pub thread_id: ThreadId,
}

impl Session {
    pub fn new(channel: ChannelId, thread_id: ThreadId) -> Self {
        Self { channel, thread_id }
    }
}

/// How outbound text is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Markdown subset rendered to Telegram HTML.
    #[default]
    Rich,
    /// Raw text, no `parse_mode`.
    Plain,
}

/// A message about to be sent into a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub session: Session,
    pub text: String,
    pub mode: RenderMode,
    pub buttons: Vec<String>,
}

impl OutboundMessage {
    pub fn rich(session: Session, text: impl Into<String>) -> Self {
        Self {
            session,
            text: text.into(),
            mode: RenderMode::Rich,
            buttons: Vec::new(),
        }
    }

    pub fn plain(session: Session, text: impl Into<String>) -> Self {
        Self {
            mode: RenderMode::Plain,
            ..Self::rich(session, text)
        }
    }

    pub fn with_buttons(mut self, buttons: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.buttons = buttons.into_iter().map(Into::into).collect();
        self
    }

    /// The request for the first delivery attempt, honouring `mode`.
    pub fn to_request(&self) -> SendMessageRequest {
        match self.mode {
            RenderMode::Rich => SendMessageRequest {
                text: markdown_to_telegram_html(&self.text),
                parse_mode: Some(ParseMode::Html),
                ..self.plain_request()
            },
            RenderMode::Plain => self.plain_request(),
        }
    }

    /// The original text with no formatting; buttons are kept.
    pub fn plain_request(&self) -> SendMessageRequest {
        SendMessageRequest {
            chat_id: self.session.channel.clone(),
            message_thread_id: self.session.thread_id,
            text: self.text.clone(),
            parse_mode: None,
            reply_markup: InlineKeyboardMarkup::single_column(&self.buttons),
        }
    }
}

/// A message the platform accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub message_id: i64,
    pub thread_id: ThreadId,
    /// 1 when the first attempt succeeded, 2 when the plain fallback did.
    pub attempts: u32,
}

/// An inbound update, reduced to what reply matching needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// `update_id`; monotonic, used as the polling cursor.
    pub sequence: i64,
    pub channel_id: Option<i64>,
    pub thread_id: Option<ThreadId>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A text message.
    TextReply { text: String },
    /// A click on one of our inline buttons.
    ButtonReply { label: String, callback_id: String },
    /// Anything else; still advances the cursor, never resolves a wait.
    Unsupported,
}

impl InboundEvent {
    /// True when the event was posted in the session's topic.
    pub fn addressed_to(&self, session: &Session) -> bool {
        self.channel_id
            .is_some_and(|chat_id| session.channel.matches(chat_id))
            && self.thread_id == Some(session.thread_id)
    }
}

impl From<Update> for InboundEvent {
    fn from(update: Update) -> Self {
        let sequence = update.update_id;

        if let Some(message) = update.message {
            let kind = match message.text {
                Some(text) => EventKind::TextReply { text },
                None => EventKind::Unsupported,
            };
            return Self {
                sequence,
                channel_id: Some(message.chat.id),
                thread_id: message.message_thread_id,
                kind,
            };
        }

        // In forums the thread id lives on the message the button was attached to.
        if let Some(callback) = update.callback_query
            && let Some(message) = callback.message
        {
            let kind = match callback.data {
                Some(label) => EventKind::ButtonReply {
                    label,
                    callback_id: callback.id,
                },
                None => EventKind::Unsupported,
            };
            return Self {
                sequence,
                channel_id: Some(message.chat.id),
                thread_id: message.message_thread_id,
                kind,
            };
        }

        Self {
            sequence,
            channel_id: None,
            thread_id: None,
            kind: EventKind::Unsupported,
        }
    }
}

/// The human's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// The selected button's `callback_data`.
    Button(String),
}

impl Reply {
    pub fn as_str(&self) -> &str {
        match self {
            Reply::Text(text) | Reply::Button(text) => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Reply::Text(text) | Reply::Button(text) => text,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WIRE TYPES
// ─────────────────────────────────────────────────────────────────────────────

/// Envelope wrapping every Bot API response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    pub ok: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    #[serde(rename = "HTML")]
    Html,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendMessageRequest {
    pub chat_id: ChannelId,
    pub message_thread_id: ThreadId,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<ParseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

impl InlineKeyboardMarkup {
    /// One button per row, so long labels stay readable.
    ///
    /// Returns `None` for an empty label list.
    pub fn single_column(labels: &[String]) -> Option<Self> {
        if labels.is_empty() {
            return None;
        }
        let rows = labels
            .iter()
            .map(|label| vec![InlineKeyboardButton::new(label)])
            .collect();
        Some(Self {
            inline_keyboard: rows,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardButton {
    /// The visible label is kept whole; only `callback_data` is capped.
    pub fn new(label: &str) -> Self {
        Self {
            text: label.to_string(),
            callback_data: truncate_to_char_boundary(label, CALLBACK_DATA_MAX_BYTES).to_string(),
        }
    }
}

fn truncate_to_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateForumTopicRequest {
    pub chat_id: ChannelId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ForumTopic {
    pub message_thread_id: ThreadId,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GetUpdatesRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    pub timeout: u64,
    pub allowed_updates: Vec<&'static str>,
}

impl GetUpdatesRequest {
    pub fn new(offset: Option<i64>, timeout: u64) -> Self {
        Self {
            offset,
            timeout,
            allowed_updates: ALLOWED_UPDATES.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerCallbackQueryRequest {
    pub callback_query_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub message_thread_id: Option<ThreadId>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

/// The part of a `sendMessage` result that identifies the delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
    #[serde(default)]
    pub message_thread_id: Option<ThreadId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

/// The bot account, as returned by `getMe`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}
