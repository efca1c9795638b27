//! The session facade: topics, updates and questions in one destination chat.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::TelegramConfig;
use crate::error::{TelegramResult, TransportError};
use crate::sender::MessageSender;
use crate::transport::{HttpTransport, REQUEST_TIMEOUT, Transport, post_json};
use crate::types::{
    BotIdentity, ChannelId, CreateForumTopicRequest, DeliveredMessage, ForumTopic,
    OutboundMessage, Reply, Session, ThreadId,
};
use crate::waiter::ReplyWaiter;

/// Session-oriented entry point: one forum topic per agent task.
///
/// Cheap to share behind an `Arc`; concurrent calls on different sessions do
/// not coordinate with each other.
#[derive(Clone)]
pub struct TelegramDesk {
    transport: Arc<dyn Transport>,
    channel: ChannelId,
    sender: MessageSender,
    waiter: ReplyWaiter,
}

impl TelegramDesk {
    pub fn new(transport: Arc<dyn Transport>, channel: ChannelId) -> Self {
        Self {
            sender: MessageSender::new(Arc::clone(&transport)),
            waiter: ReplyWaiter::new(Arc::clone(&transport)),
            transport,
            channel,
        }
    }

    /// Build a desk that talks to the Bot API over HTTP.
    pub fn from_config(config: &TelegramConfig) -> TelegramResult<Self> {
        let transport = HttpTransport::new(config)?;
        info!(
            channel = %config.channel_id,
            token = %config.bot_token_masked(),
            "telegram desk configured"
        );
        Ok(Self::new(Arc::new(transport), config.channel_id.clone())
            .with_long_poll_secs(config.long_poll_secs))
    }

    pub fn with_long_poll_secs(mut self, secs: u64) -> Self {
        self.waiter = self.waiter.with_long_poll_secs(secs);
        self
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    /// Session for a topic that already exists in this desk's chat.
    pub fn session(&self, thread_id: ThreadId) -> Session {
        Session::new(self.channel.clone(), thread_id)
    }

    /// Create a forum topic named `task_name` and return its session.
    pub async fn open_session(&self, task_name: &str) -> TelegramResult<Session> {
        let request = CreateForumTopicRequest {
            chat_id: self.channel.clone(),
            name: task_name.to_string(),
        };
        let result: Value = post_json(
            self.transport.as_ref(),
            "createForumTopic",
            &request,
            REQUEST_TIMEOUT,
        )
        .await?;
        // A topic without `message_thread_id` is the platform's fault, not the network's.
        let topic: ForumTopic =
            serde_json::from_value(result.clone()).map_err(|_| TransportError::Protocol {
                status: 200,
                body: result.to_string(),
            })?;

        info!(thread_id = topic.message_thread_id, task = task_name, "opened task session");
        Ok(self.session(topic.message_thread_id))
    }

    /// Post a status update into the session's topic.
    pub async fn post_update(
        &self,
        session: &Session,
        text: &str,
    ) -> TelegramResult<DeliveredMessage> {
        self.sender
            .send(&OutboundMessage::rich(session.clone(), text))
            .await
    }

    /// Ask a question, optionally with answer buttons, and block until the
    /// human replies in the topic.
    pub async fn ask_and_wait(
        &self,
        session: &Session,
        question: &str,
        options: &[String],
        cancel: &CancellationToken,
    ) -> TelegramResult<Reply> {
        let message =
            OutboundMessage::rich(session.clone(), question).with_buttons(options.iter().cloned());
        self.sender.send(&message).await?;
        info!(thread_id = session.thread_id, options = options.len(), "question posted");

        self.waiter.wait_for_reply(session, cancel).await
    }

    /// Check the token against `getMe`.
    pub async fn check_connection(&self) -> TelegramResult<BotIdentity> {
        let identity: BotIdentity =
            post_json(self.transport.as_ref(), "getMe", &json!({}), REQUEST_TIMEOUT)
                .await?;
        info!(bot = ?identity.username, "telegram connection verified");
        Ok(identity)
    }
}
