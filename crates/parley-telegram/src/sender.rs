//! Delivery of outbound messages with the plain-text fallback.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{TelegramError, TelegramResult, TransportResult};
use crate::transport::{REQUEST_TIMEOUT, Transport, post_json};
use crate::types::{
    DeliveredMessage, OutboundMessage, RenderMode, SendMessageRequest, SentMessage,
};

/// Delivers messages into a session's topic.
///
/// Rich messages that the platform rejects (usually a markup parse error) are
/// sent once more as plain text. A message is never delivered twice.
#[derive(Clone)]
pub struct MessageSender {
    transport: Arc<dyn Transport>,
}

impl MessageSender {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send `message`, falling back to plain text if a rich attempt fails.
    pub async fn send(&self, message: &OutboundMessage) -> TelegramResult<DeliveredMessage> {
        let thread_id = message.session.thread_id;

        let first = match self.attempt(&message.to_request()).await {
            Ok(sent) => return Ok(delivered(&sent, thread_id, 1)),
            Err(e) => e,
        };

        if message.mode == RenderMode::Plain {
            return Err(TelegramError::Send {
                attempts: 1,
                last: first,
            });
        }

        warn!(thread_id, error = %first, "rich send failed, retrying as plain text");
        match self.attempt(&message.plain_request()).await {
            Ok(sent) => Ok(delivered(&sent, thread_id, 2)),
            Err(last) => Err(TelegramError::Send { attempts: 2, last }),
        }
    }

    async fn attempt(&self, request: &SendMessageRequest) -> TransportResult<SentMessage> {
        let sent: SentMessage =
            post_json(self.transport.as_ref(), "sendMessage", request, REQUEST_TIMEOUT).await?;
        debug!(
            thread_id = request.message_thread_id,
            message_id = sent.message_id,
            html = request.parse_mode.is_some(),
            "message sent"
        );
        Ok(sent)
    }
}

fn delivered(sent: &SentMessage, requested_thread: i64, attempts: u32) -> DeliveredMessage {
    DeliveredMessage {
        message_id: sent.message_id,
        thread_id: sent.message_thread_id.unwrap_or(requested_thread),
        attempts,
    }
}
