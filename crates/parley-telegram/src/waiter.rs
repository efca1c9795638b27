//! Waiting for the human's answer in a session's topic.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{TelegramError, TelegramResult};
use crate::poller::EventPoller;
use crate::sender::MessageSender;
use crate::transport::{REQUEST_TIMEOUT, Transport, post_json};
use crate::types::{
    AnswerCallbackQueryRequest, EventKind, InboundEvent, OutboundMessage, Reply, Session,
};

/// Pause between polls that did not resolve the wait.
pub const POLL_BACKOFF: Duration = Duration::from_secs(2);

/// Prefix of the confirmation posted after a button is chosen.
pub const SELECTION_PREFIX: &str = "🔘 **Selected:** ";

/// Highest update sequence a wait has seen.
///
/// Only moves forward; the next poll asks for everything after it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollCursor {
    last_seen: i64,
}

impl PollCursor {
    /// Baseline from a cursorless poll: the highest sequence in it, or 0.
    pub fn seed(events: &[InboundEvent]) -> Self {
        let mut cursor = Self::default();
        for event in events {
            cursor.observe(event.sequence);
        }
        cursor
    }

    pub fn observe(&mut self, sequence: i64) {
        self.last_seen = self.last_seen.max(sequence);
    }

    pub fn last_seen(&self) -> i64 {
        self.last_seen
    }

    /// `offset` for the next `getUpdates`, confirming everything seen so far.
    pub fn next_offset(&self) -> i64 {
        self.last_seen + 1
    }
}

/// Blocks until the human answers in a session's topic.
#[derive(Clone)]
pub struct ReplyWaiter {
    transport: Arc<dyn Transport>,
    poller: EventPoller,
    sender: MessageSender,
}

impl ReplyWaiter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            poller: EventPoller::new(Arc::clone(&transport)),
            sender: MessageSender::new(Arc::clone(&transport)),
            transport,
        }
    }

    pub fn with_long_poll_secs(mut self, secs: u64) -> Self {
        self.poller = self.poller.with_long_poll_secs(secs);
        self
    }

    /// Wait for the next text message or button click in `session`'s topic.
    ///
    /// There is no timeout; the wait ends only on a reply or when `cancel`
    /// fires. Events for other topics are consumed and skipped.
    pub async fn wait_for_reply(
        &self,
        session: &Session,
        cancel: &CancellationToken,
    ) -> TelegramResult<Reply> {
        let thread_id = session.thread_id;
        let seed = self.poll_unless_cancelled(None, cancel).await?;
        let mut cursor = PollCursor::seed(&seed);
        info!(thread_id, cursor = cursor.last_seen(), "waiting for reply");

        loop {
            let mut batch = self
                .poll_unless_cancelled(Some(cursor.next_offset()), cancel)
                .await?;
            batch.sort_by_key(|event| event.sequence);

            for event in batch {
                cursor.observe(event.sequence);
                if !event.addressed_to(session) {
                    continue;
                }
                match event.kind {
                    EventKind::TextReply { text } => {
                        info!(thread_id, sequence = event.sequence, "received text reply");
                        return Ok(Reply::Text(text));
                    }
                    EventKind::ButtonReply { label, callback_id } => {
                        info!(thread_id, sequence = event.sequence, %label, "received button reply");
                        self.acknowledge(&callback_id).await;
                        self.confirm(session, &label).await;
                        return Ok(Reply::Button(label));
                    }
                    EventKind::Unsupported => {
                        debug!(thread_id, sequence = event.sequence, "ignoring unsupported event");
                    }
                }
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled(session)),
                () = tokio::time::sleep(POLL_BACKOFF) => {}
            }
        }
    }

    /// Stop the button's loading indicator. Advisory: failures are logged only.
    async fn acknowledge(&self, callback_id: &str) {
        let request = AnswerCallbackQueryRequest {
            callback_query_id: callback_id.to_string(),
        };
        if let Err(e) = post_json::<_, Value>(
            self.transport.as_ref(),
            "answerCallbackQuery",
            &request,
            REQUEST_TIMEOUT,
        )
        .await
        {
            warn!(callback_id, error = %e, "failed to acknowledge button press");
        }
    }

    async fn confirm(&self, session: &Session, label: &str) {
        let confirmation =
            OutboundMessage::rich(session.clone(), format!("{SELECTION_PREFIX}{label}"));
        if let Err(e) = self.sender.send(&confirmation).await {
            warn!(thread_id = session.thread_id, error = %e, "failed to post selection confirmation");
        }
    }

    async fn poll_unless_cancelled(
        &self,
        cursor: Option<i64>,
        cancel: &CancellationToken,
    ) -> TelegramResult<Vec<InboundEvent>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TelegramError::Cancelled),
            events = self.poller.poll(cursor) => Ok(events),
        }
    }
}

fn cancelled(session: &Session) -> TelegramError {
    info!(thread_id = session.thread_id, "wait for reply cancelled");
    TelegramError::Cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::testing::{ScriptedTransport, fixtures};
    use crate::types::ChannelId;
    use serde_json::json;

    const CHAT: i64 = -1001;

    fn session(thread_id: i64) -> Session {
        Session::new(ChannelId::new(CHAT.to_string()), thread_id)
    }

    fn waiter(transport: &ScriptedTransport) -> ReplyWaiter {
        ReplyWaiter::new(Arc::new(transport.clone()))
    }

    fn event(sequence: i64) -> InboundEvent {
        InboundEvent {
            sequence,
            channel_id: Some(CHAT),
            thread_id: Some(1),
            kind: EventKind::Unsupported,
        }
    }

    #[test]
    fn cursor_tracks_the_highest_sequence() {
        let mut cursor = PollCursor::default();
        for sequence in [5, 7, 6, 9] {
            cursor.observe(sequence);
        }
        assert_eq!(cursor.last_seen(), 9);
        assert_eq!(cursor.next_offset(), 10);
    }

    #[test]
    fn cursor_seed_uses_max_or_zero() {
        assert_eq!(PollCursor::seed(&[]).last_seen(), 0);
        assert_eq!(PollCursor::seed(&[]).next_offset(), 1);
        assert_eq!(PollCursor::seed(&[event(4), event(12), event(8)]).last_seen(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn text_reply_in_session_resolves() {
        let transport = ScriptedTransport::new();
        transport
            .push_ok("getUpdates", json!([fixtures::text_update(3, CHAT, 42, "old")]))
            .push_ok("getUpdates", json!([fixtures::text_update(4, CHAT, 42, "ship it")]));

        let reply = waiter(&transport)
            .wait_for_reply(&session(42), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply, Reply::Text("ship it".to_string()));
        assert_eq!(transport.poll_offsets(), vec![None, Some(4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn events_for_other_threads_never_resolve() {
        let transport = ScriptedTransport::new();
        transport
            .push_ok("getUpdates", json!([]))
            .push_ok(
                "getUpdates",
                json!([
                    fixtures::text_update(5, CHAT, 7, "wrong thread"),
                    fixtures::text_update(6, -2002, 42, "wrong chat"),
                ]),
            )
            .push_ok(
                "getUpdates",
                json!([
                    fixtures::text_update(8, CHAT, 42, "mine"),
                    fixtures::text_update(7, CHAT, 7, "also wrong thread"),
                ]),
            );

        let reply = waiter(&transport)
            .wait_for_reply(&session(42), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.as_str(), "mine");
        assert_eq!(transport.poll_offsets(), vec![None, Some(1), Some(7)]);
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_batch_moves_the_next_offset_past_its_highest_sequence() {
        let transport = ScriptedTransport::new();
        transport
            .push_ok("getUpdates", json!([]))
            .push_ok(
                "getUpdates",
                json!([
                    fixtures::text_update(5, CHAT, 7, "a"),
                    fixtures::text_update(7, CHAT, 7, "b"),
                    fixtures::text_update(6, CHAT, 7, "c"),
                    fixtures::text_update(9, CHAT, 7, "d"),
                ]),
            )
            .push_ok("getUpdates", json!([fixtures::text_update(10, CHAT, 42, "mine")]));

        let reply = waiter(&transport)
            .wait_for_reply(&session(42), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.as_str(), "mine");
        assert_eq!(transport.poll_offsets(), vec![None, Some(1), Some(10)]);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_between_replies_are_spaced_by_the_backoff() {
        let transport = ScriptedTransport::new();
        transport
            .push_ok("getUpdates", json!([]))
            .push_ok("getUpdates", json!([]))
            .push_ok("getUpdates", json!([fixtures::text_update(1, CHAT, 42, "late")]));

        let started = tokio::time::Instant::now();
        let reply = waiter(&transport)
            .wait_for_reply(&session(42), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.as_str(), "late");
        let elapsed = started.elapsed();
        assert!(elapsed >= POLL_BACKOFF && elapsed < POLL_BACKOFF * 2, "{elapsed:?}");
        assert!(
            transport
                .calls_to("getUpdates")
                .iter()
                .all(|call| call.timeout == crate::transport::POLL_REQUEST_TIMEOUT)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn batches_are_processed_in_sequence_order() {
        let transport = ScriptedTransport::new();
        transport.push_ok("getUpdates", json!([])).push_ok(
            "getUpdates",
            json!([
                fixtures::text_update(9, CHAT, 42, "second"),
                fixtures::text_update(6, CHAT, 42, "first"),
            ]),
        );

        let reply = waiter(&transport)
            .wait_for_reply(&session(42), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.as_str(), "first");
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_events_advance_the_cursor() {
        let transport = ScriptedTransport::new();
        transport
            .push_ok("getUpdates", json!([]))
            .push_ok(
                "getUpdates",
                json!([{
                    "update_id": 20,
                    "message": {"message_id": 1, "message_thread_id": 42, "chat": {"id": CHAT}}
                }]),
            )
            .push_ok("getUpdates", json!([fixtures::text_update(21, CHAT, 42, "text")]));

        let reply = waiter(&transport)
            .wait_for_reply(&session(42), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.as_str(), "text");
        assert_eq!(transport.poll_offsets(), vec![None, Some(1), Some(21)]);
    }

    #[tokio::test(start_paused = true)]
    async fn button_reply_acknowledges_and_confirms() {
        let transport = ScriptedTransport::new();
        transport
            .push_ok("getUpdates", json!([]))
            .push_ok(
                "getUpdates",
                json!([fixtures::callback_update(30, CHAT, 42, "cb-7", "Yes")]),
            )
            .push_ok("answerCallbackQuery", json!(true))
            .push_ok("sendMessage", fixtures::sent_message(300, CHAT, 42));

        let reply = waiter(&transport)
            .wait_for_reply(&session(42), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply, Reply::Button("Yes".to_string()));

        let ack = &transport.calls_to("answerCallbackQuery")[0];
        assert_eq!(ack.body.as_ref().unwrap()["callback_query_id"], "cb-7");
        assert_eq!(ack.timeout, REQUEST_TIMEOUT);

        let confirmation = &transport.calls_to("sendMessage")[0];
        let body = confirmation.body.as_ref().unwrap();
        assert_eq!(body["text"], "🔘 <b>Selected:</b> Yes");
        assert_eq!(body["message_thread_id"], 42);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_acknowledgement_and_confirmation_do_not_block_the_answer() {
        let transport = ScriptedTransport::new();
        transport
            .push_ok("getUpdates", json!([]))
            .push_ok(
                "getUpdates",
                json!([fixtures::callback_update(31, CHAT, 42, "cb-8", "No")]),
            )
            .push_err(
                "answerCallbackQuery",
                TransportError::Protocol {
                    status: 400,
                    body: "query is too old".into(),
                },
            );
        // No scripted sendMessage: both confirmation attempts fail.

        let reply = waiter(&transport)
            .wait_for_reply(&session(42), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reply.as_str(), "No");
        assert_eq!(transport.calls_to("sendMessage").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_failures_keep_waiting() {
        let transport = ScriptedTransport::new();
        transport
            .push_ok("getUpdates", json!([]))
            .push_err("getUpdates", TransportError::Network("timed out".into()))
            .push_ok("getUpdates", json!([fixtures::text_update(2, CHAT, 42, "back")]));

        let reply = waiter(&transport)
            .wait_for_reply(&session(42), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(reply.as_str(), "back");
        assert_eq!(transport.poll_offsets(), vec![None, Some(1), Some(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_token_ends_immediately() {
        let transport = ScriptedTransport::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = waiter(&transport)
            .wait_for_reply(&session(42), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TelegramError::Cancelled));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_a_pending_wait_returns_cancelled() {
        let transport = ScriptedTransport::new();
        let cancel = CancellationToken::new();
        let reply_waiter = waiter(&transport);

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { reply_waiter.wait_for_reply(&session(42), &cancel).await })
        };

        tokio::time::sleep(Duration::from_secs(7)).await;
        cancel.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, TelegramError::Cancelled));
        assert!(transport.calls_to("getUpdates").len() >= 2);
    }
}
