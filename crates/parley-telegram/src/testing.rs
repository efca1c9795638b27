//! Testing utilities for deterministic conversation tests.
//!
//! [`ScriptedTransport`] replays queued Bot API results per endpoint and
//! records every call, so tests can assert on exactly what went over the wire.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};

use crate::error::{TransportError, TransportResult};
use crate::transport::Transport;

/// Record of one call made through a [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub endpoint: String,
    pub body: Option<Value>,
    pub timeout: Duration,
}

/// Transport that returns pre-scripted results.
///
/// Results are queued per endpoint and consumed in order. When a queue runs
/// dry, `getUpdates` returns an empty batch and every other endpoint fails with
/// a network error.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

#[derive(Debug, Default)]
struct ScriptState {
    queues: HashMap<String, VecDeque<TransportResult<Value>>>,
    calls: Vec<RecordedCall>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful `result` for `endpoint`.
    pub fn push_ok(&self, endpoint: &str, result: Value) -> &Self {
        self.push(endpoint, Ok(result))
    }

    /// Queue a failure for `endpoint`.
    pub fn push_err(&self, endpoint: &str, error: TransportError) -> &Self {
        self.push(endpoint, Err(error))
    }

    fn push(&self, endpoint: &str, response: TransportResult<Value>) -> &Self {
        self.lock()
            .queues
            .entry(endpoint.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Calls made to one endpoint, in order.
    pub fn calls_to(&self, endpoint: &str) -> Vec<RecordedCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.endpoint == endpoint)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// `offset` values sent to `getUpdates`, `None` for a cursorless poll.
    pub fn poll_offsets(&self) -> Vec<Option<i64>> {
        self.calls_to("getUpdates")
            .iter()
            .map(|call| {
                call.body
                    .as_ref()
                    .and_then(|body| body.get("offset"))
                    .and_then(Value::as_i64)
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        // A panicking test thread must not hide the calls recorded so far.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> TransportResult<Value> {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            method,
            endpoint: endpoint.to_string(),
            body,
            timeout,
        });

        let next = state
            .queues
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front);
        match next {
            Some(response) => response,
            None if endpoint == "getUpdates" => Ok(json!([])),
            None => Err(TransportError::Network(format!(
                "no scripted response for {endpoint}"
            ))),
        }
    }
}

/// Builders for Bot API payloads.
pub mod fixtures {
    use serde_json::{Value, json};

    /// A text message posted in a forum topic.
    pub fn text_update(update_id: i64, chat_id: i64, thread_id: i64, text: &str) -> Value {
        json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id * 10,
                "message_thread_id": thread_id,
                "chat": {"id": chat_id, "type": "supergroup"},
                "text": text,
            }
        })
    }

    /// A click on an inline button attached to a message in a forum topic.
    pub fn callback_update(
        update_id: i64,
        chat_id: i64,
        thread_id: i64,
        callback_id: &str,
        data: &str,
    ) -> Value {
        json!({
            "update_id": update_id,
            "callback_query": {
                "id": callback_id,
                "data": data,
                "message": {
                    "message_id": update_id * 10,
                    "message_thread_id": thread_id,
                    "chat": {"id": chat_id, "type": "supergroup"},
                }
            }
        })
    }

    /// The `result` of a successful `sendMessage`.
    pub fn sent_message(message_id: i64, chat_id: i64, thread_id: i64) -> Value {
        json!({
            "message_id": message_id,
            "message_thread_id": thread_id,
            "chat": {"id": chat_id, "type": "supergroup"},
        })
    }

    /// The `result` of a successful `createForumTopic`.
    pub fn forum_topic(thread_id: i64, name: &str) -> Value {
        json!({
            "message_thread_id": thread_id,
            "name": name,
            "icon_color": 7_322_096,
        })
    }
}
