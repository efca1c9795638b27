//! Long-polling the `getUpdates` feed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::transport::{POLL_REQUEST_TIMEOUT, Transport, post_json};
use crate::types::{GetUpdatesRequest, InboundEvent, Update};

/// Server-side long-poll window for `getUpdates`, in seconds.
pub const DEFAULT_LONG_POLL_SECS: u64 = 10;

/// Headroom between the long-poll window and the HTTP timeout.
const POLL_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Long-polls the `getUpdates` feed.
///
/// Polling is best-effort: a failed call is logged and reported as an empty
/// batch so the caller's loop simply tries again.
#[derive(Clone)]
pub struct EventPoller {
    transport: Arc<dyn Transport>,
    long_poll_secs: u64,
}

impl EventPoller {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            long_poll_secs: DEFAULT_LONG_POLL_SECS,
        }
    }

    pub fn with_long_poll_secs(mut self, secs: u64) -> Self {
        self.long_poll_secs = secs;
        self
    }

    /// HTTP timeout for one poll: 15s, or longer if the window needs it.
    pub fn request_timeout(&self) -> Duration {
        let window = Duration::from_secs(self.long_poll_secs) + POLL_TIMEOUT_MARGIN;
        window.max(POLL_REQUEST_TIMEOUT)
    }

    /// Fetch the next batch of events.
    ///
    /// Without a cursor the server's default window is returned. With one,
    /// only events whose sequence is at least `cursor` are kept.
    pub async fn poll(&self, cursor: Option<i64>) -> Vec<InboundEvent> {
        let request = GetUpdatesRequest::new(cursor, self.long_poll_secs);
        let updates: Vec<Update> =
            match post_json(self.transport.as_ref(), "getUpdates", &request, self.request_timeout())
                .await
            {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, ?cursor, "getUpdates failed, treating as empty batch");
                    return Vec::new();
                }
            };

        let events: Vec<InboundEvent> = updates
            .into_iter()
            .map(InboundEvent::from)
            .filter(|event| cursor.is_none_or(|c| event.sequence >= c))
            .collect();
        debug!(?cursor, count = events.len(), "polled updates");
        events
    }
}
