//! Bot API request/response plumbing.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::TelegramConfig;
use crate::error::{TransportError, TransportResult};
use crate::types::ApiEnvelope;

/// Timeout for ordinary calls (`sendMessage`, `createForumTopic`, ...).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for `getUpdates` with the default long-poll window.
pub const POLL_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Trait abstracting Bot API calls for testability.
///
/// Production code uses [`HttpTransport`]; tests use
/// [`ScriptedTransport`](crate::testing::ScriptedTransport).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one call and return the envelope's `result`.
    ///
    /// Implementations must not retry.
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> TransportResult<Value>;
}

/// `POST` a JSON body and decode the `result` into `T`.
///
/// A result that does not decode counts as a network error.
pub(crate) async fn post_json<B, T>(
    transport: &dyn Transport,
    endpoint: &str,
    body: &B,
    timeout: Duration,
) -> TransportResult<T>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let body = serde_json::to_value(body)
        .map_err(|e| TransportError::Network(format!("failed to encode {endpoint} request: {e}")))?;
    let result = transport
        .request(Method::POST, endpoint, Some(body), timeout)
        .await?;
    serde_json::from_value(result)
        .map_err(|e| TransportError::Network(format!("failed to decode {endpoint} result: {e}")))
}

/// Talks to `https://api.telegram.org/bot<token>/<method>` over `reqwest`.
///
/// The client is pooled and safe to share between concurrent operations.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    api_base: String,
    bot_token: String,
}

impl HttpTransport {
    pub fn new(config: &TelegramConfig) -> TransportResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, endpoint)
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("api_base", &self.api_base)
            .field("bot_token", &"****")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        timeout: Duration,
    ) -> TransportResult<Value> {
        debug!(endpoint, ?timeout, "telegram API call");

        let mut request = self
            .client
            .request(method, self.url(endpoint))
            .timeout(timeout);
        if let Some(body) = body {
            request = request.json(&body);
        }

        // The URL embeds the bot token; keep it out of error messages.
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.without_url().to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Protocol {
                status: status.as_u16(),
                body: text,
            });
        }

        parse_envelope(status.as_u16(), text)
    }
}

/// Unwrap a 2xx body: `"ok": false` is still a protocol failure.
fn parse_envelope(status: u16, text: String) -> TransportResult<Value> {
    let envelope: ApiEnvelope = serde_json::from_str(&text)
        .map_err(|e| TransportError::Network(format!("failed to decode response body: {e}")))?;
    if !envelope.ok {
        return Err(TransportError::Protocol { status, body: text });
    }
    Ok(envelope.result.unwrap_or(Value::Null))
}
