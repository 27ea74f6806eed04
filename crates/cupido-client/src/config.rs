use std::time::Duration;

use crate::error::ClientError;

/// What happens after a channel instance ends in `closed` or `error`.
///
/// Applied by the room loop, never by the channel itself: a channel
/// instance's terminal states stay terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// The conversation stays disconnected until it is reopened. This is the
    /// upstream behavior.
    #[default]
    Never,
    /// Reopen after `delay`, at most `max_attempts` times per room.
    Fixed { delay: Duration, max_attempts: u32 },
}

/// What resending a failed local entry does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResendPolicy {
    /// Failed entries are dead; the user composes a new message.
    #[default]
    Recompose,
    /// The failed entry keeps its provisional id, flips back to `sending`,
    /// and its frame is sent again.
    ReuseId,
}

/// Endpoints and policy knobs for one backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for REST calls, e.g. `http://127.0.0.1:8000`.
    pub http_base: String,
    /// Base URL for the live channel, e.g. `ws://127.0.0.1:8000`.
    pub ws_base: String,
    /// Limit on the WebSocket handshake. `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
    /// Limit on each HTTP request. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    pub reconnect: ReconnectPolicy,
    pub resend: ResendPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http_base: "http://127.0.0.1:8000".into(),
            ws_base: "ws://127.0.0.1:8000".into(),
            connect_timeout: None,
            request_timeout: None,
            reconnect: ReconnectPolicy::default(),
            resend: ResendPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub(crate) fn http_client(&self) -> Result<reqwest::Client, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(limit) = self.request_timeout {
            builder = builder.timeout(limit);
        }
        Ok(builder.build()?)
    }

    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.http_base.trim_end_matches('/'), path)
    }

    pub(crate) fn channel_url(&self, conversation_id: i64, token: &str) -> String {
        format!(
            "{}/ws/chat/{}/?token={}",
            self.ws_base.trim_end_matches('/'),
            conversation_id,
            token
        )
    }
}
