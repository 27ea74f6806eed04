use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Lifecycle of one live channel instance.
///
/// `Closed` and `Error` are terminal for the instance. A reconnect, when the
/// configured policy allows one, opens a fresh instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
    Error,
}

impl ChannelState {
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }
}

/// Events emitted by a live channel. Each carries the conversation id the
/// channel was opened for, so an event from a stale instance can be told
/// apart after the active conversation has switched.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    pub conversation_id: i64,
    pub kind: ChannelEventKind,
}

#[derive(Debug, Clone)]
pub enum ChannelEventKind {
    /// Handshake succeeded; outbound sends are accepted from here on.
    Opened,
    /// A fully-formed message arrived from the server.
    MessageReceived(Message),
    /// Graceful shutdown, by either end.
    Closed,
    /// Transport fault; carries a human-readable description.
    Failed(String),
}

/// Inbound channel frame: `{"message": { ... }}` with a full message record.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    pub message: Message,
}

/// Outbound channel frame: `{"message": "<text>"}`.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    pub message: String,
}
