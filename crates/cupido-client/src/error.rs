use thiserror::Error;

/// Errors local to one conversation's loader, channel, or send path. They
/// never leak into other conversations' state.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No usable credential: the session store is empty, or the backend
    /// rejected the token we sent. Blocks both the history fetch and the
    /// live channel from starting.
    #[error("no active session")]
    Auth,

    /// The history or roster fetch came back non-2xx.
    #[error("request failed with status {status}")]
    Network { status: u16 },

    /// The live channel's transport faulted.
    #[error("live channel error: {0}")]
    Channel(String),

    /// A send was attempted while the channel was not open. The message is
    /// marked failed locally; this is not a conversation-wide error.
    #[error("live channel is not open")]
    ChannelNotOpen,

    /// An inbound channel frame did not parse as a message event. Logged and
    /// dropped; later frames keep being processed.
    #[error("malformed channel event: {0}")]
    MalformedEvent(#[from] serde_json::Error),

    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
