use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{Notify, mpsc, watch};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{info, warn};

use cupido_types::events::{ChannelEvent, ChannelEventKind, ChannelState, InboundFrame, OutboundFrame};
use cupido_types::models::Message;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Handle to one live channel instance, scoped to one conversation.
///
/// The instance runs `connecting → open → closed`, or drops into `error` on
/// a transport fault. Both end states are terminal: reconnecting means
/// opening a new instance. [`LiveChannel::close`] shuts the connection down
/// gracefully and is idempotent; dropping the handle closes it too, by
/// ending the outbound mailbox.
pub struct LiveChannel {
    conversation_id: i64,
    state: watch::Receiver<ChannelState>,
    outbound: mpsc::Sender<String>,
    shutdown: Arc<Notify>,
}

impl LiveChannel {
    /// Dial the conversation's WebSocket endpoint. Returns immediately in
    /// state `connecting`; lifecycle and message events arrive on `events`.
    pub fn open(
        config: &ClientConfig,
        conversation_id: i64,
        token: &str,
        events: mpsc::Sender<ChannelEvent>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let shutdown = Arc::new(Notify::new());

        let url = config.channel_url(conversation_id, token);
        let connect_timeout = config.connect_timeout;
        let task_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let connected = tokio::select! {
                _ = task_shutdown.notified() => {
                    // Closed before the handshake finished.
                    let _ = state_tx.send(ChannelState::Closed);
                    emit(&events, conversation_id, ChannelEventKind::Closed).await;
                    return;
                }
                result = connect(&url, connect_timeout) => result,
            };

            let socket = match connected {
                Ok(socket) => socket,
                Err(e) => {
                    warn!("live channel for chat {} failed to connect: {}", conversation_id, e);
                    let _ = state_tx.send(ChannelState::Error);
                    emit(&events, conversation_id, ChannelEventKind::Failed(e.to_string())).await;
                    return;
                }
            };

            run_channel(socket, conversation_id, state_tx, events, outbound_rx, task_shutdown).await;
        });

        Self {
            conversation_id,
            state: state_rx,
            outbound: outbound_tx,
            shutdown,
        }
    }

    /// Wrap an already-established transport. Used by tests to drive the
    /// lifecycle without a real socket.
    pub fn open_with<S>(socket: S, conversation_id: i64, events: mpsc::Sender<ChannelEvent>) -> Self
    where
        S: Stream<Item = Result<WsMessage, WsError>>
            + Sink<WsMessage, Error = WsError>
            + Send
            + Unpin
            + 'static,
    {
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let shutdown = Arc::new(Notify::new());

        let task_shutdown = shutdown.clone();
        tokio::spawn(run_channel(
            socket,
            conversation_id,
            state_tx,
            events,
            outbound_rx,
            task_shutdown,
        ));

        Self {
            conversation_id,
            state: state_rx,
            outbound: outbound_tx,
            shutdown,
        }
    }

    pub fn conversation_id(&self) -> i64 {
        self.conversation_id
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Queue one outbound text frame. Fails fast while not `open` and never
    /// blocks.
    pub fn send_text(&self, text: &str) -> Result<(), ClientError> {
        if !self.state().is_open() {
            return Err(ClientError::ChannelNotOpen);
        }
        self.outbound
            .try_send(text.to_string())
            .map_err(|_| ClientError::ChannelNotOpen)
    }

    /// Request a graceful shutdown. Safe to call any number of times, in any
    /// state: closing an already-closed channel is a no-op.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }
}

async fn connect(
    url: &str,
    limit: Option<std::time::Duration>,
) -> Result<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>, ClientError> {
    let handshake = tokio_tungstenite::connect_async(url);
    let result = match limit {
        Some(limit) => match tokio::time::timeout(limit, handshake).await {
            Ok(result) => result,
            Err(_) => return Err(ClientError::Channel("handshake timed out".into())),
        },
        None => handshake.await,
    };
    match result {
        Ok((socket, _response)) => Ok(socket),
        Err(e) => Err(ClientError::Channel(e.to_string())),
    }
}

/// The per-connection event loop: relay inbound frames as typed events,
/// drain the outbound mailbox, and honor shutdown requests.
async fn run_channel<S>(
    socket: S,
    conversation_id: i64,
    state: watch::Sender<ChannelState>,
    events: mpsc::Sender<ChannelEvent>,
    mut outbound: mpsc::Receiver<String>,
    shutdown: Arc<Notify>,
) where
    S: Stream<Item = Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Unpin,
{
    let (mut sink, mut stream) = socket.split();

    let _ = state.send(ChannelState::Open);
    info!("live channel open for chat {}", conversation_id);
    if events
        .send(ChannelEvent {
            conversation_id,
            kind: ChannelEventKind::Opened,
        })
        .await
        .is_err()
    {
        // No one is listening anymore; close the transport and stop.
        let _ = sink.send(WsMessage::Close(None)).await;
        let _ = state.send(ChannelState::Closed);
        return;
    }

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        match decode_frame(&text) {
                            Ok(message) => {
                                if emit(&events, conversation_id, ChannelEventKind::MessageReceived(message)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                // Malformed frames are dropped; the loop keeps
                                // serving later events.
                                warn!(
                                    "chat {} bad frame: {} -- raw: {}",
                                    conversation_id,
                                    e,
                                    log_excerpt(&text, 200)
                                );
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        let _ = state.send(ChannelState::Closed);
                        info!("live channel closed for chat {}", conversation_id);
                        let _ = emit(&events, conversation_id, ChannelEventKind::Closed).await;
                        return;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary: nothing to do
                    Some(Err(e)) => {
                        let _ = state.send(ChannelState::Error);
                        warn!("live channel error for chat {}: {}", conversation_id, e);
                        let _ = emit(&events, conversation_id, ChannelEventKind::Failed(e.to_string())).await;
                        return;
                    }
                }
            }
            text = outbound.recv() => {
                let Some(text) = text else { break };
                let frame = OutboundFrame { message: text };
                let json = serde_json::to_string(&frame)
                    .expect("outbound frame serialization cannot fail");
                if let Err(e) = sink.send(WsMessage::Text(json)).await {
                    let _ = state.send(ChannelState::Error);
                    warn!("live channel send failed for chat {}: {}", conversation_id, e);
                    let _ = emit(&events, conversation_id, ChannelEventKind::Failed(e.to_string())).await;
                    return;
                }
            }
            _ = shutdown.notified() => break,
        }
    }

    let _ = sink.send(WsMessage::Close(None)).await;
    let _ = state.send(ChannelState::Closed);
    info!("live channel shut down for chat {}", conversation_id);
    let _ = emit(&events, conversation_id, ChannelEventKind::Closed).await;
}

async fn emit(
    events: &mpsc::Sender<ChannelEvent>,
    conversation_id: i64,
    kind: ChannelEventKind,
) -> Result<(), mpsc::error::SendError<ChannelEvent>> {
    events
        .send(ChannelEvent {
            conversation_id,
            kind,
        })
        .await
}

/// Prefix of `raw` at most `limit` bytes long, cut on a character boundary
/// so multibyte content cannot panic the slice.
fn log_excerpt(raw: &str, limit: usize) -> &str {
    let mut end = raw.len().min(limit);
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    &raw[..end]
}

fn decode_frame(text: &str) -> Result<Message, ClientError> {
    let frame: InboundFrame = serde_json::from_str(text)?;
    Ok(frame.message)
}
