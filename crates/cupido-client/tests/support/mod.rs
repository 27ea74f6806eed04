//! Shared scaffolding for the integration tests: an in-memory WebSocket
//! stand-in, a connector that hands its remote ends to the test, and a local
//! axum server doubling for the chat backend.
//!
//! Each test binary pulls in the subset it needs.
#![allow(dead_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use futures_util::{Sink, Stream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use chrono::{TimeZone, Utc};
use cupido_client::channel::LiveChannel;
use cupido_client::room::{ChannelConnector, RoomHandle, RoomSnapshot};
use cupido_types::events::ChannelEvent;
use cupido_types::models::{Conversation, DeliveryStatus, Message};

pub const TOKEN: &str = "test-token";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cupido_client=debug".into()),
        )
        .try_init();
}

// -- Fixtures --

pub fn msg(id: i64, minute: u32, content: &str) -> Message {
    Message {
        id,
        content: content.into(),
        sender: "juan.perez@test.com".into(),
        outgoing: false,
        sent_at: Utc.with_ymd_and_hms(2025, 11, 17, 10, minute, 0).unwrap(),
        status: DeliveryStatus::Read,
    }
}

pub fn echo_msg(id: i64, minute: u32, content: &str) -> Message {
    Message {
        outgoing: true,
        sender: "maestro@unipamplona.edu.co".into(),
        status: DeliveryStatus::Sent,
        ..msg(id, minute, content)
    }
}

pub fn convo(id: i64, name: &str) -> Conversation {
    Conversation {
        id,
        contact_name: name.into(),
        contact_photo: format!("https://example.com/{}.jpg", id),
        last_message: "…".into(),
        last_message_at: "10:30 AM".into(),
        unread: 0,
    }
}

/// A live-channel frame as the backend would push it.
pub fn live_frame(message: &Message) -> WsMessage {
    WsMessage::Text(serde_json::to_string(&serde_json::json!({ "message": message })).unwrap())
}

// -- In-memory socket --

/// In-memory stand-in for a WebSocket. The test feeds inbound frames through
/// the [`RemoteEnd`] and observes what the client sends.
pub struct FakeSocket {
    incoming: mpsc::UnboundedReceiver<Result<WsMessage, WsError>>,
    outgoing: mpsc::UnboundedSender<WsMessage>,
}

pub struct RemoteEnd {
    pub to_client: mpsc::UnboundedSender<Result<WsMessage, WsError>>,
    pub from_client: mpsc::UnboundedReceiver<WsMessage>,
}

pub fn fake_socket() -> (FakeSocket, RemoteEnd) {
    let (to_client, incoming) = mpsc::unbounded_channel();
    let (outgoing, from_client) = mpsc::unbounded_channel();
    (
        FakeSocket { incoming, outgoing },
        RemoteEnd {
            to_client,
            from_client,
        },
    )
}

impl Stream for FakeSocket {
    type Item = Result<WsMessage, WsError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().incoming.poll_recv(cx)
    }
}

impl Sink<WsMessage> for FakeSocket {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: WsMessage) -> Result<(), WsError> {
        self.get_mut()
            .outgoing
            .send(item)
            .map_err(|_| WsError::ConnectionClosed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }
}

// -- Connector --

/// Connector that backs every channel with a fresh [`FakeSocket`] and hands
/// the remote end to the test.
pub struct FakeConnector {
    remotes: mpsc::UnboundedSender<RemoteEnd>,
    events: Mutex<Option<mpsc::Sender<ChannelEvent>>>,
}

impl FakeConnector {
    pub fn create() -> (Arc<Self>, mpsc::UnboundedReceiver<RemoteEnd>) {
        let (remotes, remote_rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                remotes,
                events: Mutex::new(None),
            }),
            remote_rx,
        )
    }

    /// Push an event straight into the room's mailbox, bypassing the live
    /// channel's tagging. Lets a test stand in for a stale instance.
    pub async fn inject(&self, event: ChannelEvent) {
        let sender = self
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("no channel connected yet");
        sender.send(event).await.unwrap();
    }
}

impl ChannelConnector for FakeConnector {
    fn connect(
        &self,
        conversation_id: i64,
        _token: &str,
        events: mpsc::Sender<ChannelEvent>,
    ) -> LiveChannel {
        let (socket, remote) = fake_socket();
        *self.events.lock().unwrap() = Some(events.clone());
        let _ = self.remotes.send(remote);
        LiveChannel::open_with(socket, conversation_id, events)
    }
}

// -- Backend double --

#[derive(Clone)]
pub struct BackendState {
    pub history: Arc<Vec<Message>>,
    pub roster: Arc<Vec<Conversation>>,
    pub cleared: Arc<AtomicUsize>,
    pub fail_history: bool,
}

impl BackendState {
    pub fn new(history: Vec<Message>) -> Self {
        Self {
            history: Arc::new(history),
            roster: Arc::new(Vec::new()),
            cleared: Arc::new(AtomicUsize::new(0)),
            fail_history: false,
        }
    }

    pub fn with_roster(mut self, roster: Vec<Conversation>) -> Self {
        self.roster = Arc::new(roster);
        self
    }
}

/// Bind a local axum server covering the chat endpoints, returning its base
/// URL.
pub async fn spawn_backend(state: BackendState) -> String {
    let app = axum::Router::new()
        .route("/api/v1/chat/", get(list_conversations))
        .route(
            "/api/v1/chat/{id}/mensajes/",
            get(get_history).delete(clear_history),
        )
        .route("/api/v1/chat/{id}/bloquear/", post(accept_action))
        .route("/api/v1/chat/{id}/reportar/", post(accept_action))
        .route("/api/v1/chat/{id}/cerrar/", post(accept_action))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Listener that accepts connections and never answers, for timeout tests.
pub async fn silent_listener() -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let _held = socket;
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
    });
    addr
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some(format!("Bearer {}", TOKEN).as_str())
}

async fn list_conversations(
    State(state): State<BackendState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Conversation>>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(state.roster.as_ref().clone()))
}

async fn get_history(
    State(state): State<BackendState>,
    Path(_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<Vec<Message>>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if state.fail_history {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(state.history.as_ref().clone()))
}

async fn clear_history(
    State(state): State<BackendState>,
    Path(_id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    state.cleared.fetch_add(1, Ordering::SeqCst);
    Ok(StatusCode::NO_CONTENT)
}

async fn accept_action(
    State(_state): State<BackendState>,
    Path(_id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(StatusCode::NO_CONTENT)
}

// -- Waiting helpers --

pub async fn wait_for_snapshot<F>(handle: &RoomHandle, mut pred: F) -> RoomSnapshot
where
    F: FnMut(&RoomSnapshot) -> bool,
{
    let mut watch = handle.watch();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let current = watch.borrow_and_update().clone();
            if pred(&current) {
                return current;
            }
            if watch.changed().await.is_err() {
                panic!("room loop ended before the condition was met");
            }
        }
    })
    .await
    .expect("timed out waiting for room snapshot")
}

pub async fn next_event(rx: &mut mpsc::Receiver<ChannelEvent>) -> ChannelEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for channel event")
        .expect("event stream ended")
}

pub async fn next_outbound(remote: &mut RemoteEnd) -> WsMessage {
    tokio::time::timeout(Duration::from_secs(5), remote.from_client.recv())
        .await
        .expect("timed out waiting for outbound frame")
        .expect("client side closed")
}

pub async fn next_remote(rx: &mut mpsc::UnboundedReceiver<RemoteEnd>) -> RemoteEnd {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a channel to connect")
        .expect("connector dropped")
}
