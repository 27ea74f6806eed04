use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use cupido_types::events::{ChannelEvent, ChannelEventKind, ChannelState};
use cupido_types::models::{DeliveryStatus, Message};

use crate::channel::LiveChannel;
use crate::config::{ClientConfig, ReconnectPolicy, ResendPolicy};
use crate::error::ClientError;
use crate::history::HistoryClient;
use crate::moderation::ModerationClient;
use crate::session::{SessionStore, require_token};
use crate::timeline::Timeline;

/// How a room obtains a channel instance. The default connector dials the
/// real endpoint; tests substitute an in-memory transport.
pub trait ChannelConnector: Send + Sync {
    fn connect(
        &self,
        conversation_id: i64,
        token: &str,
        events: mpsc::Sender<ChannelEvent>,
    ) -> LiveChannel;
}

/// Production connector: dials the conversation's WebSocket endpoint.
pub struct WsConnector {
    config: ClientConfig,
}

impl WsConnector {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }
}

impl ChannelConnector for WsConnector {
    fn connect(
        &self,
        conversation_id: i64,
        token: &str,
        events: mpsc::Sender<ChannelEvent>,
    ) -> LiveChannel {
        LiveChannel::open(&self.config, conversation_id, token, events)
    }
}

/// State published to the presentation layer after every transition.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub messages: Vec<Message>,
    pub channel: ChannelState,
    /// History-load or clear failure, surfaced as a banner. Channel faults
    /// show up in `channel`, not here.
    pub error: Option<String>,
}

impl RoomSnapshot {
    /// The input box is enabled only while the channel is open.
    pub fn can_send(&self) -> bool {
        self.channel.is_open()
    }
}

pub(crate) enum RoomCommand {
    SendText(String),
    Resend(i64),
    ClearHistory,
    Reconnect,
    Shutdown,
}

/// Handle to one conversation's event loop.
pub struct RoomHandle {
    conversation_id: i64,
    commands: mpsc::Sender<RoomCommand>,
    snapshot: watch::Receiver<RoomSnapshot>,
}

impl RoomHandle {
    pub fn conversation_id(&self) -> i64 {
        self.conversation_id
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch endpoint for the UI; fires after every state transition.
    pub fn watch(&self) -> watch::Receiver<RoomSnapshot> {
        self.snapshot.clone()
    }

    /// Submit a composed message. Yields an optimistic `sending` entry while
    /// the channel is open, a `failed` entry otherwise.
    pub async fn send_text(&self, text: impl Into<String>) {
        let _ = self.commands.send(RoomCommand::SendText(text.into())).await;
    }

    /// Retry a failed entry, subject to the configured [`ResendPolicy`].
    pub async fn resend(&self, id: i64) {
        let _ = self.commands.send(RoomCommand::Resend(id)).await;
    }

    /// Delete the conversation's messages remotely, then empty the local
    /// timeline.
    pub async fn clear_history(&self) {
        let _ = self.commands.send(RoomCommand::ClearHistory).await;
    }

    /// Tear the room down: closes the channel and abandons any in-flight
    /// history fetch. Safe to call more than once.
    pub async fn close(&self) {
        let _ = self.commands.send(RoomCommand::Shutdown).await;
    }
}

/// Spawn the event loop for one conversation.
///
/// Fails up front with [`ClientError::Auth`] when the session has no token,
/// which blocks both the loader and the channel from starting.
pub fn spawn(
    config: ClientConfig,
    session: &dyn SessionStore,
    connector: Arc<dyn ChannelConnector>,
    conversation_id: i64,
    local_sender: String,
) -> Result<RoomHandle, ClientError> {
    let token = require_token(session)?;
    let history = HistoryClient::new(&config)?;
    let moderation = ModerationClient::new(&config)?;

    let (event_tx, event_rx) = mpsc::channel(256);
    let (command_tx, command_rx) = mpsc::channel(32);
    let channel = connector.connect(conversation_id, &token, event_tx.clone());
    let (snapshot_tx, snapshot_rx) = watch::channel(RoomSnapshot {
        messages: Vec::new(),
        channel: channel.state(),
        error: None,
    });

    let room = Room {
        conversation_id,
        local_sender,
        token,
        config,
        connector,
        channel,
        timeline: Timeline::new(),
        moderation,
        error: None,
        reconnect_attempts: 0,
        event_tx,
        commands: command_tx.clone(),
        snapshot: snapshot_tx,
    };
    tokio::spawn(room.run(history, event_rx, command_rx));

    Ok(RoomHandle {
        conversation_id,
        commands: command_tx,
        snapshot: snapshot_rx,
    })
}

struct Room {
    conversation_id: i64,
    local_sender: String,
    token: String,
    config: ClientConfig,
    connector: Arc<dyn ChannelConnector>,
    channel: LiveChannel,
    timeline: Timeline,
    moderation: ModerationClient,
    error: Option<String>,
    reconnect_attempts: u32,
    event_tx: mpsc::Sender<ChannelEvent>,
    commands: mpsc::Sender<RoomCommand>,
    snapshot: watch::Sender<RoomSnapshot>,
}

impl Room {
    async fn run(
        mut self,
        history: HistoryClient,
        mut events: mpsc::Receiver<ChannelEvent>,
        mut commands: mpsc::Receiver<RoomCommand>,
    ) {
        let mut history_task = tokio::spawn({
            let conversation_id = self.conversation_id;
            let token = self.token.clone();
            async move { history.fetch(conversation_id, &token).await }
        });
        let mut history_pending = true;

        info!("room open for chat {}", self.conversation_id);

        loop {
            tokio::select! {
                result = &mut history_task, if history_pending => {
                    history_pending = false;
                    match result {
                        Ok(Ok(messages)) => self.timeline.append_history(messages),
                        Ok(Err(e)) => {
                            warn!("history load failed for chat {}: {}", self.conversation_id, e);
                            self.error = Some(e.to_string());
                        }
                        Err(e) => {
                            warn!("history task failed for chat {}: {}", self.conversation_id, e);
                            self.error = Some(e.to_string());
                        }
                    }
                    self.publish();
                }
                event = events.recv() => {
                    let Some(event) = event else { break };
                    self.handle_event(event);
                    self.publish();
                }
                command = commands.recv() => {
                    match command {
                        None | Some(RoomCommand::Shutdown) => break,
                        Some(RoomCommand::SendText(text)) => self.handle_send(text),
                        Some(RoomCommand::Resend(id)) => self.handle_resend(id),
                        Some(RoomCommand::ClearHistory) => self.handle_clear().await,
                        Some(RoomCommand::Reconnect) => self.handle_reconnect(),
                    }
                    self.publish();
                }
            }
        }

        // Teardown is unconditional: the channel close is idempotent, and a
        // fetch result still in flight is discarded with its task.
        self.channel.close();
        if history_pending {
            history_task.abort();
        }
        info!("room closed for chat {}", self.conversation_id);
    }

    fn handle_event(&mut self, event: ChannelEvent) {
        if event.conversation_id != self.conversation_id {
            debug!(
                "dropping stale event for chat {} (room is chat {})",
                event.conversation_id, self.conversation_id
            );
            return;
        }
        match event.kind {
            ChannelEventKind::Opened => {
                self.reconnect_attempts = 0;
            }
            ChannelEventKind::MessageReceived(message) => self.timeline.append_live(message),
            ChannelEventKind::Closed => {}
            ChannelEventKind::Failed(reason) => {
                warn!("chat {} channel fault: {}", self.conversation_id, reason);
                self.schedule_reconnect();
            }
        }
    }

    fn handle_send(&mut self, text: String) {
        let text = text.trim().to_string();
        if text.is_empty() {
            return;
        }
        match self.channel.send_text(&text) {
            Ok(()) => {
                self.timeline
                    .push_local(text, self.local_sender.clone(), DeliveryStatus::Sending);
            }
            Err(_) => {
                warn!(
                    "chat {} send while channel not open; marking failed",
                    self.conversation_id
                );
                self.timeline
                    .push_local(text, self.local_sender.clone(), DeliveryStatus::Failed);
            }
        }
    }

    fn handle_resend(&mut self, id: i64) {
        match self.config.resend {
            ResendPolicy::Recompose => {
                warn!(
                    "chat {} resend of entry {} rejected by policy",
                    self.conversation_id, id
                );
            }
            ResendPolicy::ReuseId => {
                let Some(entry) = self.timeline.get(id) else { return };
                if !entry.status.is_failed() {
                    return;
                }
                let content = entry.content.clone();
                match self.channel.send_text(&content) {
                    Ok(()) => {
                        self.timeline.set_status(id, DeliveryStatus::Sending);
                    }
                    Err(_) => warn!(
                        "chat {} resend of entry {} failed: channel not open",
                        self.conversation_id, id
                    ),
                }
            }
        }
    }

    async fn handle_clear(&mut self) {
        match self
            .moderation
            .clear_history(self.conversation_id, &self.token)
            .await
        {
            Ok(()) => self.timeline.clear(),
            Err(e) => {
                warn!("chat {} clear history failed: {}", self.conversation_id, e);
                self.error = Some(e.to_string());
            }
        }
    }

    fn schedule_reconnect(&mut self) {
        let ReconnectPolicy::Fixed { delay, max_attempts } = self.config.reconnect else {
            return;
        };
        if self.reconnect_attempts >= max_attempts {
            info!("chat {} reconnect budget exhausted", self.conversation_id);
            return;
        }
        self.reconnect_attempts += 1;
        debug!(
            "chat {} reconnecting in {:?} (attempt {})",
            self.conversation_id, delay, self.reconnect_attempts
        );
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = commands.send(RoomCommand::Reconnect).await;
        });
    }

    fn handle_reconnect(&mut self) {
        if !self.channel.state().is_terminal() {
            return; // an instance is already connecting or open
        }
        self.channel.close();
        self.channel =
            self.connector
                .connect(self.conversation_id, &self.token, self.event_tx.clone());
    }

    fn publish(&self) {
        let _ = self.snapshot.send(RoomSnapshot {
            messages: self.timeline.messages().to_vec(),
            channel: self.channel.state(),
            error: self.error.clone(),
        });
    }
}
