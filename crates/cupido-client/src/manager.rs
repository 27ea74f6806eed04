use std::sync::Arc;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::moderation::ModerationClient;
use crate::room::{self, ChannelConnector, RoomHandle, WsConnector};
use crate::roster::{Roster, RosterClient};
use crate::session::{SessionStore, require_token};

/// Tracks the active conversation and the contact panel. At most one room is
/// live; selecting a new conversation tears the previous one down before the
/// next starts, so its channel is closed and its in-flight history fetch is
/// discarded.
pub struct ChatManager {
    config: ClientConfig,
    session: Arc<dyn SessionStore>,
    connector: Arc<dyn ChannelConnector>,
    moderation: ModerationClient,
    roster_client: RosterClient,
    roster: Roster,
    local_sender: String,
    active: Option<RoomHandle>,
}

impl ChatManager {
    pub fn new(
        config: ClientConfig,
        session: Arc<dyn SessionStore>,
        local_sender: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let connector = Arc::new(WsConnector::new(config.clone()));
        Self::with_connector(config, session, connector, local_sender)
    }

    /// Like [`ChatManager::new`] but with a custom channel connector; used by
    /// tests to run against an in-memory transport.
    pub fn with_connector(
        config: ClientConfig,
        session: Arc<dyn SessionStore>,
        connector: Arc<dyn ChannelConnector>,
        local_sender: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let moderation = ModerationClient::new(&config)?;
        let roster_client = RosterClient::new(&config)?;
        Ok(Self {
            config,
            session,
            connector,
            moderation,
            roster_client,
            roster: Roster::default(),
            local_sender: local_sender.into(),
            active: None,
        })
    }

    /// Load (or reload) the conversation list backing the contact panel.
    pub async fn load_roster(&mut self) -> Result<&Roster, ClientError> {
        let token = require_token(self.session.as_ref())?;
        self.roster = self.roster_client.fetch(&token).await?;
        Ok(&self.roster)
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Open a conversation, closing the previously active one first.
    pub async fn select(&mut self, conversation_id: i64) -> Result<&RoomHandle, ClientError> {
        self.close_active().await;
        let handle = room::spawn(
            self.config.clone(),
            self.session.as_ref(),
            self.connector.clone(),
            conversation_id,
            self.local_sender.clone(),
        )?;
        self.active = Some(handle);
        Ok(self.active.as_ref().expect("room handle just stored"))
    }

    pub fn active(&self) -> Option<&RoomHandle> {
        self.active.as_ref()
    }

    /// Close the active conversation, if any. Safe to call more than once.
    pub async fn close_active(&mut self) {
        if let Some(previous) = self.active.take() {
            previous.close().await;
        }
    }

    /// Block the counterpart of a conversation.
    pub async fn block(&self, conversation_id: i64) -> Result<(), ClientError> {
        let token = require_token(self.session.as_ref())?;
        self.moderation.block(conversation_id, &token).await
    }

    /// Report the counterpart of a conversation.
    pub async fn report(&self, conversation_id: i64) -> Result<(), ClientError> {
        let token = require_token(self.session.as_ref())?;
        self.moderation.report(conversation_id, &token).await
    }

    /// Close the conversation on the backend, drop it from the panel, and
    /// tear it down locally when it is the active one.
    pub async fn close_conversation(&mut self, conversation_id: i64) -> Result<(), ClientError> {
        let token = require_token(self.session.as_ref())?;
        self.moderation.close(conversation_id, &token).await?;
        self.roster.remove(conversation_id);
        if self
            .active
            .as_ref()
            .is_some_and(|handle| handle.conversation_id() == conversation_id)
        {
            self.close_active().await;
        }
        Ok(())
    }
}
