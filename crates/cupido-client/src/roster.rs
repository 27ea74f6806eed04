use reqwest::StatusCode;
use tracing::debug;

use cupido_types::models::Conversation;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Fetches the conversation list backing the contact panel.
#[derive(Clone)]
pub struct RosterClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl RosterClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: config.http_client()?,
            config: config.clone(),
        })
    }

    pub async fn fetch(&self, token: &str) -> Result<Roster, ClientError> {
        let url = self.config.api_url("/api/v1/chat/");
        let response = self.http.get(&url).bearer_auth(token).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Auth),
            status if !status.is_success() => Err(ClientError::Network {
                status: status.as_u16(),
            }),
            _ => {
                let conversations: Vec<Conversation> = response.json().await?;
                debug!("roster loaded ({} conversations)", conversations.len());
                Ok(Roster::new(conversations))
            }
        }
    }
}

/// In-memory conversation list with the panel's search behavior.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    conversations: Vec<Conversation>,
}

impl Roster {
    pub fn new(conversations: Vec<Conversation>) -> Self {
        Self { conversations }
    }

    pub fn all(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, id: i64) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Case-insensitive contains-match on the counterpart name, the same
    /// filter the search box applies.
    pub fn filter(&self, query: &str) -> Vec<&Conversation> {
        let needle = query.to_lowercase();
        self.conversations
            .iter()
            .filter(|c| c.contact_name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Drop a conversation from the panel after it has been closed.
    pub fn remove(&mut self, id: i64) {
        self.conversations.retain(|c| c.id != id);
    }
}
