use reqwest::StatusCode;
use tracing::debug;

use cupido_types::models::Message;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// One-shot history fetch for a conversation. No retries: a failure surfaces
/// to the caller and the room shows it as an error state.
#[derive(Clone)]
pub struct HistoryClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl HistoryClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: config.http_client()?,
            config: config.clone(),
        })
    }

    /// Fetch the full ordered message history for one conversation.
    pub async fn fetch(&self, conversation_id: i64, token: &str) -> Result<Vec<Message>, ClientError> {
        let url = self
            .config
            .api_url(&format!("/api/v1/chat/{}/mensajes/", conversation_id));
        let response = self.http.get(&url).bearer_auth(token).send().await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Auth),
            status if !status.is_success() => Err(ClientError::Network {
                status: status.as_u16(),
            }),
            _ => {
                let history: Vec<Message> = response.json().await?;
                debug!("history loaded for chat {} ({} messages)", conversation_id, history.len());
                Ok(history)
            }
        }
    }
}
