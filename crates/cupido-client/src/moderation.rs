use reqwest::{Method, StatusCode};
use tracing::info;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Fire-and-forget conversation actions behind the header menu. Each issues
/// one request; outcomes are logged and, apart from `clear_history`, never
/// touch local state.
#[derive(Clone)]
pub struct ModerationClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl ModerationClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: config.http_client()?,
            config: config.clone(),
        })
    }

    /// Block the counterpart of a conversation.
    pub async fn block(&self, conversation_id: i64, token: &str) -> Result<(), ClientError> {
        self.request(Method::POST, conversation_id, "bloquear/", token).await?;
        info!("blocked counterpart of chat {}", conversation_id);
        Ok(())
    }

    /// Report the counterpart of a conversation.
    pub async fn report(&self, conversation_id: i64, token: &str) -> Result<(), ClientError> {
        self.request(Method::POST, conversation_id, "reportar/", token).await?;
        info!("reported counterpart of chat {}", conversation_id);
        Ok(())
    }

    /// Close the conversation on the backend side.
    pub async fn close(&self, conversation_id: i64, token: &str) -> Result<(), ClientError> {
        self.request(Method::POST, conversation_id, "cerrar/", token).await?;
        info!("closed chat {}", conversation_id);
        Ok(())
    }

    /// Delete all messages of a conversation. The caller empties the local
    /// timeline only after this succeeds.
    pub async fn clear_history(&self, conversation_id: i64, token: &str) -> Result<(), ClientError> {
        self.request(Method::DELETE, conversation_id, "mensajes/", token).await?;
        info!("cleared history of chat {}", conversation_id);
        Ok(())
    }

    async fn request(
        &self,
        method: Method,
        conversation_id: i64,
        action: &str,
        token: &str,
    ) -> Result<(), ClientError> {
        let url = self
            .config
            .api_url(&format!("/api/v1/chat/{}/{}", conversation_id, action));
        let response = self
            .http
            .request(method, &url)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Auth),
            status if !status.is_success() => Err(ClientError::Network {
                status: status.as_u16(),
            }),
            _ => Ok(()),
        }
    }
}
