use std::sync::RwLock;

use crate::error::ClientError;

/// Source of the bearer credential. Token acquisition and refresh live with
/// the host application; the chat core only reads the current value.
pub trait SessionStore: Send + Sync {
    /// The raw stored token, or `None` when there is no active session.
    fn token(&self) -> Option<String>;
}

/// The web client persists the token JSON-encoded, so the stored value may
/// carry literal quote characters. Strip them before use.
pub fn clean_token(raw: &str) -> String {
    raw.replace('"', "")
}

/// Fetch-and-clean helper used by everything that needs a credential.
pub fn require_token(store: &dyn SessionStore) -> Result<String, ClientError> {
    let cleaned = store.token().map(|raw| clean_token(&raw));
    match cleaned {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(ClientError::Auth),
    }
}

/// In-memory session store, for tests and embedders that hold the token
/// themselves.
#[derive(Default)]
pub struct MemorySession {
    token: RwLock<Option<String>>,
}

impl MemorySession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }

    pub fn set(&self, token: Option<String>) {
        *self.token.write().expect("session lock poisoned") = token;
    }
}

impl SessionStore for MemorySession {
    fn token(&self) -> Option<String> {
        self.token.read().expect("session lock poisoned").clone()
    }
}
