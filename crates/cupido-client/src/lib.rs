//! Client core for the Cupido chat feature: history fetch over HTTP, live
//! updates over a per-conversation WebSocket, and a reconciling timeline
//! that merges the two into one ordered sequence for the UI.

pub mod channel;
pub mod config;
pub mod error;
pub mod history;
pub mod manager;
pub mod moderation;
pub mod room;
pub mod roster;
pub mod session;
pub mod timeline;

pub use config::ClientConfig;
pub use error::ClientError;
