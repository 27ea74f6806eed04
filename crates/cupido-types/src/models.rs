use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery lifecycle of a single message, as rendered next to the bubble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// One chat message. The JSON field names are the backend's Spanish ones;
/// they are identical in the history response and in live channel frames.
///
/// Server-assigned ids are positive. Negative ids mark provisional entries
/// created locally before the server has confirmed them, so the two ranges
/// never collide inside one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    #[serde(rename = "contenido")]
    pub content: String,
    #[serde(rename = "remitente_email")]
    pub sender: String,
    #[serde(rename = "es_mio")]
    pub outgoing: bool,
    #[serde(rename = "fecha", with = "lenient_utc")]
    pub sent_at: DateTime<Utc>,
    /// Older backend rows omit the field; an omitted status means sent.
    #[serde(rename = "estado", default = "default_status")]
    pub status: DeliveryStatus,
}

fn default_status() -> DeliveryStatus {
    DeliveryStatus::Sent
}

/// One row of the contact list panel. Backend-owned: the client reads and
/// reflects it, never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    #[serde(rename = "nombreContacto")]
    pub contact_name: String,
    #[serde(rename = "fotoContacto")]
    pub contact_photo: String,
    #[serde(rename = "ultimoMensaje")]
    pub last_message: String,
    #[serde(rename = "horaUltimoMensaje")]
    pub last_message_at: String,
    #[serde(rename = "notificaciones")]
    pub unread: u32,
}

/// The backend emits timestamps either as RFC 3339 or as naive
/// "YYYY-MM-DDTHH:MM:SS" strings without an offset. Naive values are UTC.
mod lenient_utc {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<DateTime<Utc>>()
            .or_else(|_| {
                NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f").map(|ndt| ndt.and_utc())
            })
            .map_err(de::Error::custom)
    }
}
