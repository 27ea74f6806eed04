use chrono::Utc;
use tracing::debug;

use cupido_types::models::{DeliveryStatus, Message};

/// Ordered, de-duplicated message sequence for one conversation.
///
/// Ordering is by timestamp first and arrival order second, so messages with
/// equal timestamps keep the order they were observed in. Replacing an entry
/// (same id) keeps its position and the sequence length.
///
/// The history fetch and the live channel race freely: a live message may
/// land before the history response, in which case the history merge skips
/// its id instead of duplicating it.
#[derive(Debug)]
pub struct Timeline {
    entries: Vec<Message>,
    /// Provisional ids for optimistic local entries count down from -1;
    /// server ids are positive, so the ranges never collide.
    next_provisional_id: i64,
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_provisional_id: -1,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Message> {
        self.position_of(id).map(|pos| &self.entries[pos])
    }

    /// Seed the timeline with the fetched history. Live arrivals may already
    /// be present; their entries win and are left untouched.
    pub fn append_history(&mut self, messages: Vec<Message>) {
        for message in messages {
            if self.position_of(message.id).is_some() {
                debug!("history message {} already live, skipping", message.id);
                continue;
            }
            self.insert_sorted(message);
        }
    }

    /// Apply one live arrival.
    ///
    /// An id match replaces the existing entry in place (status/content
    /// update, or the echo of a send the server confirmed under the same
    /// id). An unknown outgoing message resolves the oldest pending
    /// optimistic entry with identical content, adopting the server id.
    /// Everything else is inserted in timestamp order.
    pub fn append_live(&mut self, message: Message) {
        if let Some(pos) = self.position_of(message.id) {
            self.entries[pos] = message;
            return;
        }
        if message.outgoing {
            if let Some(pos) = self.pending_echo_position(&message.content) {
                debug!("live echo {} resolves provisional entry {}", message.id, self.entries[pos].id);
                self.entries[pos] = message;
                return;
            }
        }
        self.insert_sorted(message);
    }

    /// Add an optimistic local entry and return its provisional id.
    pub fn push_local(&mut self, content: String, sender: String, status: DeliveryStatus) -> i64 {
        let id = self.next_provisional_id;
        self.next_provisional_id -= 1;
        self.insert_sorted(Message {
            id,
            content,
            sender,
            outgoing: true,
            sent_at: Utc::now(),
            status,
        });
        id
    }

    /// Flip an entry's delivery status. Returns false when the id is unknown.
    pub fn set_status(&mut self, id: i64, status: DeliveryStatus) -> bool {
        match self.position_of(id) {
            Some(pos) => {
                self.entries[pos].status = status;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position_of(&self, id: i64) -> Option<usize> {
        self.entries.iter().position(|m| m.id == id)
    }

    fn pending_echo_position(&self, content: &str) -> Option<usize> {
        self.entries.iter().position(|m| {
            m.id < 0 && m.outgoing && m.status == DeliveryStatus::Sending && m.content == content
        })
    }

    fn insert_sorted(&mut self, message: Message) {
        let at = self
            .entries
            .partition_point(|m| m.sent_at <= message.sent_at);
        self.entries.insert(at, message);
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}
