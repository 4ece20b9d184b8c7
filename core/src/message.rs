use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A persisted direct message between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Message {
    /// The party other than `me`.
    pub fn counterpart(&self, me: &Uuid) -> Uuid {
        if self.sender_id == *me {
            self.recipient_id
        } else {
            self.sender_id
        }
    }

    /// Whether this message is still waiting to be read by `me`.
    pub fn is_unread_for(&self, me: &Uuid) -> bool {
        self.recipient_id == *me && !self.read
    }
}
