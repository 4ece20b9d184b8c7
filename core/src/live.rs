use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::message::Message;

/// What a booking or payment notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingRequest,
    BookingAccepted,
    BookingDeclined,
    BookingCompleted,
    BookingCancelled,
    PaymentReceived,
    ReviewReceived,
}

/// Payload pushed over a live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    NewMessage {
        message_id: Uuid,
        sender_id: Uuid,
        recipient_id: Uuid,
        content: String,
        timestamp: String,
    },
    Ack {
        message: String,
        your_data: Value,
    },
    Notification {
        kind: NotificationKind,
        message: String,
        related_entity_id: Option<Uuid>,
    },
}

impl LiveEvent {
    pub fn new_message(msg: &Message) -> Self {
        LiveEvent::NewMessage {
            message_id: msg.id,
            sender_id: msg.sender_id,
            recipient_id: msg.recipient_id,
            content: msg.content.clone(),
            timestamp: iso8601(msg.created_at),
        }
    }

    pub fn ack(your_data: Value) -> Self {
        LiveEvent::Ack {
            message: "Received your message".into(),
            your_data,
        }
    }

    pub fn notification(
        kind: NotificationKind,
        message: impl Into<String>,
        related_entity_id: Option<Uuid>,
    ) -> Self {
        LiveEvent::Notification {
            kind,
            message: message.into(),
            related_entity_id,
        }
    }
}

/// RFC 3339 rendering used on the wire.
pub fn iso8601(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn new_message_shape() {
        let ts = datetime!(2024-05-01 10:00:00 UTC);
        let msg = Message {
            id: Uuid::nil(),
            sender_id: Uuid::nil(),
            recipient_id: Uuid::nil(),
            content: "hello".into(),
            read: false,
            created_at: ts,
            updated_at: ts,
        };
        let v = serde_json::to_value(LiveEvent::new_message(&msg)).unwrap();
        assert_eq!(v["type"], "new_message");
        assert_eq!(v["content"], "hello");
        assert_eq!(v["timestamp"], "2024-05-01T10:00:00Z");
        assert!(v["message_id"].is_string());
    }

    #[test]
    fn notification_shape() {
        let v = serde_json::to_value(LiveEvent::notification(
            NotificationKind::BookingAccepted,
            "accepted",
            None,
        ))
        .unwrap();
        assert_eq!(v["type"], "notification");
        assert_eq!(v["kind"], "booking_accepted");
    }
}
