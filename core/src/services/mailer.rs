use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::info;

use crate::live::iso8601;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    pub fn registration(to: &str, name: &str, frontend_url: &str) -> Self {
        Self {
            to: to.into(),
            subject: "Welcome to Artisan Booking System".into(),
            body: format!(
                "Hello {name},\n\nyour account is ready. Sign in at {frontend_url} to find an artisan.\n"
            ),
        }
    }

    pub fn booking_confirmation(
        to: &str,
        name: &str,
        service_name: &str,
        artisan_name: &str,
        date: OffsetDateTime,
        status: &str,
    ) -> Self {
        Self {
            to: to.into(),
            subject: format!("Booking received: {service_name}"),
            body: format!(
                "Hello {name},\n\nwe received your booking for {service_name} with {artisan_name} on {}.\nCurrent status: {status}.\n",
                iso8601(date)
            ),
        }
    }
}

/// Outbound email delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> anyhow::Result<()>;
}

/// Mailer that only records outgoing mail in the log.
#[derive(Debug, Clone)]
pub struct LogMailer {
    pub from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> anyhow::Result<()> {
        info!(from = %self.from, to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn confirmation_mentions_booking() {
        let email = Email::booking_confirmation(
            "ada@example.com",
            "Ada",
            "Fix sink",
            "Bola",
            datetime!(2024-05-01 10:00 UTC),
            "pending",
        );
        assert_eq!(email.subject, "Booking received: Fix sink");
        assert!(email.body.contains("Bola"));
        assert!(email.body.contains("2024-05-01T10:00:00Z"));
        assert!(email.body.contains("pending"));
    }

    #[tokio::test]
    async fn log_mailer_accepts() {
        let mailer = LogMailer::new("noreply@example.com");
        let email = Email::registration("ada@example.com", "Ada", "http://localhost:3000");
        mailer.send(email).await.unwrap();
    }
}
