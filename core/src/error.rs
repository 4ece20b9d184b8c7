use crate::booking::BookingStatus;

/// Errors surfaced by marketplace operations.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    /// Referenced entity is absent or not owned by the caller.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// The request clashes with existing state (overlapping booking, duplicate review).
    #[error("{0}")]
    Conflict(&'static str),
    #[error("booking cannot move from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    /// Input failed validation.
    #[error("{0}")]
    Invalid(String),
    #[error("payment declined: {0}")]
    PaymentDeclined(String),
    /// A collaborator (store, gateway, mailer) failed.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl MarketError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}
