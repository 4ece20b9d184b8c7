use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::MarketError;

/// Lifecycle state of a booking.
///
/// ```text
/// pending -> accepted | declined | cancelled
/// accepted -> completed | cancelled
/// ```
/// `completed`, `declined` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Declined,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Accepted,
        BookingStatus::Declined,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Declined => "declined",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Accepted)
                | (Pending, Declined)
                | (Pending, Cancelled)
                | (Accepted, Completed)
                | (Accepted, Cancelled)
        )
    }

    /// Validate a move to `next`, returning the new status.
    pub fn transition_to(self, next: BookingStatus) -> Result<BookingStatus, MarketError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(MarketError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed | BookingStatus::Declined | BookingStatus::Cancelled
        )
    }

    pub fn is_cancellable(self) -> bool {
        self.can_transition_to(BookingStatus::Cancelled)
    }

    /// Only accepted bookings can be paid for.
    pub fn is_payable(self) -> bool {
        self == BookingStatus::Accepted
    }

    /// Only completed bookings can be reviewed.
    pub fn is_reviewable(self) -> bool {
        self == BookingStatus::Completed
    }

    /// Whether a booking in this state holds its slot in the provider's calendar.
    pub fn blocks_calendar(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Accepted)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| MarketError::invalid(format!("unknown booking status {s}")))
    }
}

/// Payment state tracked on the booking itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Paid,
}

impl PaymentState {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Paid => "paid",
        }
    }
}

impl FromStr for PaymentState {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentState::Pending),
            "paid" => Ok(PaymentState::Paid),
            other => Err(MarketError::invalid(format!("unknown payment state {other}"))),
        }
    }
}
