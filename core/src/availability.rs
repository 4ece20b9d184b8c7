use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{booking::BookingStatus, error::MarketError};

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl Interval {
    /// Build an interval of `hours` starting at `start`.
    pub fn from_hours(start: OffsetDateTime, hours: f64) -> Result<Self, MarketError> {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(MarketError::invalid("duration must be a positive number of hours"));
        }
        let span = Duration::checked_seconds_f64(hours * 3600.0)
            .ok_or_else(|| MarketError::invalid("duration out of range"))?;
        let end = start
            .checked_add(span)
            .ok_or_else(|| MarketError::invalid("duration out of range"))?;
        Ok(Self { start, end })
    }
}

/// A booking's claim on a provider's calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingInterval {
    pub booking_id: Uuid,
    pub provider_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    pub duration_hours: f64,
    pub status: BookingStatus,
}

impl BookingInterval {
    pub fn interval(&self) -> Result<Interval, MarketError> {
        Interval::from_hours(self.start, self.duration_hours)
    }
}

/// Overlap test between a candidate window and an existing one.
///
/// `existing.start < end && existing.end > start` covers partial overlap;
/// `start <= existing.start < end` covers a candidate that contains the
/// existing start.
pub fn overlaps(candidate: &Interval, existing: &Interval) -> bool {
    (existing.start < candidate.end && existing.end > candidate.start)
        || (candidate.start <= existing.start && existing.start < candidate.end)
}

/// Return the first committed interval that clashes with `candidate`.
///
/// Only intervals that hold their slot (pending or accepted) are considered.
/// Intervals with a nonsensical duration are treated as point bookings.
pub fn first_conflict<'a, I>(candidate: &Interval, existing: I) -> Option<&'a BookingInterval>
where
    I: IntoIterator<Item = &'a BookingInterval>,
{
    existing.into_iter().find(|b| {
        if !b.status.blocks_calendar() {
            return false;
        }
        let other = b.interval().unwrap_or(Interval {
            start: b.start,
            end: b.start,
        });
        overlaps(candidate, &other)
    })
}

/// Available when no pending or accepted interval overlaps `candidate`.
pub fn is_available<'a, I>(candidate: &Interval, existing: I) -> bool
where
    I: IntoIterator<Item = &'a BookingInterval>,
{
    first_conflict(candidate, existing).is_none()
}
