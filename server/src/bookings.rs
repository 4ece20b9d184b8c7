use crate::{
    db::{from_millis, now, parsed_col, to_millis, uuid_col},
    error::AppError,
    model::{AvailabilityReport, Booking, BookingCreate},
};
use marketcore::{
    availability::{first_conflict, Interval},
    BookingInterval, BookingStatus, PaymentState,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

const LIST_MAX: usize = 100;

const BOOKING_COLS: &str = "id, client_id, artisan_id, service_name, service_description, start_at, duration_hours, location, status, agreed_price, payment_status, created_at, updated_at";

fn row_to_booking(row: &rusqlite::Row<'_>) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: uuid_col(row, 0)?,
        client_id: uuid_col(row, 1)?,
        artisan_id: uuid_col(row, 2)?,
        service_name: row.get(3)?,
        service_description: row.get(4)?,
        booking_date: from_millis(row.get(5)?),
        duration_hours: row.get(6)?,
        location: row.get(7)?,
        status: parsed_col(row, 8)?,
        agreed_price: row.get(9)?,
        payment_status: parsed_col(row, 10)?,
        created_at: from_millis(row.get(11)?),
        updated_at: from_millis(row.get(12)?),
    })
}

/// Intervals of `artisan_id` that may clash with `candidate`.
fn calendar(
    conn: &Connection,
    artisan_id: &Uuid,
    candidate: &Interval,
) -> Result<Vec<BookingInterval>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, artisan_id, start_at, duration_hours, status FROM bookings WHERE artisan_id = ?1 AND status IN ('pending', 'accepted') AND start_at < ?2 AND end_at > ?3 ORDER BY start_at",
    )?;
    let rows = stmt.query_map(
        params![
            artisan_id.to_string(),
            to_millis(candidate.end),
            to_millis(candidate.start)
        ],
        |row| {
            Ok(BookingInterval {
                booking_id: uuid_col(row, 0)?,
                provider_id: uuid_col(row, 1)?,
                start: from_millis(row.get(2)?),
                duration_hours: row.get(3)?,
                status: parsed_col(row, 4)?,
            })
        },
    )?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

fn artisan_exists(conn: &Connection, artisan_id: &Uuid) -> Result<bool, AppError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM artisans WHERE id = ?1",
            [artisan_id.to_string()],
            |_| Ok(()),
        )
        .optional()?
        .is_some())
}

/// Whether `artisan_id` is free for `hours` starting at `start`.
pub fn check_availability(
    conn: &Connection,
    artisan_id: &Uuid,
    start: OffsetDateTime,
    hours: f64,
) -> Result<AvailabilityReport, AppError> {
    if !artisan_exists(conn, artisan_id)? {
        return Err(AppError::not_found("artisan"));
    }
    let candidate = Interval::from_hours(start, hours)?;
    let existing = calendar(conn, artisan_id, &candidate)?;
    let conflict = first_conflict(&candidate, &existing);
    Ok(AvailabilityReport {
        available: conflict.is_none(),
        conflicting_booking_id: conflict.map(|b| b.booking_id),
    })
}

/// Create a pending booking for `client_id`.
///
/// The availability check and the insert share one write-locking
/// transaction, so two requests for the same window cannot both succeed.
pub fn create_booking(
    conn: &mut Connection,
    client_id: &Uuid,
    req: &BookingCreate,
) -> Result<Booking, AppError> {
    if req.service_name.trim().is_empty() {
        return Err(AppError::invalid("service_name is required"));
    }
    if req.location.trim().is_empty() {
        return Err(AppError::invalid("location is required"));
    }
    if let Some(price) = req.agreed_price {
        if !price.is_finite() || price < 0.0 {
            return Err(AppError::invalid("agreed_price must not be negative"));
        }
    }
    let start = from_millis(to_millis(req.booking_date));
    let candidate = Interval::from_hours(start, req.duration_hours)?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if !artisan_exists(&tx, &req.artisan_id)? {
        return Err(AppError::not_found("artisan"));
    }
    let existing = calendar(&tx, &req.artisan_id, &candidate)?;
    if let Some(clash) = first_conflict(&candidate, &existing) {
        info!(artisan = %req.artisan_id, clash = %clash.booking_id, "booking window taken");
        return Err(AppError::conflict(
            "artisan is not available at the requested time",
        ));
    }
    let ts = now();
    let booking = Booking {
        id: Uuid::new_v4(),
        client_id: *client_id,
        artisan_id: req.artisan_id,
        service_name: req.service_name.trim().to_string(),
        service_description: req.service_description.clone(),
        booking_date: candidate.start,
        duration_hours: req.duration_hours,
        location: req.location.clone(),
        status: BookingStatus::Pending,
        agreed_price: req.agreed_price,
        payment_status: PaymentState::Pending,
        created_at: ts,
        updated_at: ts,
    };
    tx.execute(
        "INSERT INTO bookings (id, client_id, artisan_id, service_name, service_description, start_at, end_at, duration_hours, location, status, agreed_price, payment_status, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
        params![
            booking.id.to_string(),
            booking.client_id.to_string(),
            booking.artisan_id.to_string(),
            booking.service_name,
            booking.service_description,
            to_millis(candidate.start),
            to_millis(candidate.end),
            booking.duration_hours,
            booking.location,
            booking.status.as_str(),
            booking.agreed_price,
            booking.payment_status.as_str(),
            to_millis(ts),
        ],
    )?;
    tx.commit()?;
    Ok(booking)
}

pub fn get_booking(conn: &Connection, id: &Uuid) -> Result<Option<Booking>, AppError> {
    let sql = format!("SELECT {BOOKING_COLS} FROM bookings WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.to_string()], row_to_booking)
        .optional()?)
}

/// Fetch a booking the caller is a party to; anything else reads as absent.
pub fn get_for_party(conn: &Connection, user_id: &Uuid, id: &Uuid) -> Result<Booking, AppError> {
    match get_booking(conn, id)? {
        Some(b) if b.client_id == *user_id || b.artisan_id == *user_id => Ok(b),
        _ => Err(AppError::not_found("booking")),
    }
}

fn list_where(
    conn: &Connection,
    column: &str,
    user_id: &Uuid,
    status: Option<BookingStatus>,
) -> Result<Vec<Booking>, AppError> {
    let sql = format!(
        "SELECT {BOOKING_COLS} FROM bookings WHERE {column} = ?1 AND (?2 IS NULL OR status = ?2) ORDER BY start_at, rowid LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            user_id.to_string(),
            status.map(|s| s.as_str()),
            LIST_MAX as i64
        ],
        row_to_booking,
    )?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn list_for_client(
    conn: &Connection,
    client_id: &Uuid,
    status: Option<BookingStatus>,
) -> Result<Vec<Booking>, AppError> {
    list_where(conn, "client_id", client_id, status)
}

pub fn list_for_artisan(
    conn: &Connection,
    artisan_id: &Uuid,
    status: Option<BookingStatus>,
) -> Result<Vec<Booking>, AppError> {
    list_where(conn, "artisan_id", artisan_id, status)
}

/// Pending or accepted bookings starting at or after `from`, soonest first.
pub fn upcoming_for_client(
    conn: &Connection,
    client_id: &Uuid,
    from: OffsetDateTime,
    limit: usize,
) -> Result<Vec<Booking>, AppError> {
    let sql = format!(
        "SELECT {BOOKING_COLS} FROM bookings WHERE client_id = ?1 AND status IN ('pending', 'accepted') AND start_at >= ?2 ORDER BY start_at, rowid LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![client_id.to_string(), to_millis(from), limit as i64],
        row_to_booking,
    )?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Completed bookings, most recent first.
pub fn completed_for_client(
    conn: &Connection,
    client_id: &Uuid,
    limit: usize,
) -> Result<Vec<Booking>, AppError> {
    let sql = format!(
        "SELECT {BOOKING_COLS} FROM bookings WHERE client_id = ?1 AND status = 'completed' ORDER BY start_at DESC, rowid DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![client_id.to_string(), limit as i64], row_to_booking)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Apply `next` only if the stored status still matches what was read.
fn store_status(conn: &Connection, booking: &mut Booking, next: BookingStatus) -> Result<(), AppError> {
    let current = booking.status;
    let updated = current.transition_to(next)?;
    let ts = now();
    let changed = conn.execute(
        "UPDATE bookings SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = ?4",
        params![
            booking.id.to_string(),
            updated.as_str(),
            to_millis(ts),
            current.as_str()
        ],
    )?;
    if changed == 0 {
        return Err(AppError::conflict("booking status changed concurrently"));
    }
    booking.status = updated;
    booking.updated_at = ts;
    Ok(())
}

/// Cancel a booking owned by `client_id`.
pub fn cancel_booking(conn: &Connection, client_id: &Uuid, id: &Uuid) -> Result<Booking, AppError> {
    let mut booking = match get_booking(conn, id)? {
        Some(b) if b.client_id == *client_id => b,
        _ => return Err(AppError::not_found("booking")),
    };
    store_status(conn, &mut booking, BookingStatus::Cancelled)?;
    Ok(booking)
}

/// Accept, decline or complete a booking assigned to `artisan_id`.
pub fn update_status_by_artisan(
    conn: &Connection,
    artisan_id: &Uuid,
    id: &Uuid,
    next: BookingStatus,
) -> Result<Booking, AppError> {
    if !matches!(
        next,
        BookingStatus::Accepted | BookingStatus::Declined | BookingStatus::Completed
    ) {
        return Err(AppError::invalid(format!(
            "artisans cannot set a booking to {next}"
        )));
    }
    let mut booking = match get_booking(conn, id)? {
        Some(b) if b.artisan_id == *artisan_id => b,
        _ => return Err(AppError::not_found("booking")),
    };
    store_status(conn, &mut booking, next)?;
    Ok(booking)
}
