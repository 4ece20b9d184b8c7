use crate::{
    bookings::get_booking,
    db::{from_millis, now, parsed_col, to_millis, uuid_col},
    error::AppError,
    model::{Booking, Payment, PaymentCreate},
};
use marketcore::{
    services::{ChargeOutcome, ChargeRequest},
    PaymentState,
};
use rusqlite::{params, Connection, TransactionBehavior};
use uuid::Uuid;

const LIST_MAX: usize = 100;

/// Check that `client_id` may pay for the booking named in `req`.
pub fn payable_booking(
    conn: &Connection,
    client_id: &Uuid,
    req: &PaymentCreate,
) -> Result<Booking, AppError> {
    if !req.amount.is_finite() || req.amount <= 0.0 {
        return Err(AppError::invalid("amount must be positive"));
    }
    if req.currency.trim().len() != 3 {
        return Err(AppError::invalid("currency must be a three letter code"));
    }
    if req.payment_token.trim().is_empty() {
        return Err(AppError::invalid("payment_token is required"));
    }
    let booking = match get_booking(conn, &req.booking_id)? {
        Some(b) if b.client_id == *client_id && b.status.is_payable() => b,
        _ => return Err(AppError::not_found("accepted booking")),
    };
    if booking.payment_status == PaymentState::Paid {
        return Err(AppError::conflict("booking is already paid"));
    }
    Ok(booking)
}

/// Gateway request for paying `booking`.
pub fn charge_request(booking: &Booking, req: &PaymentCreate) -> ChargeRequest {
    ChargeRequest {
        method: req.payment_method,
        amount: req.amount,
        currency: req.currency.trim().to_ascii_uppercase(),
        token: req.payment_token.clone(),
        description: format!("Artisan booking: {}", booking.service_name),
    }
}

/// Persist an approved charge and mark the booking paid in one transaction.
pub fn record_payment(
    conn: &mut Connection,
    booking: &Booking,
    req: &PaymentCreate,
    outcome: &ChargeOutcome,
) -> Result<Payment, AppError> {
    let ts = now();
    let payment = Payment {
        id: Uuid::new_v4(),
        booking_id: booking.id,
        client_id: booking.client_id,
        artisan_id: booking.artisan_id,
        amount: req.amount,
        payment_method: req.payment_method,
        currency: req.currency.trim().to_ascii_uppercase(),
        status: "completed".into(),
        transaction_id: outcome.transaction_id.clone(),
        created_at: ts,
        updated_at: ts,
    };
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let flipped = tx.execute(
        "UPDATE bookings SET payment_status = 'paid', updated_at = ?2 WHERE id = ?1 AND status = 'accepted' AND payment_status = 'pending'",
        params![booking.id.to_string(), to_millis(ts)],
    )?;
    if flipped == 0 {
        return Err(AppError::conflict("booking is no longer payable"));
    }
    tx.execute(
        "INSERT INTO payments (id, booking_id, client_id, artisan_id, amount, method, currency, status, transaction_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            payment.id.to_string(),
            payment.booking_id.to_string(),
            payment.client_id.to_string(),
            payment.artisan_id.to_string(),
            payment.amount,
            payment.payment_method.as_str(),
            payment.currency,
            payment.status,
            payment.transaction_id,
            to_millis(ts),
        ],
    )?;
    tx.commit()?;
    Ok(payment)
}

fn row_to_payment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Payment> {
    Ok(Payment {
        id: uuid_col(row, 0)?,
        booking_id: uuid_col(row, 1)?,
        client_id: uuid_col(row, 2)?,
        artisan_id: uuid_col(row, 3)?,
        amount: row.get(4)?,
        payment_method: parsed_col(row, 5)?,
        currency: row.get(6)?,
        status: row.get(7)?,
        transaction_id: row.get(8)?,
        created_at: from_millis(row.get(9)?),
        updated_at: from_millis(row.get(10)?),
    })
}

/// Payments made by `client_id`, newest first.
pub fn list_payments(
    conn: &Connection,
    client_id: &Uuid,
    status: Option<&str>,
) -> Result<Vec<Payment>, AppError> {
    let mut stmt = conn.prepare(
        "SELECT id, booking_id, client_id, artisan_id, amount, method, currency, status, transaction_id, created_at, updated_at FROM payments WHERE client_id = ?1 AND (?2 IS NULL OR status = ?2) ORDER BY created_at DESC, rowid DESC LIMIT ?3",
    )?;
    let rows = stmt.query_map(
        params![client_id.to_string(), status, LIST_MAX as i64],
        row_to_payment,
    )?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}
