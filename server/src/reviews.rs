use crate::{
    bookings::get_booking,
    db::{from_millis, now, to_millis, uuid_col},
    error::{is_constraint_violation, AppError},
    model::{Review, ReviewCreate, ReviewUpdate},
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// How long after creation a review may still be edited.
pub const EDIT_WINDOW: Duration = Duration::days(30);

const REVIEW_COLS: &str =
    "id, booking_id, client_id, artisan_id, rating, comment, created_at, updated_at";

fn check_rating(rating: u8) -> Result<(), AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::invalid("rating must be between 1 and 5"));
    }
    Ok(())
}

fn row_to_review(row: &rusqlite::Row<'_>) -> rusqlite::Result<Review> {
    Ok(Review {
        id: uuid_col(row, 0)?,
        booking_id: uuid_col(row, 1)?,
        client_id: uuid_col(row, 2)?,
        artisan_id: uuid_col(row, 3)?,
        rating: row.get(4)?,
        comment: row.get(5)?,
        created_at: from_millis(row.get(6)?),
        updated_at: from_millis(row.get(7)?),
    })
}

/// Recompute the average rating and review count shown on an artisan profile.
fn refresh_artisan_rating(conn: &Connection, artisan_id: &Uuid) -> Result<(), AppError> {
    conn.execute(
        "UPDATE artisans SET rating = (SELECT COALESCE(AVG(rating), 0) FROM reviews WHERE artisan_id = ?1), review_count = (SELECT COUNT(*) FROM reviews WHERE artisan_id = ?1) WHERE id = ?1",
        [artisan_id.to_string()],
    )?;
    Ok(())
}

pub fn get_review(conn: &Connection, id: &Uuid) -> Result<Option<Review>, AppError> {
    let sql = format!("SELECT {REVIEW_COLS} FROM reviews WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.to_string()], row_to_review)
        .optional()?)
}

fn owned_review(conn: &Connection, client_id: &Uuid, id: &Uuid) -> Result<Review, AppError> {
    match get_review(conn, id)? {
        Some(r) if r.client_id == *client_id => Ok(r),
        _ => Err(AppError::not_found("review")),
    }
}

/// Review a completed booking. Each booking takes at most one review.
pub fn create_review(
    conn: &mut Connection,
    client_id: &Uuid,
    req: &ReviewCreate,
) -> Result<Review, AppError> {
    check_rating(req.rating)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let booking = match get_booking(&tx, &req.booking_id)? {
        Some(b) if b.client_id == *client_id && b.status.is_reviewable() => b,
        _ => return Err(AppError::not_found("completed booking")),
    };
    let ts = now();
    let review = Review {
        id: Uuid::new_v4(),
        booking_id: booking.id,
        client_id: *client_id,
        artisan_id: booking.artisan_id,
        rating: req.rating,
        comment: req.comment.clone(),
        created_at: ts,
        updated_at: ts,
    };
    tx.execute(
        "INSERT INTO reviews (id, booking_id, client_id, artisan_id, rating, comment, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            review.id.to_string(),
            review.booking_id.to_string(),
            review.client_id.to_string(),
            review.artisan_id.to_string(),
            review.rating,
            review.comment,
            to_millis(ts),
        ],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            AppError::conflict("booking has already been reviewed")
        } else {
            e.into()
        }
    })?;
    refresh_artisan_rating(&tx, &review.artisan_id)?;
    tx.commit()?;
    Ok(review)
}

pub fn update_review(
    conn: &mut Connection,
    client_id: &Uuid,
    id: &Uuid,
    update: &ReviewUpdate,
) -> Result<Review, AppError> {
    update_review_at(conn, client_id, id, update, now())
}

fn update_review_at(
    conn: &mut Connection,
    client_id: &Uuid,
    id: &Uuid,
    update: &ReviewUpdate,
    at: OffsetDateTime,
) -> Result<Review, AppError> {
    if let Some(rating) = update.rating {
        check_rating(rating)?;
    }
    let tx = conn.transaction()?;
    let mut review = owned_review(&tx, client_id, id)?;
    if at - review.created_at > EDIT_WINDOW {
        return Err(AppError::invalid(
            "reviews can only be edited within 30 days",
        ));
    }
    if let Some(rating) = update.rating {
        review.rating = rating;
    }
    if let Some(comment) = &update.comment {
        review.comment = comment.clone();
    }
    review.updated_at = at;
    tx.execute(
        "UPDATE reviews SET rating = ?2, comment = ?3, updated_at = ?4 WHERE id = ?1",
        params![
            id.to_string(),
            review.rating,
            review.comment,
            to_millis(at)
        ],
    )?;
    refresh_artisan_rating(&tx, &review.artisan_id)?;
    tx.commit()?;
    Ok(review)
}

pub fn delete_review(conn: &mut Connection, client_id: &Uuid, id: &Uuid) -> Result<(), AppError> {
    let tx = conn.transaction()?;
    let review = owned_review(&tx, client_id, id)?;
    tx.execute("DELETE FROM reviews WHERE id = ?1", [id.to_string()])?;
    refresh_artisan_rating(&tx, &review.artisan_id)?;
    tx.commit()?;
    Ok(())
}

/// Reviews left for an artisan, newest first.
pub fn list_for_artisan(conn: &Connection, artisan_id: &Uuid) -> Result<Vec<Review>, AppError> {
    let sql = format!(
        "SELECT {REVIEW_COLS} FROM reviews WHERE artisan_id = ?1 ORDER BY created_at DESC, rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([artisan_id.to_string()], row_to_review)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        accounts::{self, fixtures},
        bookings::fixtures::booking_in,
        db::init_db,
    };
    use axum::http::StatusCode;
    use marketcore::BookingStatus;

    fn setup() -> (Connection, Uuid, Uuid) {
        let conn = init_db(":memory:").unwrap();
        let client = fixtures::client(&conn, "Ada").id;
        let artisan = fixtures::artisan(&conn, "Bola", "Plumber", &[]).id;
        (conn, client, artisan)
    }

    fn review(booking_id: Uuid, rating: u8) -> ReviewCreate {
        ReviewCreate {
            booking_id,
            rating,
            comment: "Great work".into(),
        }
    }

    #[test]
    fn only_completed_bookings_take_reviews() {
        let (mut conn, client, artisan) = setup();
        let b = booking_in(&mut conn, client, artisan, BookingStatus::Accepted);
        let err = create_review(&mut conn, &client, &review(b.id, 5)).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn second_review_conflicts() {
        let (mut conn, client, artisan) = setup();
        let b = booking_in(&mut conn, client, artisan, BookingStatus::Completed);
        create_review(&mut conn, &client, &review(b.id, 4)).unwrap();
        let err = create_review(&mut conn, &client, &review(b.id, 2)).unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(list_for_artisan(&conn, &artisan).unwrap().len(), 1);
    }

    #[test]
    fn rating_bounds() {
        let (mut conn, client, artisan) = setup();
        let b = booking_in(&mut conn, client, artisan, BookingStatus::Completed);
        for bad in [0, 6] {
            let err = create_review(&mut conn, &client, &review(b.id, bad)).unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn artisan_rating_tracks_reviews() {
        let (mut conn, client, artisan) = setup();
        let first = booking_in(&mut conn, client, artisan, BookingStatus::Completed);
        let r1 = create_review(&mut conn, &client, &review(first.id, 5)).unwrap();
        // second booking later the same day so the windows do not clash
        let mut req = crate::bookings::fixtures::request(
            artisan,
            time::macros::datetime!(2030-05-01 14:00 UTC),
            1.0,
        );
        req.service_name = "Fix tap".into();
        let second = crate::bookings::create_booking(&mut conn, &client, &req).unwrap();
        crate::bookings::update_status_by_artisan(&conn, &artisan, &second.id, BookingStatus::Accepted)
            .unwrap();
        crate::bookings::update_status_by_artisan(&conn, &artisan, &second.id, BookingStatus::Completed)
            .unwrap();
        create_review(&mut conn, &client, &review(second.id, 2)).unwrap();

        let profile = accounts::get_artisan(&conn, &artisan).unwrap().unwrap();
        assert_eq!(profile.review_count, 2);
        assert!((profile.rating - 3.5).abs() < f64::EPSILON);

        update_review(
            &mut conn,
            &client,
            &r1.id,
            &ReviewUpdate {
                rating: Some(3),
                comment: None,
            },
        )
        .unwrap();
        let profile = accounts::get_artisan(&conn, &artisan).unwrap().unwrap();
        assert!((profile.rating - 2.5).abs() < f64::EPSILON);

        delete_review(&mut conn, &client, &r1.id).unwrap();
        let profile = accounts::get_artisan(&conn, &artisan).unwrap().unwrap();
        assert_eq!(profile.review_count, 1);
        assert!((profile.rating - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn edits_close_after_thirty_days() {
        let (mut conn, client, artisan) = setup();
        let b = booking_in(&mut conn, client, artisan, BookingStatus::Completed);
        let r = create_review(&mut conn, &client, &review(b.id, 4)).unwrap();
        let late = r.created_at + Duration::days(31);
        let err = update_review_at(
            &mut conn,
            &client,
            &r.id,
            &ReviewUpdate {
                comment: Some("changed".into()),
                ..Default::default()
            },
            late,
        )
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(get_review(&conn, &r.id).unwrap().unwrap().comment, "Great work");
    }

    #[test]
    fn only_author_can_delete() {
        let (mut conn, client, artisan) = setup();
        let b = booking_in(&mut conn, client, artisan, BookingStatus::Completed);
        let r = create_review(&mut conn, &client, &review(b.id, 4)).unwrap();
        let err = delete_review(&mut conn, &artisan, &r.id).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }
}
