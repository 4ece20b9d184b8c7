use crate::{
    auth::{hash_password, verify_password},
    bookings,
    db::{from_millis, json_col, now, to_millis, uuid_col},
    error::{is_constraint_violation, AppError},
    model::{ArtisanCreate, ClientCreate, ClientUpdate, Dashboard},
};
use marketcore::{ArtisanProfile, ClientProfile, ProfileResolver, Role};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

const MIN_PASSWORD_LEN: usize = 8;
const SEARCH_MAX: usize = 50;

const CLIENT_COLS: &str = "id, name, email, location, profile_picture, notification_preferences, email_verified, created_at, updated_at";
const ARTISAN_COLS: &str = "id, name, email, profession, skills, location, description, hourly_rate, profile_picture, rating, review_count, created_at, updated_at";

fn validate_email(email: &str) -> Result<(), AppError> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(AppError::invalid("invalid email address"))
    }
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::invalid(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::invalid(format!("{field} is required")));
    }
    Ok(())
}

fn email_taken(conn: &Connection, table: &str, email: &str) -> Result<bool, AppError> {
    let sql = format!("SELECT 1 FROM {table} WHERE email = ?1");
    Ok(conn
        .query_row(&sql, [email], |_| Ok(()))
        .optional()?
        .is_some())
}

fn map_insert_err(err: rusqlite::Error) -> AppError {
    if is_constraint_violation(&err) {
        AppError::conflict("email already registered")
    } else {
        err.into()
    }
}

pub fn register_client(conn: &Connection, req: &ClientCreate) -> Result<ClientProfile, AppError> {
    require("name", &req.name)?;
    require("location", &req.location)?;
    let email = req.email.trim().to_string();
    validate_email(&email)?;
    validate_password(&req.password)?;
    if email_taken(conn, "clients", &email)? {
        return Err(AppError::conflict("email already registered"));
    }
    let hash = hash_password(&req.password)?;
    let ts = now();
    let profile = ClientProfile {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        email,
        location: req.location.clone(),
        profile_picture: req.profile_picture.clone(),
        notification_preferences: req.notification_preferences.unwrap_or_default(),
        email_verified: false,
        created_at: ts,
        updated_at: ts,
    };
    conn.execute(
        "INSERT INTO clients (id, name, email, hashed_password, location, profile_picture, notification_preferences, email_verified, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8)",
        params![
            profile.id.to_string(),
            profile.name,
            profile.email,
            hash,
            profile.location,
            profile.profile_picture,
            serde_json::to_string(&profile.notification_preferences)
                .map_err(anyhow::Error::from)?,
            to_millis(ts),
        ],
    )
    .map_err(map_insert_err)?;
    Ok(profile)
}

pub fn register_artisan(conn: &Connection, req: &ArtisanCreate) -> Result<ArtisanProfile, AppError> {
    require("name", &req.name)?;
    require("profession", &req.profession)?;
    require("location", &req.location)?;
    let email = req.email.trim().to_string();
    validate_email(&email)?;
    validate_password(&req.password)?;
    if let Some(rate) = req.hourly_rate {
        if !rate.is_finite() || rate < 0.0 {
            return Err(AppError::invalid("hourly_rate must not be negative"));
        }
    }
    if email_taken(conn, "artisans", &email)? {
        return Err(AppError::conflict("email already registered"));
    }
    let hash = hash_password(&req.password)?;
    let ts = now();
    let profile = ArtisanProfile {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        email,
        profession: req.profession.clone(),
        skills: req.skills.clone(),
        location: req.location.clone(),
        description: req.description.clone(),
        hourly_rate: req.hourly_rate,
        profile_picture: req.profile_picture.clone(),
        rating: 0.0,
        review_count: 0,
        created_at: ts,
        updated_at: ts,
    };
    conn.execute(
        "INSERT INTO artisans (id, name, email, hashed_password, profession, skills, location, description, hourly_rate, profile_picture, rating, review_count, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, 0, ?11, ?11)",
        params![
            profile.id.to_string(),
            profile.name,
            profile.email,
            hash,
            profile.profession,
            serde_json::to_string(&profile.skills).map_err(anyhow::Error::from)?,
            profile.location,
            profile.description,
            profile.hourly_rate,
            profile.profile_picture,
            to_millis(ts),
        ],
    )
    .map_err(map_insert_err)?;
    Ok(profile)
}

/// Check credentials for the account of `role` registered under `email`.
pub fn authenticate(
    conn: &Connection,
    role: Role,
    email: &str,
    password: &str,
) -> Result<Option<Uuid>, AppError> {
    let table = match role {
        Role::Client => "clients",
        Role::Artisan => "artisans",
    };
    let sql = format!("SELECT id, hashed_password FROM {table} WHERE email = ?1");
    let row = conn
        .query_row(&sql, [email.trim()], |row| {
            Ok((uuid_col(row, 0)?, row.get::<_, String>(1)?))
        })
        .optional()?;
    Ok(match row {
        Some((id, hash)) if verify_password(password, &hash) => Some(id),
        _ => None,
    })
}

fn row_to_client(row: &rusqlite::Row<'_>) -> rusqlite::Result<ClientProfile> {
    Ok(ClientProfile {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        location: row.get(3)?,
        profile_picture: row.get(4)?,
        notification_preferences: json_col(row, 5)?,
        email_verified: row.get(6)?,
        created_at: from_millis(row.get(7)?),
        updated_at: from_millis(row.get(8)?),
    })
}

fn row_to_artisan(row: &rusqlite::Row<'_>) -> rusqlite::Result<ArtisanProfile> {
    Ok(ArtisanProfile {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        profession: row.get(3)?,
        skills: json_col(row, 4)?,
        location: row.get(5)?,
        description: row.get(6)?,
        hourly_rate: row.get(7)?,
        profile_picture: row.get(8)?,
        rating: row.get(9)?,
        review_count: row.get(10)?,
        created_at: from_millis(row.get(11)?),
        updated_at: from_millis(row.get(12)?),
    })
}

pub fn get_client(conn: &Connection, id: &Uuid) -> Result<Option<ClientProfile>, AppError> {
    let sql = format!("SELECT {CLIENT_COLS} FROM clients WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.to_string()], row_to_client)
        .optional()?)
}

pub fn get_artisan(conn: &Connection, id: &Uuid) -> Result<Option<ArtisanProfile>, AppError> {
    let sql = format!("SELECT {ARTISAN_COLS} FROM artisans WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.to_string()], row_to_artisan)
        .optional()?)
}

/// Apply a partial update to a client profile. Nothing is written unless every field validates.
pub fn update_client(
    conn: &mut Connection,
    id: &Uuid,
    update: &ClientUpdate,
) -> Result<ClientProfile, AppError> {
    let new_hash = match &update.password {
        Some(password) => {
            validate_password(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };
    let tx = conn.transaction()?;
    let mut client = get_client(&tx, id)?.ok_or_else(|| AppError::not_found("client"))?;
    if let Some(name) = &update.name {
        require("name", name)?;
        client.name = name.trim().to_string();
    }
    if let Some(email) = &update.email {
        let email = email.trim();
        validate_email(email)?;
        if !email.eq_ignore_ascii_case(&client.email) && email_taken(&tx, "clients", email)? {
            return Err(AppError::conflict("email already registered"));
        }
        client.email = email.to_string();
    }
    if let Some(location) = &update.location {
        require("location", location)?;
        client.location = location.clone();
    }
    if let Some(pic) = &update.profile_picture {
        client.profile_picture = Some(pic.clone());
    }
    if let Some(prefs) = update.notification_preferences {
        client.notification_preferences = prefs;
    }
    client.updated_at = now();
    tx.execute(
        "UPDATE clients SET name = ?2, email = ?3, location = ?4, profile_picture = ?5, notification_preferences = ?6, updated_at = ?7 WHERE id = ?1",
        params![
            id.to_string(),
            client.name,
            client.email,
            client.location,
            client.profile_picture,
            serde_json::to_string(&client.notification_preferences)
                .map_err(anyhow::Error::from)?,
            to_millis(client.updated_at),
        ],
    )
    .map_err(map_insert_err)?;
    if let Some(hash) = new_hash {
        tx.execute(
            "UPDATE clients SET hashed_password = ?2 WHERE id = ?1",
            params![id.to_string(), hash],
        )?;
    }
    tx.commit()?;
    Ok(client)
}

/// Profile plus the next upcoming and most recent completed bookings.
pub fn dashboard(conn: &Connection, id: &Uuid) -> Result<Dashboard, AppError> {
    let client = get_client(conn, id)?.ok_or_else(|| AppError::not_found("client"))?;
    let upcoming_bookings = bookings::upcoming_for_client(conn, id, now(), 5)?;
    let past_bookings = bookings::completed_for_client(conn, id, 5)?;
    Ok(Dashboard {
        client,
        upcoming_bookings,
        past_bookings,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchSort {
    #[default]
    Relevance,
    Rating,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ArtisanSearch {
    pub query: Option<String>,
    pub location: Option<String>,
    pub min_rating: Option<f64>,
    #[serde(default)]
    pub sort_by: SearchSort,
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

fn relevance(artisan: &ArtisanProfile, needle: &str) -> usize {
    let hit = |s: &str| s.to_lowercase().contains(needle);
    [
        hit(&artisan.name),
        hit(&artisan.profession),
        artisan.skills.iter().any(|s| hit(s)),
        hit(&artisan.location),
        hit(&artisan.description),
    ]
    .into_iter()
    .filter(|m| *m)
    .count()
}

/// Free-text artisan search over name, profession, skills, location and description.
pub fn search_artisans(
    conn: &Connection,
    search: &ArtisanSearch,
) -> Result<Vec<ArtisanProfile>, AppError> {
    if let Some(min) = search.min_rating {
        if !(0.0..=5.0).contains(&min) {
            return Err(AppError::invalid("min_rating must be between 0 and 5"));
        }
    }
    let limit = search.limit.unwrap_or(10).clamp(1, SEARCH_MAX);
    let skip = search.skip.unwrap_or(0);

    let sql = format!("SELECT {ARTISAN_COLS} FROM artisans ORDER BY created_at, rowid");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_artisan)?;
    let needle = search
        .query
        .as_deref()
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());
    let location = search
        .location
        .as_deref()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty());

    let mut scored = Vec::new();
    for artisan in rows {
        let artisan = artisan?;
        if let Some(loc) = &location {
            if !artisan.location.to_lowercase().contains(loc) {
                continue;
            }
        }
        if let Some(min) = search.min_rating {
            if artisan.rating < min {
                continue;
            }
        }
        let score = match &needle {
            Some(n) => match relevance(&artisan, n) {
                0 => continue,
                s => s,
            },
            None => 0,
        };
        scored.push((score, artisan));
    }

    match search.sort_by {
        SearchSort::Relevance => scored.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| b.1.rating.total_cmp(&a.1.rating))
        }),
        SearchSort::Rating => scored.sort_by(|a, b| b.1.rating.total_cmp(&a.1.rating)),
    }
    Ok(scored
        .into_iter()
        .skip(skip)
        .take(limit)
        .map(|(_, a)| a)
        .collect())
}

/// Resolves profiles straight from the account tables.
pub struct SqliteProfiles<'a>(pub &'a Connection);

impl ProfileResolver for SqliteProfiles<'_> {
    fn find_client(&self, id: &Uuid) -> anyhow::Result<Option<ClientProfile>> {
        let sql = format!("SELECT {CLIENT_COLS} FROM clients WHERE id = ?1");
        Ok(self
            .0
            .query_row(&sql, [id.to_string()], row_to_client)
            .optional()?)
    }

    fn find_artisan(&self, id: &Uuid) -> anyhow::Result<Option<ArtisanProfile>> {
        let sql = format!("SELECT {ARTISAN_COLS} FROM artisans WHERE id = ?1");
        Ok(self
            .0
            .query_row(&sql, [id.to_string()], row_to_artisan)
            .optional()?)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{artisan, client};
    use super::*;
    use crate::db::init_db;
    use axum::http::StatusCode;
    use marketcore::profile::NotificationPreferences;

    #[test]
    fn register_and_login_client() {
        let conn = init_db(":memory:").unwrap();
        let ada = client(&conn, "Ada");
        assert_eq!(ada.notification_preferences, NotificationPreferences::default());
        let id = authenticate(&conn, Role::Client, "ADA@example.com", "password123").unwrap();
        assert_eq!(id, Some(ada.id));
        assert!(authenticate(&conn, Role::Client, "ada@example.com", "wrong-pass")
            .unwrap()
            .is_none());
        assert!(authenticate(&conn, Role::Artisan, "ada@example.com", "password123")
            .unwrap()
            .is_none());
    }

    #[test]
    fn duplicate_email_conflicts() {
        let conn = init_db(":memory:").unwrap();
        client(&conn, "Ada");
        let err = register_client(
            &conn,
            &ClientCreate {
                name: "Other".into(),
                email: "ada@example.com".into(),
                password: "password123".into(),
                location: "Abuja".into(),
                profile_picture: None,
                notification_preferences: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn rejects_bad_email_and_short_password() {
        let conn = init_db(":memory:").unwrap();
        let mut req = ClientCreate {
            name: "Ada".into(),
            email: "not-an-email".into(),
            password: "password123".into(),
            location: "Lagos".into(),
            profile_picture: None,
            notification_preferences: None,
        };
        assert_eq!(
            register_client(&conn, &req).unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
        req.email = "ada@example.com".into();
        req.password = "short".into();
        assert_eq!(
            register_client(&conn, &req).unwrap_err().status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn partial_update_keeps_other_fields() {
        let mut conn = init_db(":memory:").unwrap();
        let ada = client(&conn, "Ada");
        let updated = update_client(
            &mut conn,
            &ada.id,
            &ClientUpdate {
                location: Some("Ibadan".into()),
                password: Some("new-password".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.location, "Ibadan");
        assert_eq!(updated.name, "Ada");
        assert_eq!(get_client(&conn, &ada.id).unwrap().unwrap().location, "Ibadan");
        assert_eq!(
            authenticate(&conn, Role::Client, "ada@example.com", "new-password").unwrap(),
            Some(ada.id)
        );
    }

    #[test]
    fn rejected_update_writes_nothing() {
        let mut conn = init_db(":memory:").unwrap();
        let ada = client(&conn, "Ada");
        let err = update_client(
            &mut conn,
            &ada.id,
            &ClientUpdate {
                location: Some("Ibadan".into()),
                password: Some("short".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let stored = get_client(&conn, &ada.id).unwrap().unwrap();
        assert_eq!(stored.location, "Lagos");
    }

    #[test]
    fn search_by_relevance_and_rating() {
        let conn = init_db(":memory:").unwrap();
        let plumber = artisan(&conn, "Bola", "Plumber", &["pipes", "plumber repairs"]);
        let sparky = artisan(&conn, "Chidi", "Electrician", &["wiring"]);
        conn.execute(
            "UPDATE artisans SET rating = 4.5 WHERE id = ?1",
            [sparky.id.to_string()],
        )
        .unwrap();

        let hits = search_artisans(
            &conn,
            &ArtisanSearch {
                query: Some("plumb".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, plumber.id);

        let by_rating = search_artisans(
            &conn,
            &ArtisanSearch {
                sort_by: SearchSort::Rating,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_rating[0].id, sparky.id);

        let rated = search_artisans(
            &conn,
            &ArtisanSearch {
                min_rating: Some(4.0),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(rated.len(), 1);

        let bad = search_artisans(
            &conn,
            &ArtisanSearch {
                min_rating: Some(7.0),
                ..Default::default()
            },
        );
        assert!(bad.is_err());
    }

    #[test]
    fn search_paginates() {
        let conn = init_db(":memory:").unwrap();
        for name in ["A1", "A2", "A3"] {
            artisan(&conn, name, "Carpenter", &[]);
        }
        let page = search_artisans(
            &conn,
            &ArtisanSearch {
                limit: Some(2),
                skip: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn resolver_reads_both_tables() {
        let conn = init_db(":memory:").unwrap();
        let ada = client(&conn, "Ada");
        let bola = artisan(&conn, "Bola", "Plumber", &[]);
        let profiles = SqliteProfiles(&conn);
        assert_eq!(profiles.resolve(&ada.id).unwrap().unwrap().role(), Role::Client);
        assert_eq!(profiles.resolve(&bola.id).unwrap().unwrap().role(), Role::Artisan);
        assert!(profiles.resolve(&Uuid::new_v4()).unwrap().is_none());
    }
}
