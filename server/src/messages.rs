use crate::{
    accounts::SqliteProfiles,
    db::{from_millis, now, to_millis, uuid_col},
    error::AppError,
    model::{MessageCreate, Report},
};
use marketcore::{conversations::summarize, ConversationSummary, Message, ProfileResolver};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 200;

const MESSAGE_COLS: &str = "id, sender_id, recipient_id, content, read, created_at, updated_at";

fn row_to_msg(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_col(row, 0)?,
        sender_id: uuid_col(row, 1)?,
        recipient_id: uuid_col(row, 2)?,
        content: row.get(3)?,
        read: row.get(4)?,
        created_at: from_millis(row.get(5)?),
        updated_at: from_millis(row.get(6)?),
    })
}

/// Store a message from `sender_id`. The recipient must be a known client or artisan.
pub fn create_message(
    conn: &Connection,
    sender_id: &Uuid,
    req: &MessageCreate,
) -> Result<Message, AppError> {
    if req.content.trim().is_empty() {
        return Err(AppError::invalid("message content is empty"));
    }
    if SqliteProfiles(conn).resolve(&req.recipient_id)?.is_none() {
        return Err(AppError::not_found("recipient"));
    }
    let ts = now();
    let msg = Message {
        id: Uuid::new_v4(),
        sender_id: *sender_id,
        recipient_id: req.recipient_id,
        content: req.content.clone(),
        read: false,
        created_at: ts,
        updated_at: ts,
    };
    conn.execute(
        "INSERT INTO messages (id, sender_id, recipient_id, content, read, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
        params![
            msg.id.to_string(),
            msg.sender_id.to_string(),
            msg.recipient_id.to_string(),
            msg.content,
            to_millis(ts)
        ],
    )?;
    Ok(msg)
}

pub fn get_message(conn: &Connection, id: &Uuid) -> Result<Option<Message>, AppError> {
    let sql = format!("SELECT {MESSAGE_COLS} FROM messages WHERE id = ?1");
    Ok(conn
        .query_row(&sql, [id.to_string()], row_to_msg)
        .optional()?)
}

/// Messages involving `me`, newest first; narrowed to one counterpart when `with` is set.
pub fn list_messages(
    conn: &Connection,
    me: &Uuid,
    with: Option<&Uuid>,
    skip: usize,
    limit: Option<usize>,
) -> Result<Vec<Message>, AppError> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let me = me.to_string();
    let mut out = Vec::new();
    match with {
        Some(other) => {
            let sql = format!(
                "SELECT {MESSAGE_COLS} FROM messages WHERE (sender_id = ?1 AND recipient_id = ?2) OR (sender_id = ?2 AND recipient_id = ?1) ORDER BY created_at DESC, rowid DESC LIMIT ?3 OFFSET ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![me, other.to_string(), limit as i64, skip as i64],
                row_to_msg,
            )?;
            for m in rows {
                out.push(m?);
            }
        }
        None => {
            let sql = format!(
                "SELECT {MESSAGE_COLS} FROM messages WHERE sender_id = ?1 OR recipient_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![me, limit as i64, skip as i64], row_to_msg)?;
            for m in rows {
                out.push(m?);
            }
        }
    }
    Ok(out)
}

/// Every message involving `me`, newest first.
fn history(conn: &Connection, me: &Uuid) -> Result<Vec<Message>, AppError> {
    let sql = format!(
        "SELECT {MESSAGE_COLS} FROM messages WHERE sender_id = ?1 OR recipient_id = ?1 ORDER BY created_at DESC, rowid DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([me.to_string()], row_to_msg)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// One row per counterpart with the latest message and unread count.
pub fn conversations(conn: &Connection, me: &Uuid) -> Result<Vec<ConversationSummary>, AppError> {
    let msgs = history(conn, me)?;
    Ok(summarize(me, &msgs, &SqliteProfiles(conn))?)
}

/// Mark an unread message addressed to `me` as read.
pub fn mark_read(conn: &Connection, me: &Uuid, id: &Uuid) -> Result<Message, AppError> {
    let ts = now();
    let changed = conn.execute(
        "UPDATE messages SET read = 1, updated_at = ?3 WHERE id = ?1 AND recipient_id = ?2 AND read = 0",
        params![id.to_string(), me.to_string(), to_millis(ts)],
    )?;
    if changed == 0 {
        return Err(AppError::not_found("unread message"));
    }
    get_message(conn, id)?.ok_or_else(|| AppError::not_found("message"))
}

/// File a report against a message the reporter took part in.
pub fn report_message(
    conn: &Connection,
    reporter: &Uuid,
    id: &Uuid,
    reason: &str,
) -> Result<Report, AppError> {
    if reason.trim().is_empty() {
        return Err(AppError::invalid("a reason is required"));
    }
    let msg = match get_message(conn, id)? {
        Some(m) if m.sender_id == *reporter || m.recipient_id == *reporter => m,
        _ => return Err(AppError::not_found("message")),
    };
    let report = Report {
        id: Uuid::new_v4(),
        message_id: msg.id,
        reporter_id: *reporter,
        reason: reason.trim().to_string(),
        status: "pending".into(),
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO reports (id, message_id, reporter_id, sender_id, recipient_id, reason, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            report.id.to_string(),
            report.message_id.to_string(),
            report.reporter_id.to_string(),
            msg.sender_id.to_string(),
            msg.recipient_id.to_string(),
            report.reason,
            report.status,
            to_millis(report.created_at),
        ],
    )?;
    Ok(report)
}
