use crate::db::models::{Message, Role, Session, SessionId};
use crate::db::transcript::ParsedTranscript;
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection, Result as DbResult, Row};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database Error: {0}")]
    Db(#[from] duckdb::Error),
    #[error("Session {0} does not exist")]
    UnknownSession(SessionId),
}

pub type StoreResult<T> = Result<T, StoreError>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const SESSION_COLUMNS: &str = "id, title, CAST(created_at AS VARCHAR)";
const MESSAGE_COLUMNS: &str = "id, session_id, role, content, CAST(created_at AS VARCHAR)";

pub struct DbService;

impl DbService {
    // Timestamps are selected AS VARCHAR so the driver never has to map DuckDB's
    // native timestamp type; they are written and read back as naive UTC.
    fn parse_timestamp(row: &Row, idx: usize) -> DbResult<DateTime<Utc>> {
        let raw: String = row.get(idx)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|e| {
                duckdb::Error::FromSqlConversionFailure(idx, duckdb::types::Type::Text, Box::new(e))
            })
    }

    fn now() -> String {
        Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }

    fn row_to_session(row: &Row) -> DbResult<Session> {
        Ok(Session {
            id: row.get(0)?,
            title: row.get(1)?,
            created_at: Self::parse_timestamp(row, 2)?,
        })
    }

    fn row_to_message(row: &Row) -> DbResult<Message> {
        let role: String = row.get(2)?;
        let role = role.parse::<Role>().map_err(|e| {
            duckdb::Error::FromSqlConversionFailure(2, duckdb::types::Type::Text, Box::new(e))
        })?;

        Ok(Message {
            id: row.get(0)?,
            session_id: row.get(1)?,
            role,
            content: row.get(3)?,
            created_at: Self::parse_timestamp(row, 4)?,
        })
    }

    // --- Session Operations ---

    pub fn create_session(conn: &Connection, title: &str) -> StoreResult<Session> {
        let session = conn.query_row(
            &format!(
                "INSERT INTO sessions (title, created_at) VALUES (?, CAST(? AS TIMESTAMP)) RETURNING {}",
                SESSION_COLUMNS
            ),
            params![title, Self::now()],
            Self::row_to_session,
        )?;
        debug!("Created session {} ({:?})", session.id, session.title);
        Ok(session)
    }

    pub fn get_session(conn: &Connection, id: SessionId) -> StoreResult<Option<Session>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions WHERE id = ?",
            SESSION_COLUMNS
        ))?;
        let mut rows = stmt.query_map(params![id], Self::row_to_session)?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Newest first.
    pub fn list_sessions(conn: &Connection) -> StoreResult<Vec<Session>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sessions ORDER BY created_at DESC, id DESC",
            SESSION_COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::row_to_session)?;

        let sessions = rows.collect::<DbResult<Vec<_>>>()?;
        Ok(sessions)
    }

    pub fn rename_session(conn: &Connection, id: SessionId, title: &str) -> StoreResult<()> {
        let updated = conn.execute(
            "UPDATE sessions SET title = ? WHERE id = ?",
            params![title, id],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownSession(id));
        }
        Ok(())
    }

    /// Removes the session and every message in it. Deleting an unknown id is a no-op.
    pub fn delete_session(conn: &Connection, id: SessionId) -> StoreResult<()> {
        conn.execute("BEGIN TRANSACTION", [])?;

        // Messages go first so none ever outlives its session
        if let Err(e) = conn.execute("DELETE FROM messages WHERE session_id = ?", params![id]) {
            let _ = conn.execute("ROLLBACK", []);
            return Err(e.into());
        }

        if let Err(e) = conn.execute("DELETE FROM sessions WHERE id = ?", params![id]) {
            let _ = conn.execute("ROLLBACK", []);
            return Err(e.into());
        }

        conn.execute("COMMIT", [])?;
        debug!("Deleted session {}", id);
        Ok(())
    }

    // --- Message Operations ---

    pub fn add_message(
        conn: &Connection,
        session_id: SessionId,
        role: Role,
        content: &str,
    ) -> StoreResult<Message> {
        if Self::get_session(conn, session_id)?.is_none() {
            return Err(StoreError::UnknownSession(session_id));
        }

        let message = conn.query_row(
            &format!(
                "INSERT INTO messages (session_id, role, content, created_at) \
                 VALUES (?, ?, ?, CAST(? AS TIMESTAMP)) RETURNING {}",
                MESSAGE_COLUMNS
            ),
            params![session_id, role.as_str(), content, Self::now()],
            Self::row_to_message,
        )?;
        Ok(message)
    }

    /// Messages of a session in insertion order. Unknown sessions yield an empty list.
    pub fn list_messages(conn: &Connection, session_id: SessionId) -> StoreResult<Vec<Message>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE session_id = ? ORDER BY id ASC",
            MESSAGE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![session_id], Self::row_to_message)?;

        let messages = rows.collect::<DbResult<Vec<_>>>()?;
        Ok(messages)
    }

    pub fn import_transcript(conn: &Connection, transcript: &ParsedTranscript) -> StoreResult<Session> {
        let session = Self::create_session(conn, &transcript.title)?;
        for (role, content) in transcript.messages.iter().filter(|(role, _)| *role != Role::System) {
            Self::add_message(conn, session.id, *role, content)?;
        }
        Ok(session)
    }
}
