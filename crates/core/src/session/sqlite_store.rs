//! SQLite-backed session store.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{SessionError, SessionFilter, SessionRecord, SessionStore};
use crate::digest::InputDigest;

const SELECT_COLUMNS: &str = "id, title, tags, input_text, settings, digest_hash, digest_length, pipeline_state, mastery_status, last_phase, last_error_message, document, created_at, updated_at";

/// SQLite-backed session store.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, SessionError> {
        let conn = Connection::open(path).map_err(|e| SessionError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, SessionError> {
        let conn =
            Connection::open_in_memory().map_err(|e| SessionError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), SessionError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                tags TEXT NOT NULL,
                input_text TEXT NOT NULL,
                settings TEXT NOT NULL,
                digest_hash TEXT NOT NULL,
                digest_length INTEGER NOT NULL,
                pipeline_state TEXT NOT NULL,
                mastery_status TEXT,
                last_phase TEXT NOT NULL,
                last_error_message TEXT,
                document TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at DESC);
            CREATE INDEX IF NOT EXISTS idx_sessions_digest ON sessions(digest_hash);
            "#,
        )
        .map_err(|e| SessionError::Database(e.to_string()))?;

        Ok(())
    }

    fn build_where_clause(filter: &SessionFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(phase) = filter.phase {
            conditions.push("last_phase = ?");
            params.push(Box::new(phase.as_str().to_string()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<RawRecord> {
        Ok(RawRecord {
            id: row.get(0)?,
            title: row.get(1)?,
            tags: row.get(2)?,
            input_text: row.get(3)?,
            settings: row.get(4)?,
            digest_hash: row.get(5)?,
            digest_length: row.get(6)?,
            pipeline_state: row.get(7)?,
            mastery_status: row.get(8)?,
            last_phase: row.get(9)?,
            last_error_message: row.get(10)?,
            document: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

/// Row as stored; JSON columns are decoded outside the rusqlite closure so
/// that a corrupt column surfaces as a `Serialization` error.
struct RawRecord {
    id: String,
    title: String,
    tags: String,
    input_text: String,
    settings: String,
    digest_hash: String,
    digest_length: i64,
    pipeline_state: String,
    mastery_status: Option<String>,
    last_phase: String,
    last_error_message: Option<String>,
    document: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawRecord {
    fn decode(self) -> Result<SessionRecord, SessionError> {
        let ser = |e: serde_json::Error| SessionError::Serialization(e.to_string());

        Ok(SessionRecord {
            id: self.id,
            title: self.title,
            tags: serde_json::from_str(&self.tags).map_err(ser)?,
            input_text: self.input_text,
            settings: serde_json::from_str(&self.settings).map_err(ser)?,
            input_digest: InputDigest {
                hash: self.digest_hash,
                length: self.digest_length as usize,
            },
            pipeline_state: serde_json::from_str(&self.pipeline_state).map_err(ser)?,
            mastery_status: self
                .mastery_status
                .map(|json| serde_json::from_str(&json))
                .transpose()
                .map_err(ser)?,
            last_phase: serde_json::from_value(serde_json::Value::String(self.last_phase))
                .map_err(ser)?,
            last_error_message: self.last_error_message,
            document: self
                .document
                .map(|json| serde_json::from_str(&json))
                .transpose()
                .map_err(ser)?,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl SessionStore for SqliteSessionStore {
    fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            &format!("SELECT {} FROM sessions WHERE id = ?", SELECT_COLUMNS),
            params![id],
            Self::row_to_record,
        );

        match result {
            Ok(raw) => raw.decode().map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SessionError::Database(e.to_string())),
        }
    }

    fn save(&self, record: &SessionRecord) -> Result<(), SessionError> {
        let conn = self.conn.lock().unwrap();
        let ser = |e: serde_json::Error| SessionError::Serialization(e.to_string());

        let tags = serde_json::to_string(&record.tags).map_err(ser)?;
        let settings = serde_json::to_string(&record.settings).map_err(ser)?;
        let pipeline_state = serde_json::to_string(&record.pipeline_state).map_err(ser)?;
        let mastery_status = record
            .mastery_status
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(ser)?;
        let document = record
            .document
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(ser)?;

        conn.execute(
            r#"
            INSERT INTO sessions (id, title, tags, input_text, settings, digest_hash, digest_length, pipeline_state, mastery_status, last_phase, last_error_message, document, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                tags = excluded.tags,
                input_text = excluded.input_text,
                settings = excluded.settings,
                digest_hash = excluded.digest_hash,
                digest_length = excluded.digest_length,
                pipeline_state = excluded.pipeline_state,
                mastery_status = excluded.mastery_status,
                last_phase = excluded.last_phase,
                last_error_message = excluded.last_error_message,
                document = excluded.document,
                updated_at = excluded.updated_at
            "#,
            params![
                record.id,
                record.title,
                tags,
                record.input_text,
                settings,
                record.input_digest.hash,
                record.input_digest.length as i64,
                pipeline_state,
                mastery_status,
                record.last_phase.as_str(),
                record.last_error_message,
                document,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| SessionError::Database(e.to_string()))?;

        Ok(())
    }

    fn list(&self, filter: &SessionFilter) -> Result<Vec<SessionRecord>, SessionError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT {} FROM sessions {} ORDER BY updated_at DESC, id ASC LIMIT ? OFFSET ?",
            SELECT_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| SessionError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_record)
            .map_err(|e| SessionError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            let raw = row_result.map_err(|e| SessionError::Database(e.to_string()))?;
            records.push(raw.decode()?);
        }

        Ok(records)
    }

    fn delete(&self, id: &str) -> Result<bool, SessionError> {
        let conn = self.conn.lock().unwrap();

        let deleted = conn
            .execute("DELETE FROM sessions WHERE id = ?", params![id])
            .map_err(|e| SessionError::Database(e.to_string()))?;

        Ok(deleted > 0)
    }
}
