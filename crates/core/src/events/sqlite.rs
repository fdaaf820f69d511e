use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{EventError, EventFilter, EventRecord, EventStore, PipelineEvent};

/// SQLite-backed event store.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, EventError> {
        let conn = Connection::open(path).map_err(|e| EventError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, EventError> {
        let conn = Connection::open_in_memory().map_err(|e| EventError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), EventError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pipeline_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                session_id TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_pipeline_events_timestamp ON pipeline_events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_pipeline_events_session_id ON pipeline_events(session_id);
            CREATE INDEX IF NOT EXISTS idx_pipeline_events_kind ON pipeline_events(kind);
            "#,
        )
        .map_err(|e| EventError::Database(e.to_string()))
    }

    fn build_where_clause(filter: &EventFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref session_id) = filter.session_id {
            conditions.push("session_id = ?");
            params.push(Box::new(session_id.clone()));
        }

        if let Some(kind) = filter.kind {
            conditions.push("kind = ?");
            params.push(Box::new(kind.as_str().to_string()));
        }

        if let Some(ref from) = filter.from {
            conditions.push("timestamp >= ?");
            params.push(Box::new(from.to_rfc3339()));
        }

        if let Some(ref to) = filter.to {
            conditions.push("timestamp <= ?");
            params.push(Box::new(to.to_rfc3339()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl EventStore for SqliteEventStore {
    fn insert(&self, record: &EventRecord) -> Result<i64, EventError> {
        let conn = self.conn.lock().unwrap();

        let data_json = serde_json::to_string(&record.data)
            .map_err(|e| EventError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO pipeline_events (timestamp, kind, session_id, data) VALUES (?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.kind,
                record.session_id,
                data_json,
            ],
        )
        .map_err(|e| EventError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, EventError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);

        let sql = format!(
            "SELECT id, timestamp, kind, session_id, data FROM pipeline_events {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| EventError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let id: i64 = row.get(0)?;
                let timestamp_str: String = row.get(1)?;
                let kind: String = row.get(2)?;
                let session_id: String = row.get(3)?;
                let data_json: String = row.get(4)?;

                Ok((id, timestamp_str, kind, session_id, data_json))
            })
            .map_err(|e| EventError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row_result in rows {
            let (id, timestamp_str, kind, session_id, data_json) =
                row_result.map_err(|e| EventError::Database(e.to_string()))?;

            let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp_str)
                .map_err(|e| EventError::Database(format!("Invalid timestamp: {}", e)))?
                .into();

            let data: PipelineEvent = serde_json::from_str(&data_json)
                .map_err(|e| EventError::Serialization(e.to_string()))?;

            records.push(EventRecord {
                id,
                timestamp,
                kind,
                session_id,
                data,
            });
        }

        Ok(records)
    }

    fn count(&self, filter: &EventFilter) -> Result<i64, EventError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM pipeline_events {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| EventError::Database(e.to_string()))
    }
}
