//! In-memory session store for testing.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::session::{SessionError, SessionFilter, SessionRecord, SessionStore};

/// Session store backed by a `HashMap`.
///
/// Behaves like the SQLite store: upserts on save, lists newest first.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
    saves: Mutex<usize>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for InMemorySessionStore {
    fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.records.lock().unwrap().get(id).cloned())
    }

    fn save(&self, record: &SessionRecord) -> Result<(), SessionError> {
        *self.saves.lock().unwrap() += 1;
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn list(&self, filter: &SessionFilter) -> Result<Vec<SessionRecord>, SessionError> {
        let records = self.records.lock().unwrap();
        let mut matching: Vec<SessionRecord> = records
            .values()
            .filter(|r| filter.phase.map_or(true, |phase| r.last_phase == phase))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let offset = filter.offset.max(0) as usize;
        let limit = filter.limit.max(0) as usize;
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    fn delete(&self, id: &str) -> Result<bool, SessionError> {
        Ok(self.records.lock().unwrap().remove(id).is_some())
    }
}
