//! Session records and their repository.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteSessionStore;
pub use store::{SessionError, SessionFilter, SessionStore};
pub use types::{SessionRecord, SessionSummary, StudyDocument};
