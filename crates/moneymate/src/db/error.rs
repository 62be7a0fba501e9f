use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create store directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema migration v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A stored slip row does not decode (bad status, timestamp or JSON).
    #[error("Slip row '{id}' is corrupt: {reason}")]
    InvalidRow { id: String, reason: String },

    #[error("Slip store lock poisoned")]
    LockPoisoned,
}
