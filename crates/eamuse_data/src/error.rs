//! Error types for the persistence layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    /// Storage engine failure.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored JSON payload could not be read or written.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An attempt already exists for this user, song and timestamp.
    #[error("There is already an attempt by {userid} for music id {musicid} at {timestamp}")]
    ScoreSave {
        userid: i64,
        musicid: i64,
        timestamp: i64,
    },

    /// Version or chart would not survive being folded into a music id.
    #[error("Music id out of range: song {song_id} version {version} chart {chart}")]
    InvalidMusic {
        song_id: i64,
        version: i64,
        chart: i64,
    },

    /// A row that must exist was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The database could not hand out a session.
    #[error("Session error: {0}")]
    Session(String),
}

impl DataError {
    /// True for the duplicate-attempt conflict.
    pub fn is_save_conflict(&self) -> bool {
        matches!(self, DataError::ScoreSave { .. })
    }
}

/// Whether a storage error is a uniqueness/constraint violation.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
