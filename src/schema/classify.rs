//! Failure classification for structural changes.
//!
//! The SQLite result code decides first. Only the generic `SQLITE_ERROR`
//! code, which SQLite uses for "table already exists", "duplicate column
//! name" and "no such table" alike, falls through to message matching.

use rusqlite::ErrorCode;

/// How a failed structural change relates to the target schema state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The element is already present; the declaration is satisfied.
    AlreadyExists,
    /// The declaration targets a table that does not exist.
    MissingTable,
    /// Anything else: I/O, permissions, read-only store, corruption, bad SQL.
    Fatal,
}

impl FailureKind {
    pub fn is_benign(self) -> bool {
        matches!(self, Self::AlreadyExists)
    }
}

pub fn classify_failure(err: &rusqlite::Error) -> FailureKind {
    match err {
        rusqlite::Error::SqliteFailure(failure, message) => match failure.code {
            ErrorCode::Unknown => classify_message(message.as_deref()),
            _ => FailureKind::Fatal,
        },
        _ => FailureKind::Fatal,
    }
}

fn classify_message(message: Option<&str>) -> FailureKind {
    let Some(message) = message else {
        return FailureKind::Fatal;
    };
    let message = message.to_ascii_lowercase();
    if message.starts_with("duplicate column name") || message.ends_with("already exists") {
        FailureKind::AlreadyExists
    } else if message.starts_with("no such table") {
        FailureKind::MissingTable
    } else {
        FailureKind::Fatal
    }
}
