//! SQLite bootstrap for the unit document store.
//!
//! # Responsibility
//! - Open the store file a reconciliation run points at, or a scratch
//!   in-memory store for tests and seeding.
//! - Bring the `units` schema up to the version this binary understands.
//!
//! # Invariants
//! - Schema version is tracked via `PRAGMA user_version`.
//! - `open_existing_db` never creates a file; a missing store is an error.
//! - A store stamped by a newer binary is refused, never downgraded.
//! - Unit rows are only touched after migrations succeed.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_existing_db};

pub type DbResult<T> = Result<T, DbError>;

/// Connection bootstrap and migration errors.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The store file does not exist and creating it was not allowed.
    MissingDatabase(PathBuf),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::MissingDatabase(path) => {
                write!(f, "database file `{}` does not exist", path.display())
            }
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::MissingDatabase(_) | Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
