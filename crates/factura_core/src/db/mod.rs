//! SQLite bootstrap for the embedded store backend.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections for the embedded store.
//! - Apply schema migrations before any customer/invoice access.
//! - Describe rows that no longer decode into records.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Referential integrity between invoices and customers is checked by the
//!   store, not delegated to `ON DELETE CASCADE`.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    /// Database file could not be opened or created.
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },
    /// Statement failed on an open connection.
    Sqlite(rusqlite::Error),
    /// File was written by a newer build.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Stored column holds a value that no longer decodes.
    CorruptRow {
        table: &'static str,
        id: i64,
        column: &'static str,
        details: String,
    },
}

impl DbError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Open { .. } => "db_open_failed",
            Self::Sqlite(_) => "db_error",
            Self::UnsupportedSchemaVersion { .. } => "db_schema_too_new",
            Self::CorruptRow { .. } => "db_corrupt_row",
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { path, source } => {
                write!(f, "cannot open database `{}`: {source}", path.display())
            }
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::CorruptRow {
                table,
                id,
                column,
                details,
            } => write!(f, "corrupt {table}.{column} in row {id}: {details}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Open { source, .. } => Some(source),
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::CorruptRow { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
