//! Connection bootstrap and schema versioning for the box/item store.
//!
//! Callers get connections from [`open_db`] or [`open_db_in_memory`]; both
//! leave the schema at [`migrations::latest_version`] or fail.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Failures while opening, configuring or migrating a store connection.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was written by a newer build; nothing was touched.
    SchemaTooNew { found: u32, supported: u32 },
    /// SQLite kept another journal mode when WAL was requested.
    JournalModeRejected(String),
}

impl DbError {
    /// Stable machine-readable code for logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "db_sqlite",
            Self::SchemaTooNew { .. } => "db_schema_too_new",
            Self::JournalModeRejected(_) => "db_journal_mode",
        }
    }
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "store schema v{found} is ahead of this build (supports up to v{supported})"
            ),
            Self::JournalModeRejected(mode) => {
                write!(f, "store refused WAL journaling and stayed in `{mode}`")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
