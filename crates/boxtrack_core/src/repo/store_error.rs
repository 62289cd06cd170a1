//! Error type shared by all SQLite repositories.

use crate::db::DbError;
use crate::model::box_record::BoxId;
use crate::model::item::ItemId;
use crate::model::short_id::ShortId;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by repository operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from repository operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Referenced box does not exist.
    BoxNotFound(BoxId),
    /// Referenced item does not exist.
    ItemNotFound(ItemId),
    /// Another box already uses this short id.
    ShortIdTaken(ShortId),
    /// Reparent rejected by the cycle guard.
    CycleDetected { box_uuid: BoxId, parent_uuid: BoxId },
    /// The box does not hold the item.
    NotAttached { box_uuid: BoxId, item_uuid: ItemId },
    /// Stored data breaks a custody or hierarchy invariant.
    InvariantViolation(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::BoxNotFound(id) => write!(f, "box not found: {id}"),
            Self::ItemNotFound(id) => write!(f, "item not found: {id}"),
            Self::ShortIdTaken(short_id) => write!(f, "short id already in use: {short_id}"),
            Self::CycleDetected {
                box_uuid,
                parent_uuid,
            } => write!(
                f,
                "reparent would create cycle: box {box_uuid} under parent {parent_uuid}"
            ),
            Self::NotAttached {
                box_uuid,
                item_uuid,
            } => write!(f, "item {item_uuid} is not held by box {box_uuid}"),
            Self::InvariantViolation(message) => write!(f, "invariant violation: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "box store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "box store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "box store requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}
