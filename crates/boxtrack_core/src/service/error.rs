//! Service-level error kinds surfaced to the request layer.

use crate::model::box_record::BoxId;
use crate::model::item::{ItemId, ItemValidationError};
use crate::model::short_id::{ShortId, ShortIdError, ShortIdRange};
use crate::repo::store_error::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by core services.
pub type CoreResult<T> = Result<T, CoreError>;

/// What a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Box(BoxId),
    Item(ItemId),
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Box(id) => write!(f, "box {id}"),
            Self::Item(id) => write!(f, "item {id}"),
        }
    }
}

/// Errors from core service operations.
#[derive(Debug)]
pub enum CoreError {
    /// Referenced box or item does not exist.
    NotFound(EntityRef),
    /// Reparent would make a box its own ancestor.
    Cycle { box_uuid: BoxId, parent_uuid: BoxId },
    /// Detach source does not hold the item.
    NotAttached { box_uuid: BoxId, item_uuid: ItemId },
    /// Short id already used by another box.
    DuplicateShortId(ShortId),
    /// Not enough unused short ids left in the range.
    OutOfIds {
        range: ShortIdRange,
        requested: usize,
        available: usize,
    },
    /// Pre-existing corruption detected; the operation was aborted.
    InvariantViolation(String),
    /// Caller input failed validation.
    InvalidInput(String),
    /// Storage transport or schema failure.
    Store(StoreError),
}

impl CoreError {
    /// Stable code used in log lines and by the request layer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Cycle { .. } => "cycle",
            Self::NotAttached { .. } => "not_attached",
            Self::DuplicateShortId(_) => "duplicate_short_id",
            Self::OutOfIds { .. } => "out_of_ids",
            Self::InvariantViolation(_) => "invariant_violation",
            Self::InvalidInput(_) => "invalid_input",
            Self::Store(_) => "store_error",
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::Cycle {
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
            Self::DuplicateShortId(short_id) => write!(f, "short id already in use: {short_id}"),
            Self::OutOfIds {
                range,
                requested,
                available,
            } => write!(
                f,
                "short id range {range} exhausted: requested {requested}, available {available}"
            ),
            Self::InvariantViolation(message) => write!(f, "invariant violation: {message}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::BoxNotFound(id) => Self::NotFound(EntityRef::Box(id)),
            StoreError::ItemNotFound(id) => Self::NotFound(EntityRef::Item(id)),
            StoreError::ShortIdTaken(short_id) => Self::DuplicateShortId(short_id),
            StoreError::CycleDetected {
                box_uuid,
                parent_uuid,
            } => Self::Cycle {
                box_uuid,
                parent_uuid,
            },
            StoreError::NotAttached {
                box_uuid,
                item_uuid,
            } => Self::NotAttached {
                box_uuid,
                item_uuid,
            },
            StoreError::InvariantViolation(message) => Self::InvariantViolation(message),
            other => Self::Store(other),
        }
    }
}

impl From<ShortIdError> for CoreError {
    fn from(value: ShortIdError) -> Self {
        Self::InvalidInput(value.to_string())
    }
}

impl From<ItemValidationError> for CoreError {
    fn from(value: ItemValidationError) -> Self {
        Self::InvalidInput(value.to_string())
    }
}
