//! Box (container) records.
//!
//! # Invariants
//! - `box_uuid` is assigned once at creation and never changes.
//! - `parent_uuid` is only written through the cycle-guarded reparent path.
//! - `item_ids` is only written through the custody engine; it is ordered by
//!   attach position.

use crate::model::item::ItemId;
use crate::model::short_id::ShortId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable durable identifier of a box.
pub type BoxId = Uuid;

/// Box read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub box_uuid: BoxId,
    pub short_id: ShortId,
    pub label: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    /// Normalized, sorted tag set.
    pub tags: Vec<String>,
    /// `None` means top-level.
    pub parent_uuid: Option<BoxId>,
    /// Items currently in this box's custody, in attach order.
    pub item_ids: Vec<ItemId>,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
}

impl BoxRecord {
    pub fn crumb(&self) -> BoxCrumb {
        BoxCrumb {
            box_uuid: self.box_uuid,
            short_id: self.short_id,
            label: self.label.clone(),
        }
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_uuid.is_none()
    }
}

/// Minimal box reference used in breadcrumbs and flattened item views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxCrumb {
    pub box_uuid: BoxId,
    pub short_id: ShortId,
    pub label: Option<String>,
}

/// Input for box creation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NewBox {
    /// Explicit code; `None` lets the service pick the lowest free one.
    pub short_id: Option<ShortId>,
    pub label: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub parent_uuid: Option<BoxId>,
}

/// Partial update of a box's descriptive fields.
///
/// Outer `None` leaves a field untouched; `Some(None)` clears it. Parent and
/// custody are deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoxPatch {
    pub short_id: Option<ShortId>,
    pub label: Option<Option<String>>,
    pub location: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

impl BoxPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
