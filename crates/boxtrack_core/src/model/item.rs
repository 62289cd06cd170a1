//! Item records and custody state.
//!
//! # Invariants
//! - `quantity` is at least 1.
//! - `orphaned_since` is `None` exactly when some box holds the item.

use crate::model::normalize_optional_text;
use crate::model::tags::normalize_tags;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable durable identifier of an item.
pub type ItemId = Uuid;

/// Item read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_uuid: ItemId,
    pub name: String,
    pub quantity: u32,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    /// Epoch ms when custody was last lost; `None` while held by a box.
    pub orphaned_since: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ItemRecord {
    pub fn is_orphaned(&self) -> bool {
        self.orphaned_since.is_some()
    }

    /// Quantity used for aggregation; never below 1.
    pub fn effective_quantity(&self) -> u64 {
        u64::from(self.quantity.max(1))
    }
}

/// Input for item creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub name: String,
    /// `None` defaults to 1.
    pub quantity: Option<u32>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

impl NewItem {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: None,
            notes: None,
            tags: Vec::new(),
        }
    }
}

/// Partial update of an item's descriptive fields. Custody is not editable here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub quantity: Option<u32>,
    pub notes: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
}

/// Item input validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValidationError {
    /// Name is blank after trim.
    BlankName,
    /// Quantity must be at least 1.
    ZeroQuantity,
}

impl std::fmt::Display for ItemValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "item name must not be blank"),
            Self::ZeroQuantity => write!(f, "item quantity must be at least 1"),
        }
    }
}

impl std::error::Error for ItemValidationError {}

impl NewItem {
    /// Trims text, normalizes tags and checks name/quantity.
    pub fn normalized(&self) -> Result<Self, ItemValidationError> {
        Ok(Self {
            name: normalize_name(&self.name)?,
            quantity: Some(check_quantity(self.quantity.unwrap_or(1))?),
            notes: normalize_optional_text(self.notes.clone()),
            tags: normalize_tags(&self.tags),
        })
    }
}

impl ItemPatch {
    /// Applies the same rules as `NewItem::normalized` to present fields.
    pub fn normalized(&self) -> Result<Self, ItemValidationError> {
        Ok(Self {
            name: self.name.as_deref().map(normalize_name).transpose()?,
            quantity: self.quantity.map(check_quantity).transpose()?,
            notes: self.notes.clone().map(normalize_optional_text),
            tags: self.tags.as_deref().map(normalize_tags),
        })
    }
}

fn normalize_name(value: &str) -> Result<String, ItemValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ItemValidationError::BlankName);
    }
    Ok(trimmed.to_string())
}

fn check_quantity(value: u32) -> Result<u32, ItemValidationError> {
    if value == 0 {
        return Err(ItemValidationError::ZeroQuantity);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::{ItemPatch, ItemValidationError, NewItem};

    #[test]
    fn new_item_defaults_quantity_and_trims() {
        let input = NewItem {
            name: "  HDMI cable ".to_string(),
            quantity: None,
            notes: Some(" ".to_string()),
            tags: vec!["AV".to_string(), "av".to_string()],
        };
        let normalized = input.normalized().unwrap();
        assert_eq!(normalized.name, "HDMI cable");
        assert_eq!(normalized.quantity, Some(1));
        assert_eq!(normalized.notes, None);
        assert_eq!(normalized.tags, vec!["av"]);
    }

    #[test]
    fn blank_name_and_zero_quantity_are_rejected() {
        assert_eq!(
            NewItem::named("   ").normalized().unwrap_err(),
            ItemValidationError::BlankName
        );
        let patch = ItemPatch {
            quantity: Some(0),
            ..ItemPatch::default()
        };
        assert_eq!(patch.normalized().unwrap_err(), ItemValidationError::ZeroQuantity);
    }
}
