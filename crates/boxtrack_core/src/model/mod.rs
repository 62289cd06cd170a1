//! Domain model for boxes, items and the human-facing box codes.
//!
//! # Responsibility
//! - Define the canonical records shared by store, services and callers.
//! - Own input normalization (short ids, tags, optional text fields).
//!
//! # Invariants
//! - Every box and item is identified by a stable UUID.
//! - `ShortId` values are always exactly 3 ASCII digits.
//! - Custody state is read-only on the records; only the custody engine
//!   writes it.

pub mod box_record;
pub mod item;
pub mod short_id;
pub mod tags;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in epoch milliseconds.
///
/// Clamps to `0` if the system clock is set before the Unix epoch.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

/// Trims optional free text and collapses blank values to `None`.
pub fn normalize_optional_text(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::normalize_optional_text;

    #[test]
    fn blank_text_becomes_none() {
        assert_eq!(normalize_optional_text(Some("   ".to_string())), None);
        assert_eq!(normalize_optional_text(None), None);
        assert_eq!(
            normalize_optional_text(Some("  garage shelf ".to_string())).as_deref(),
            Some("garage shelf")
        );
    }
}
