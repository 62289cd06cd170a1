//! Seeding configuration.
//!
//! # Responsibility
//! - Carry the reserved fixture band and the full-mode starting id.
//!
//! # Invariants
//! - Defaults are `500..=599` reserved and `"100"` as the full-mode start.
//! - Deserialized configs go through `ShortId`/`ShortIdRange` validation, so a
//!   malformed code or inverted range is rejected at load time.

use crate::model::short_id::{ShortId, ShortIdRange};
use serde::{Deserialize, Serialize};

const DEFAULT_FULL_START: u16 = 100;

/// Id bands used by the seeding engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Band owned by reserved-range seeding and wiping.
    pub reserved: ShortIdRange,
    /// First id handed out by full-mode seeding.
    pub full_start: ShortId,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            reserved: ShortIdRange::reserved(),
            full_start: ShortId::from_number(DEFAULT_FULL_START)
                .unwrap_or_else(|_| ShortIdRange::full().first()),
        }
    }
}

impl SeedConfig {
    /// Range walked by full-mode seeding: `full_start..=999`.
    pub fn full_range(&self) -> ShortIdRange {
        ShortIdRange::new(self.full_start, ShortIdRange::full().last())
            .unwrap_or_else(|_| ShortIdRange::full())
    }
}
