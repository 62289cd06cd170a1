//! Human-facing 3-digit box codes and their allocation.
//!
//! # Responsibility
//! - Parse and validate `ShortId` text.
//! - Describe closed short-id ranges (e.g. the reserved fixture band).
//! - Hand out unused ids sequentially through an explicit allocator value.
//!
//! # Invariants
//! - A `ShortId` always renders as exactly 3 ASCII digits.
//! - `ShortIdAllocator` never yields an id it was told is taken, nor one
//!   inside its excluded range.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

static SHORT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{3}$").expect("valid short id regex"));

const SHORT_ID_MAX: u16 = 999;

/// Validation failure for short-id text or range bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortIdError {
    /// Input is not exactly three ASCII digits.
    InvalidFormat(String),
    /// Range bounds are inverted or exceed `999`.
    InvalidRange { first: u16, last: u16 },
}

impl Display for ShortIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat(value) => {
                write!(f, "short id must be exactly 3 digits, got `{value}`")
            }
            Self::InvalidRange { first, last } => {
                write!(f, "invalid short id range {first:03}..={last:03}")
            }
        }
    }
}

impl Error for ShortIdError {}

/// Externally visible 3-digit box code, e.g. `"042"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShortId(u16);

impl ShortId {
    /// Parses trimmed text that must be exactly three ASCII digits.
    pub fn parse(value: &str) -> Result<Self, ShortIdError> {
        let trimmed = value.trim();
        if !SHORT_ID_RE.is_match(trimmed) {
            return Err(ShortIdError::InvalidFormat(value.to_string()));
        }
        trimmed
            .parse::<u16>()
            .map(Self)
            .map_err(|_| ShortIdError::InvalidFormat(value.to_string()))
    }

    /// Builds a short id from its numeric value (`0..=999`).
    pub fn from_number(value: u16) -> Result<Self, ShortIdError> {
        if value > SHORT_ID_MAX {
            return Err(ShortIdError::InvalidFormat(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn number(self) -> u16 {
        self.0
    }

    /// Canonical zero-padded text form stored in `boxes.short_id`.
    pub fn as_text(self) -> String {
        format!("{:03}", self.0)
    }
}

impl Display for ShortId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

impl TryFrom<String> for ShortId {
    type Error = ShortIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShortId> for String {
    fn from(value: ShortId) -> Self {
        value.as_text()
    }
}

/// Closed range of short ids, `first..=last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RangeBounds")]
pub struct ShortIdRange {
    first: ShortId,
    last: ShortId,
}

#[derive(Deserialize)]
struct RangeBounds {
    first: ShortId,
    last: ShortId,
}

impl TryFrom<RangeBounds> for ShortIdRange {
    type Error = ShortIdError;

    fn try_from(value: RangeBounds) -> Result<Self, Self::Error> {
        Self::new(value.first, value.last)
    }
}

impl ShortIdRange {
    pub fn new(first: ShortId, last: ShortId) -> Result<Self, ShortIdError> {
        if first > last {
            return Err(ShortIdError::InvalidRange {
                first: first.number(),
                last: last.number(),
            });
        }
        Ok(Self { first, last })
    }

    /// The band set aside for disposable fixture data: `500..=599`.
    pub fn reserved() -> Self {
        Self {
            first: ShortId(500),
            last: ShortId(599),
        }
    }

    /// Every representable short id: `000..=999`.
    pub fn full() -> Self {
        Self {
            first: ShortId(0),
            last: ShortId(SHORT_ID_MAX),
        }
    }

    pub fn first(&self) -> ShortId {
        self.first
    }

    pub fn last(&self) -> ShortId {
        self.last
    }

    pub fn contains(&self, id: ShortId) -> bool {
        self.first <= id && id <= self.last
    }

    pub fn len(&self) -> usize {
        usize::from(self.last.0 - self.first.0) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = ShortId> {
        (self.first.0..=self.last.0).map(ShortId)
    }
}

impl Display for ShortIdRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.first, self.last)
    }
}

/// Sequential allocator over a short-id range.
///
/// The cursor state lives in this value; callers thread it through one
/// seeding run and drop it afterwards.
#[derive(Debug, Clone)]
pub struct ShortIdAllocator {
    range: ShortIdRange,
    cursor: Option<u16>,
    taken: BTreeSet<ShortId>,
    excluded: Option<ShortIdRange>,
}

impl ShortIdAllocator {
    /// Starts at `range.first()` with no ids taken.
    pub fn new(range: ShortIdRange) -> Self {
        Self {
            range,
            cursor: Some(range.first.0),
            taken: BTreeSet::new(),
            excluded: None,
        }
    }

    /// Marks ids already in use; they are skipped.
    pub fn with_taken(mut self, taken: impl IntoIterator<Item = ShortId>) -> Self {
        self.taken.extend(taken);
        self
    }

    /// Skips an entire sub-range (used by full mode to step over the reserved band).
    pub fn excluding(mut self, excluded: ShortIdRange) -> Self {
        self.excluded = Some(excluded);
        self
    }

    pub fn range(&self) -> ShortIdRange {
        self.range
    }

    /// Number of ids this allocator can still hand out.
    pub fn remaining(&self) -> usize {
        let Some(cursor) = self.cursor else {
            return 0;
        };
        (cursor..=self.range.last.0)
            .map(ShortId)
            .filter(|id| self.is_free(*id))
            .count()
    }

    /// Returns the next unused id, or `None` once the range is exhausted.
    pub fn next_id(&mut self) -> Option<ShortId> {
        while let Some(value) = self.cursor {
            self.cursor = if value < self.range.last.0 {
                Some(value + 1)
            } else {
                None
            };
            let candidate = ShortId(value);
            if self.is_free(candidate) {
                self.taken.insert(candidate);
                return Some(candidate);
            }
        }
        None
    }

    fn is_free(&self, id: ShortId) -> bool {
        !self.taken.contains(&id)
            && !self
                .excluded
                .is_some_and(|excluded| excluded.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::{ShortId, ShortIdAllocator, ShortIdError, ShortIdRange};

    fn sid(value: &str) -> ShortId {
        ShortId::parse(value).expect("valid short id")
    }

    #[test]
    fn parse_accepts_three_digits_only() {
        assert_eq!(sid("042").number(), 42);
        assert_eq!(sid(" 500 ").as_text(), "500");
        for bad in ["42", "0420", "4a2", "", "-01", "１２３"] {
            assert!(
                matches!(ShortId::parse(bad), Err(ShortIdError::InvalidFormat(_))),
                "`{bad}` should be rejected"
            );
        }
    }

    #[test]
    fn serde_uses_padded_text() {
        let json = serde_json::to_string(&sid("007")).unwrap();
        assert_eq!(json, "\"007\"");
        let back: ShortId = serde_json::from_str("\"123\"").unwrap();
        assert_eq!(back, sid("123"));
        assert!(serde_json::from_str::<ShortId>("\"12\"").is_err());
    }

    #[test]
    fn reserved_range_bounds() {
        let reserved = ShortIdRange::reserved();
        assert_eq!(reserved.len(), 100);
        assert!(reserved.contains(sid("500")));
        assert!(reserved.contains(sid("599")));
        assert!(!reserved.contains(sid("499")));
        assert!(!reserved.contains(sid("600")));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = ShortIdRange::new(sid("200"), sid("100")).unwrap_err();
        assert_eq!(
            err,
            ShortIdError::InvalidRange {
                first: 200,
                last: 100
            }
        );
    }

    #[test]
    fn allocator_skips_taken_and_excluded_ids() {
        let range = ShortIdRange::new(sid("498"), sid("601")).unwrap();
        let mut allocator = ShortIdAllocator::new(range)
            .with_taken([sid("499")])
            .excluding(ShortIdRange::reserved());

        assert_eq!(allocator.remaining(), 3);
        assert_eq!(allocator.next_id(), Some(sid("498")));
        assert_eq!(allocator.next_id(), Some(sid("600")));
        assert_eq!(allocator.next_id(), Some(sid("601")));
        assert_eq!(allocator.next_id(), None);
        assert_eq!(allocator.remaining(), 0);
    }

    #[test]
    fn allocator_stops_at_999() {
        let range = ShortIdRange::new(sid("998"), sid("999")).unwrap();
        let mut allocator = ShortIdAllocator::new(range);
        assert_eq!(allocator.next_id(), Some(sid("998")));
        assert_eq!(allocator.next_id(), Some(sid("999")));
        assert_eq!(allocator.next_id(), None);
    }
}
