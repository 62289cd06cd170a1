//! Acyclicity check for box parent-pointer mutations.
//!
//! # Responsibility
//! - Decide whether placing a box under a proposed parent closes a cycle.
//!
//! # Invariants
//! - Storage-agnostic: the caller supplies the parent lookup, so the same walk
//!   runs inside a write transaction or over an in-memory snapshot.
//! - A walk that revisits a node reports a cycle instead of looping; the
//!   pre-existing corruption is left for the integrity audit to surface.

use crate::model::box_record::BoxId;
use std::collections::HashSet;

/// Returns whether parenting `moving` under `proposed_parent` is unsafe.
///
/// `parent_of` returns the parent of a box, or `None` for a top-level box and
/// for a box id that does not resolve; both end the walk.
pub fn would_create_cycle<E>(
    moving: BoxId,
    proposed_parent: Option<BoxId>,
    mut parent_of: impl FnMut(BoxId) -> Result<Option<BoxId>, E>,
) -> Result<bool, E> {
    let Some(proposed_parent) = proposed_parent else {
        return Ok(false);
    };

    let mut visited = HashSet::new();
    let mut cursor = Some(proposed_parent);
    while let Some(current) = cursor {
        if current == moving {
            return Ok(true);
        }
        if !visited.insert(current) {
            return Ok(true);
        }
        cursor = parent_of(current)?;
    }
    Ok(false)
}
