//! Container store use-case service.
//!
//! # Responsibility
//! - Create, look up, list, update and reparent boxes.
//! - Issue unused short ids for new boxes.
//! - Expose the cycle check as a read-only query.
//!
//! # Invariants
//! - Parent changes only go through `reparent_box`, whose authoritative cycle
//!   check runs inside the repository write transaction.
//! - Auto-issued short ids never fall in the reserved fixture band this
//!   service was built with; seeding and wiping must use the same band.

use crate::cycle_guard;
use crate::model::box_record::{BoxId, BoxPatch, BoxRecord, NewBox};
use crate::model::normalize_optional_text;
use crate::model::short_id::{ShortId, ShortIdAllocator, ShortIdRange};
use crate::model::tags::normalize_tags;
use crate::repo::box_repo::{BoxListQuery, BoxRepository};
use crate::service::error::{CoreError, CoreResult, EntityRef};
use crate::service::logged;
use log::info;

const MODULE: &str = "box_service";

/// Container store service facade.
pub struct BoxService<R: BoxRepository> {
    repo: R,
    reserved: ShortIdRange,
}

impl<R: BoxRepository> BoxService<R> {
    /// Creates service from repository implementation, keeping auto-issued
    /// ids out of the default reserved band.
    pub fn new(repo: R) -> Self {
        Self::with_reserved(repo, ShortIdRange::reserved())
    }

    /// Creates service whose auto-issued ids avoid `reserved`.
    pub fn with_reserved(repo: R, reserved: ShortIdRange) -> Self {
        Self { repo, reserved }
    }

    /// Band skipped when issuing short ids.
    pub fn reserved_range(&self) -> ShortIdRange {
        self.reserved
    }

    /// Creates one box, issuing the lowest free short id when none is given.
    pub fn create_box(&self, input: NewBox) -> CoreResult<BoxRecord> {
        logged("box_create", MODULE, || {
            let short_id = match input.short_id {
                Some(short_id) => short_id,
                None => self.next_free_short_id(ShortIdRange::full())?,
            };
            let normalized = NewBox {
                short_id: Some(short_id),
                label: normalize_optional_text(input.label),
                location: normalize_optional_text(input.location),
                description: normalize_optional_text(input.description),
                notes: normalize_optional_text(input.notes),
                tags: normalize_tags(&input.tags),
                parent_uuid: input.parent_uuid,
            };
            let created = self.repo.create_box(short_id, &normalized)?;
            info!(
                "event=box_create module={MODULE} status=ok box_uuid={} short_id={} has_parent={}",
                created.box_uuid,
                created.short_id,
                created.parent_uuid.is_some()
            );
            Ok(created)
        })
    }

    /// Loads one box by durable id.
    pub fn get_box(&self, box_uuid: BoxId) -> CoreResult<Option<BoxRecord>> {
        self.repo.get_box(box_uuid).map_err(Into::into)
    }

    /// Loads one box by durable id, failing with `NotFound` when absent.
    pub fn require_box(&self, box_uuid: BoxId) -> CoreResult<BoxRecord> {
        self.get_box(box_uuid)?
            .ok_or(CoreError::NotFound(EntityRef::Box(box_uuid)))
    }

    /// Loads one box by its 3-digit code text.
    pub fn find_box_by_short_id(&self, short_id: &str) -> CoreResult<Option<BoxRecord>> {
        let short_id = ShortId::parse(short_id)?;
        self.repo.find_box_by_short_id(short_id).map_err(Into::into)
    }

    /// Lists boxes by parent filter and optional short-id range.
    pub fn list_boxes(&self, query: &BoxListQuery) -> CoreResult<Vec<BoxRecord>> {
        self.repo.list_boxes(query).map_err(Into::into)
    }

    /// Updates descriptive fields and/or renumbers the box.
    pub fn update_box(&self, box_uuid: BoxId, patch: BoxPatch) -> CoreResult<BoxRecord> {
        logged("box_update", MODULE, || {
            let normalized = BoxPatch {
                short_id: patch.short_id,
                label: patch.label.map(normalize_optional_text),
                location: patch.location.map(normalize_optional_text),
                description: patch.description.map(normalize_optional_text),
                notes: patch.notes.map(normalize_optional_text),
                tags: patch.tags.as_deref().map(normalize_tags),
            };
            if normalized.is_empty() {
                return self.require_box(box_uuid);
            }
            let updated = self.repo.update_box(box_uuid, &normalized)?;
            info!(
                "event=box_update module={MODULE} status=ok box_uuid={} short_id={}",
                updated.box_uuid, updated.short_id
            );
            Ok(updated)
        })
    }

    /// Moves a box under `new_parent`, or to top level with `None`.
    ///
    /// # Errors
    /// - `NotFound` when either box does not resolve.
    /// - `Cycle` when the new parent is the box itself or one of its
    ///   descendants; nothing is written.
    pub fn reparent_box(
        &self,
        box_uuid: BoxId,
        new_parent: Option<BoxId>,
    ) -> CoreResult<BoxRecord> {
        logged("box_reparent", MODULE, || {
            let updated = self.repo.reparent_box(box_uuid, new_parent)?;
            info!(
                "event=box_reparent module={MODULE} status=ok box_uuid={} parent_uuid={}",
                box_uuid,
                new_parent.map_or_else(|| "none".to_string(), |id| id.to_string())
            );
            Ok(updated)
        })
    }

    /// Read-only cycle check over committed state.
    ///
    /// Advisory only: `reparent_box` repeats the walk inside its write
    /// transaction, and that result is the one that counts.
    pub fn would_create_cycle(
        &self,
        moving: BoxId,
        proposed_parent: Option<BoxId>,
    ) -> CoreResult<bool> {
        cycle_guard::would_create_cycle(moving, proposed_parent, |current| -> CoreResult<_> {
            Ok(self
                .repo
                .get_box(current)?
                .and_then(|record| record.parent_uuid))
        })
    }

    /// Lowest unused short id in `range`, skipping the reserved band unless
    /// `range` lies entirely inside it.
    pub fn next_free_short_id(&self, range: ShortIdRange) -> CoreResult<ShortId> {
        let taken = self.repo.taken_short_ids(range)?;
        let reserved = self.reserved;
        let mut allocator = ShortIdAllocator::new(range).with_taken(taken);
        if !(reserved.contains(range.first()) && reserved.contains(range.last())) {
            allocator = allocator.excluding(reserved);
        }
        allocator.next_id().ok_or(CoreError::OutOfIds {
            range,
            requested: 1,
            available: 0,
        })
    }
}
