//! Custody transfer engine: the only entry point that changes which box holds
//! an item.
//!
//! # Responsibility
//! - Attach, detach, move, bulk-empty and delete boxes while keeping each item
//!   held by at most one box and `orphaned_since` in step with custody.
//! - Stamp orphaning operations with a single timestamp taken once per call.
//!
//! # Invariants
//! - `move_item(b, b, i)` behaves exactly as `attach(b, i)`.
//! - Deleting a box collapses one level: its items are orphaned, its direct
//!   children become top-level, deeper descendants are untouched.

use crate::model::box_record::BoxId;
use crate::model::item::{ItemId, ItemRecord, NewItem};
use crate::model::now_epoch_ms;
use crate::repo::custody_repo::{
    AttachManyOutcome, AttachOutcome, CustodyRepository, DeletedBox, EmptyBoxOutcome,
    MoveOutcome,
};
use crate::service::error::CoreResult;
use crate::service::logged;
use log::info;

const MODULE: &str = "custody_service";

/// Custody transfer service facade.
pub struct CustodyService<R: CustodyRepository> {
    repo: R,
}

impl<R: CustodyRepository> CustodyService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Places an item in a box. Idempotent; clears `orphaned_since`.
    ///
    /// An item held by another box is transferred rather than duplicated.
    pub fn attach(&self, box_uuid: BoxId, item_uuid: ItemId) -> CoreResult<AttachOutcome> {
        logged("item_attach", MODULE, || {
            let outcome = self.repo.attach(box_uuid, item_uuid)?;
            info!(
                "event=item_attach module={MODULE} status=ok box_uuid={box_uuid} item_uuid={item_uuid} outcome={outcome:?}"
            );
            Ok(outcome)
        })
    }

    /// Batch attach; all-or-nothing on unknown ids, counts otherwise.
    pub fn attach_many(
        &self,
        box_uuid: BoxId,
        item_uuids: &[ItemId],
    ) -> CoreResult<AttachManyOutcome> {
        logged("item_attach_many", MODULE, || {
            let outcome = self.repo.attach_many(box_uuid, item_uuids)?;
            info!(
                "event=item_attach_many module={MODULE} status=ok box_uuid={box_uuid} added={} already_present={}",
                outcome.added, outcome.already_present
            );
            Ok(outcome)
        })
    }

    /// Removes an item from a box and marks it orphaned now.
    ///
    /// # Errors
    /// - `NotFound` when the box or item does not exist.
    /// - `NotAttached` when the box does not hold the item.
    pub fn detach(&self, box_uuid: BoxId, item_uuid: ItemId) -> CoreResult<()> {
        logged("item_detach", MODULE, || {
            self.repo.detach(box_uuid, item_uuid, now_epoch_ms())?;
            info!(
                "event=item_detach module={MODULE} status=ok box_uuid={box_uuid} item_uuid={item_uuid}"
            );
            Ok(())
        })
    }

    /// Transfers an item from `source_uuid` to `dest_uuid`.
    ///
    /// Absence from the source is tolerated and reported in the outcome. The
    /// membership row is re-pointed in one transaction, so no reader ever sees
    /// the item in two boxes or in none.
    pub fn move_item(
        &self,
        source_uuid: BoxId,
        dest_uuid: BoxId,
        item_uuid: ItemId,
    ) -> CoreResult<MoveOutcome> {
        if source_uuid == dest_uuid {
            let outcome = self.attach(dest_uuid, item_uuid)?;
            return Ok(MoveOutcome {
                item_uuid,
                dest_uuid,
                source_held: outcome == AttachOutcome::AlreadyPresent,
            });
        }

        logged("item_move", MODULE, || {
            let outcome = self.repo.move_item(source_uuid, dest_uuid, item_uuid)?;
            info!(
                "event=item_move module={MODULE} status=ok source_uuid={source_uuid} dest_uuid={dest_uuid} item_uuid={item_uuid} source_held={}",
                outcome.source_held
            );
            Ok(outcome)
        })
    }

    /// Orphans every item in a box with one shared timestamp.
    ///
    /// Returns `NothingToDo` (not an error) when the box is already empty.
    pub fn empty_box(&self, box_uuid: BoxId) -> CoreResult<EmptyBoxOutcome> {
        logged("box_empty", MODULE, || {
            let outcome = self.repo.empty_box(box_uuid, now_epoch_ms())?;
            match &outcome {
                EmptyBoxOutcome::NothingToDo { .. } => info!(
                    "event=box_empty module={MODULE} status=noop box_uuid={box_uuid}"
                ),
                EmptyBoxOutcome::Emptied { orphaned_count, .. } => info!(
                    "event=box_empty module={MODULE} status=ok box_uuid={box_uuid} orphaned_count={orphaned_count}"
                ),
            }
            Ok(outcome)
        })
    }

    /// Deletes one box, orphaning its items and releasing its children.
    pub fn delete_box(&self, box_uuid: BoxId) -> CoreResult<DeletedBox> {
        logged("box_delete", MODULE, || {
            let deleted = self.repo.delete_box(box_uuid, now_epoch_ms())?;
            info!(
                "event=box_delete module={MODULE} status=ok box_uuid={box_uuid} orphaned_count={} released_children={}",
                deleted.orphaned_item_ids.len(),
                deleted.released_child_ids.len()
            );
            Ok(deleted)
        })
    }

    /// Deletes every box after orphaning every held item.
    pub fn delete_all_boxes(&self) -> CoreResult<usize> {
        logged("box_delete_all", MODULE, || {
            let deleted = self.repo.delete_all_boxes(now_epoch_ms())?;
            info!("event=box_delete_all module={MODULE} status=ok boxes_deleted={deleted}");
            Ok(deleted)
        })
    }

    /// Creates an item already held by `box_uuid`, atomically.
    pub fn create_item_in_box(&self, box_uuid: BoxId, input: &NewItem) -> CoreResult<ItemRecord> {
        logged("item_create_attached", MODULE, || {
            let normalized = input.normalized()?;
            let created = self.repo.create_item_in_box(box_uuid, &normalized)?;
            info!(
                "event=item_create_attached module={MODULE} status=ok box_uuid={box_uuid} item_uuid={}",
                created.item_uuid
            );
            Ok(created)
        })
    }
}
