//! Custody transfer persistence: which box, if any, holds each item.
//!
//! # Responsibility
//! - Apply attach/detach/move/empty/delete as single SQLite transactions.
//! - Keep `box_items` membership and `items.orphaned_since` in lockstep.
//!
//! # Invariants
//! - Every method runs inside one `BEGIN IMMEDIATE` transaction: either all of
//!   its membership and timestamp writes land, or none do.
//! - `box_items.item_uuid` is unique, so an item is held by at most one box.
//! - A held item has `orphaned_since = NULL`; an unheld item has it set.
//! - Moves re-point the single membership row; there is no window with zero
//!   or two holders.
//! - Custody rows found inconsistent on entry are reported as
//!   `InvariantViolation` and left untouched.

use crate::model::box_record::BoxId;
use crate::model::item::{ItemId, ItemRecord, NewItem};
use crate::repo::item_repo::insert_item_row;
use crate::repo::sql_support::{
    add_membership, begin_immediate, ensure_box_exists, ensure_store_ready, load_required_item,
    next_position, orphan_items_of_boxes, parse_uuid, remove_membership, required_item_custody,
    set_orphaned_since, touch_box,
};
use crate::repo::store_error::{StoreError, StoreResult};
use rusqlite::{params, Connection};
use serde::Serialize;

/// Result of attaching one item to a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "from_box")]
pub enum AttachOutcome {
    /// The item was orphaned and is now held by the box.
    Added,
    /// The box already held the item; only the timestamp was cleared.
    AlreadyPresent,
    /// The item was held by another box and custody moved here.
    TransferredFrom(BoxId),
}

/// Counts reported by a batch attach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttachManyOutcome {
    /// Newly placed into the box (from orphaned or from another box).
    pub added: usize,
    /// Already held by the box before the call.
    pub already_present: usize,
}

/// Result of moving one item between boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    pub item_uuid: ItemId,
    pub dest_uuid: BoxId,
    /// Whether the source box actually held the item before the move.
    pub source_held: bool,
}

/// Result of emptying a box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EmptyBoxOutcome {
    /// The box held nothing; no write happened.
    NothingToDo { box_uuid: BoxId },
    /// Items were orphaned with one shared timestamp.
    Emptied {
        box_uuid: BoxId,
        orphaned_count: usize,
        /// Captured ids, in former attach order, so callers can undo.
        item_ids: Vec<ItemId>,
        orphaned_since: i64,
    },
}

impl EmptyBoxOutcome {
    pub fn orphaned_count(&self) -> usize {
        match self {
            Self::NothingToDo { .. } => 0,
            Self::Emptied { orphaned_count, .. } => *orphaned_count,
        }
    }
}

/// Result of deleting one box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedBox {
    pub box_uuid: BoxId,
    /// Items the box held directly; now orphaned.
    pub orphaned_item_ids: Vec<ItemId>,
    /// Direct children; now top-level with their own items intact.
    pub released_child_ids: Vec<BoxId>,
}

/// Repository interface for custody transfers.
pub trait CustodyRepository {
    fn attach(&self, box_uuid: BoxId, item_uuid: ItemId) -> StoreResult<AttachOutcome>;
    fn attach_many(&self, box_uuid: BoxId, item_uuids: &[ItemId])
        -> StoreResult<AttachManyOutcome>;
    fn detach(&self, box_uuid: BoxId, item_uuid: ItemId, now: i64) -> StoreResult<()>;
    fn move_item(
        &self,
        source_uuid: BoxId,
        dest_uuid: BoxId,
        item_uuid: ItemId,
    ) -> StoreResult<MoveOutcome>;
    fn empty_box(&self, box_uuid: BoxId, now: i64) -> StoreResult<EmptyBoxOutcome>;
    fn delete_box(&self, box_uuid: BoxId, now: i64) -> StoreResult<DeletedBox>;
    fn delete_all_boxes(&self, now: i64) -> StoreResult<usize>;
    /// Creates an item already held by the box.
    fn create_item_in_box(&self, box_uuid: BoxId, input: &NewItem) -> StoreResult<ItemRecord>;
}

/// SQLite-backed custody engine storage.
pub struct SqliteCustodyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCustodyRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_store_ready(conn)?;
        Ok(Self { conn })
    }
}

impl CustodyRepository for SqliteCustodyRepository<'_> {
    fn attach(&self, box_uuid: BoxId, item_uuid: ItemId) -> StoreResult<AttachOutcome> {
        let tx = begin_immediate(self.conn)?;
        ensure_box_exists(&tx, box_uuid)?;
        let outcome = attach_in_tx(&tx, box_uuid, item_uuid)?;
        tx.commit()?;
        Ok(outcome)
    }

    fn attach_many(
        &self,
        box_uuid: BoxId,
        item_uuids: &[ItemId],
    ) -> StoreResult<AttachManyOutcome> {
        let tx = begin_immediate(self.conn)?;
        ensure_box_exists(&tx, box_uuid)?;
        let mut outcome = AttachManyOutcome::default();
        for item_uuid in item_uuids {
            match attach_in_tx(&tx, box_uuid, *item_uuid)? {
                AttachOutcome::AlreadyPresent => outcome.already_present += 1,
                AttachOutcome::Added | AttachOutcome::TransferredFrom(_) => outcome.added += 1,
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    fn detach(&self, box_uuid: BoxId, item_uuid: ItemId, now: i64) -> StoreResult<()> {
        let tx = begin_immediate(self.conn)?;
        ensure_box_exists(&tx, box_uuid)?;
        let custody = required_item_custody(&tx, item_uuid)?;
        if custody.holder != Some(box_uuid) {
            return Err(StoreError::NotAttached {
                box_uuid,
                item_uuid,
            });
        }

        remove_membership(&tx, box_uuid, item_uuid)?;
        set_orphaned_since(&tx, item_uuid, Some(now))?;
        touch_box(&tx, box_uuid)?;
        tx.commit()?;
        Ok(())
    }

    fn move_item(
        &self,
        source_uuid: BoxId,
        dest_uuid: BoxId,
        item_uuid: ItemId,
    ) -> StoreResult<MoveOutcome> {
        let tx = begin_immediate(self.conn)?;
        ensure_box_exists(&tx, source_uuid)?;
        ensure_box_exists(&tx, dest_uuid)?;
        let custody = required_item_custody(&tx, item_uuid)?;
        let source_held = custody.holder == Some(source_uuid);

        if custody.holder != Some(dest_uuid) {
            let position = next_position(&tx, dest_uuid)?;
            if custody.holder.is_some() {
                tx.execute(
                    "UPDATE box_items
                     SET box_uuid = ?2,
                         position = ?3
                     WHERE item_uuid = ?1;",
                    params![item_uuid.to_string(), dest_uuid.to_string(), position],
                )?;
            } else {
                add_membership(&tx, dest_uuid, item_uuid)?;
            }
            if let Some(previous) = custody.holder {
                touch_box(&tx, previous)?;
            }
            touch_box(&tx, dest_uuid)?;
        }
        set_orphaned_since(&tx, item_uuid, None)?;

        tx.commit()?;
        Ok(MoveOutcome {
            item_uuid,
            dest_uuid,
            source_held,
        })
    }

    fn empty_box(&self, box_uuid: BoxId, now: i64) -> StoreResult<EmptyBoxOutcome> {
        let tx = begin_immediate(self.conn)?;
        ensure_box_exists(&tx, box_uuid)?;

        let item_ids = orphan_items_of_boxes(&tx, &[box_uuid], now)?;
        if item_ids.is_empty() {
            return Ok(EmptyBoxOutcome::NothingToDo { box_uuid });
        }
        touch_box(&tx, box_uuid)?;
        tx.commit()?;

        Ok(EmptyBoxOutcome::Emptied {
            box_uuid,
            orphaned_count: item_ids.len(),
            item_ids,
            orphaned_since: now,
        })
    }

    fn delete_box(&self, box_uuid: BoxId, now: i64) -> StoreResult<DeletedBox> {
        let tx = begin_immediate(self.conn)?;
        ensure_box_exists(&tx, box_uuid)?;

        let orphaned_item_ids = orphan_items_of_boxes(&tx, &[box_uuid], now)?;

        let mut released_child_ids = Vec::new();
        {
            let mut stmt = tx.prepare(
                "SELECT box_uuid
                 FROM boxes
                 WHERE parent_uuid = ?1
                 ORDER BY short_id ASC;",
            )?;
            let mut rows = stmt.query([box_uuid.to_string()])?;
            while let Some(row) = rows.next()? {
                let text: String = row.get(0)?;
                released_child_ids.push(parse_uuid(&text, "boxes.box_uuid")?);
            }
        }
        tx.execute(
            "UPDATE boxes
             SET parent_uuid = NULL,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE parent_uuid = ?1;",
            [box_uuid.to_string()],
        )?;
        tx.execute(
            "DELETE FROM boxes WHERE box_uuid = ?1;",
            [box_uuid.to_string()],
        )?;

        tx.commit()?;
        Ok(DeletedBox {
            box_uuid,
            orphaned_item_ids,
            released_child_ids,
        })
    }

    fn delete_all_boxes(&self, now: i64) -> StoreResult<usize> {
        let tx = begin_immediate(self.conn)?;
        tx.execute(
            "UPDATE items
             SET orphaned_since = ?1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE item_uuid IN (SELECT item_uuid FROM box_items);",
            [now],
        )?;
        tx.execute("DELETE FROM box_items;", [])?;
        tx.execute("UPDATE boxes SET parent_uuid = NULL;", [])?;
        let deleted = tx.execute("DELETE FROM boxes;", [])?;
        tx.commit()?;
        Ok(deleted)
    }

    fn create_item_in_box(&self, box_uuid: BoxId, input: &NewItem) -> StoreResult<ItemRecord> {
        let tx = begin_immediate(self.conn)?;
        ensure_box_exists(&tx, box_uuid)?;
        let item_uuid = insert_item_row(&tx, input, None)?;
        add_membership(&tx, box_uuid, item_uuid)?;
        touch_box(&tx, box_uuid)?;
        let created = load_required_item(&tx, item_uuid)?;
        tx.commit()?;
        Ok(created)
    }
}

fn attach_in_tx(conn: &Connection, box_uuid: BoxId, item_uuid: ItemId) -> StoreResult<AttachOutcome> {
    let custody = required_item_custody(conn, item_uuid)?;
    let outcome = match custody.holder {
        Some(holder) if holder == box_uuid => AttachOutcome::AlreadyPresent,
        Some(holder) => {
            let position = next_position(conn, box_uuid)?;
            conn.execute(
                "UPDATE box_items
                 SET box_uuid = ?2,
                     position = ?3
                 WHERE item_uuid = ?1;",
                params![item_uuid.to_string(), box_uuid.to_string(), position],
            )?;
            touch_box(conn, holder)?;
            touch_box(conn, box_uuid)?;
            AttachOutcome::TransferredFrom(holder)
        }
        None => {
            add_membership(conn, box_uuid, item_uuid)?;
            touch_box(conn, box_uuid)?;
            AttachOutcome::Added
        }
    };
    set_orphaned_since(conn, item_uuid, None)?;
    Ok(outcome)
}
