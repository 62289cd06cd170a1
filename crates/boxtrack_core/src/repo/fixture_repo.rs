//! Bulk wipe persistence for fixture data.
//!
//! # Responsibility
//! - Delete all boxes in a short-id range together with the items they hold.
//! - Delete the whole dataset for full reseeding.
//!
//! # Invariants
//! - A range wipe never deletes a box outside the range, nor an item not held
//!   by a box inside the range.
//! - Boxes outside the range whose parent is wiped become top-level in the
//!   same transaction.

use crate::model::box_record::BoxId;
use crate::model::short_id::ShortIdRange;
use crate::repo::sql_support::{
    begin_immediate, ensure_store_ready, id_texts, parse_uuid, placeholders, MAX_BIND_PARAMS,
};
use crate::repo::store_error::StoreResult;
use rusqlite::{params, params_from_iter, Connection};
use serde::Serialize;

/// Counts reported by a wipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WipeReport {
    pub boxes_deleted: usize,
    pub items_deleted: usize,
    /// Boxes outside the wiped set that lost their parent.
    pub boxes_released: usize,
}

/// Repository interface for fixture wipes.
pub trait FixtureRepository {
    /// Deletes every box whose short id is in `range`, plus the items they hold.
    fn wipe_range(&self, range: ShortIdRange) -> StoreResult<WipeReport>;
    /// Deletes every box and every item.
    fn wipe_everything(&self) -> StoreResult<WipeReport>;
}

/// SQLite-backed fixture maintenance.
pub struct SqliteFixtureRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFixtureRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_store_ready(conn)?;
        Ok(Self { conn })
    }
}

impl FixtureRepository for SqliteFixtureRepository<'_> {
    fn wipe_range(&self, range: ShortIdRange) -> StoreResult<WipeReport> {
        let tx = begin_immediate(self.conn)?;

        let mut box_ids: Vec<BoxId> = Vec::new();
        {
            let mut stmt = tx.prepare(
                "SELECT box_uuid
                 FROM boxes
                 WHERE short_id BETWEEN ?1 AND ?2;",
            )?;
            let mut rows = stmt.query(params![range.first().as_text(), range.last().as_text()])?;
            while let Some(row) = rows.next()? {
                let text: String = row.get(0)?;
                box_ids.push(parse_uuid(&text, "boxes.box_uuid")?);
            }
        }

        let mut report = WipeReport::default();
        for chunk in id_texts(&box_ids).chunks(MAX_BIND_PARAMS) {
            let marks = placeholders(chunk.len());
            report.items_deleted += tx.execute(
                &format!(
                    "DELETE FROM items
                     WHERE item_uuid IN (
                         SELECT item_uuid FROM box_items WHERE box_uuid IN ({marks})
                     );"
                ),
                params_from_iter(chunk.iter()),
            )?;
        }

        // Release outside children before any parent row disappears.
        report.boxes_released = tx.execute(
            "UPDATE boxes
             SET parent_uuid = NULL,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE short_id NOT BETWEEN ?1 AND ?2
               AND parent_uuid IN (
                   SELECT box_uuid FROM boxes WHERE short_id BETWEEN ?1 AND ?2
               );",
            params![range.first().as_text(), range.last().as_text()],
        )?;
        report.boxes_deleted = tx.execute(
            "DELETE FROM boxes WHERE short_id BETWEEN ?1 AND ?2;",
            params![range.first().as_text(), range.last().as_text()],
        )?;

        tx.commit()?;
        Ok(report)
    }

    fn wipe_everything(&self) -> StoreResult<WipeReport> {
        let tx = begin_immediate(self.conn)?;
        let items_deleted = tx.execute("DELETE FROM items;", [])?;
        tx.execute("UPDATE boxes SET parent_uuid = NULL;", [])?;
        let boxes_deleted = tx.execute("DELETE FROM boxes;", [])?;
        tx.commit()?;
        Ok(WipeReport {
            boxes_deleted,
            items_deleted,
            boxes_released: 0,
        })
    }
}
