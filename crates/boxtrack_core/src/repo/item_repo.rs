//! Item repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD over the `items` table and item tags.
//! - Offer the batched id lookup used by tree materialization.
//!
//! # Invariants
//! - Items created here start orphaned (`orphaned_since = now`).
//! - Custody membership is never written here, except that deleting an item
//!   cascades to its membership row in the same statement.

use crate::model::box_record::BoxId;
use crate::model::item::{ItemId, ItemPatch, ItemRecord, NewItem};
use crate::repo::sql_support::{
    begin_immediate, ensure_store_ready, id_texts, item_custody, load_required_item, placeholders,
    query_items, replace_tags, TagOwner, ITEM_SELECT_SQL, MAX_BIND_PARAMS,
};
use crate::repo::snapshot::{begin_read_snapshot, ReadSnapshot};
use crate::repo::store_error::{StoreError, StoreResult};
use rusqlite::{params, params_from_iter, Connection};
use uuid::Uuid;

/// Repository interface for the item store.
pub trait ItemRepository {
    /// Creates one orphaned item stamped with `orphaned_since = now`.
    fn create_item(&self, input: &NewItem, now: i64) -> StoreResult<ItemRecord>;
    /// Loads one item by id.
    fn get_item(&self, item_uuid: ItemId) -> StoreResult<Option<ItemRecord>>;
    /// Loads many items in one batched fetch. Unknown ids are skipped.
    fn get_items(&self, item_uuids: &[ItemId]) -> StoreResult<Vec<ItemRecord>>;
    /// Lists items held by no box, longest-orphaned first.
    fn list_orphaned_items(&self) -> StoreResult<Vec<ItemRecord>>;
    /// Applies a descriptive patch; custody is untouched.
    fn update_item(&self, item_uuid: ItemId, patch: &ItemPatch) -> StoreResult<ItemRecord>;
    /// Deletes one item and its custody membership.
    fn delete_item(&self, item_uuid: ItemId) -> StoreResult<()>;
    /// Returns the box currently holding the item, if any.
    fn holder_of(&self, item_uuid: ItemId) -> StoreResult<Option<BoxId>>;
    /// Pins one committed view for the reads that follow, until the guard drops.
    fn begin_snapshot(&self) -> StoreResult<ReadSnapshot<'_>>;
}

/// SQLite-backed item store.
pub struct SqliteItemRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteItemRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_store_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ItemRepository for SqliteItemRepository<'_> {
    fn create_item(&self, input: &NewItem, now: i64) -> StoreResult<ItemRecord> {
        let tx = begin_immediate(self.conn)?;
        let item_uuid = insert_item_row(&tx, input, Some(now))?;
        let created = load_required_item(&tx, item_uuid)?;
        tx.commit()?;
        Ok(created)
    }

    fn get_item(&self, item_uuid: ItemId) -> StoreResult<Option<ItemRecord>> {
        let mut items = query_items(
            self.conn,
            &format!("{ITEM_SELECT_SQL} WHERE item_uuid = ?1;"),
            [item_uuid.to_string()],
        )?;
        Ok(items.pop())
    }

    fn get_items(&self, item_uuids: &[ItemId]) -> StoreResult<Vec<ItemRecord>> {
        let mut items = Vec::with_capacity(item_uuids.len());
        for chunk in id_texts(item_uuids).chunks(MAX_BIND_PARAMS) {
            let sql = format!(
                "{ITEM_SELECT_SQL}
                 WHERE item_uuid IN ({})
                 ORDER BY item_uuid ASC;",
                placeholders(chunk.len())
            );
            items.extend(query_items(self.conn, &sql, params_from_iter(chunk.iter()))?);
        }
        Ok(items)
    }

    fn list_orphaned_items(&self) -> StoreResult<Vec<ItemRecord>> {
        query_items(
            self.conn,
            &format!(
                "{ITEM_SELECT_SQL}
                 WHERE orphaned_since IS NOT NULL
                 ORDER BY orphaned_since ASC, item_uuid ASC;"
            ),
            [],
        )
    }

    fn update_item(&self, item_uuid: ItemId, patch: &ItemPatch) -> StoreResult<ItemRecord> {
        let tx = begin_immediate(self.conn)?;
        let current = load_required_item(&tx, item_uuid)?;

        let notes = match &patch.notes {
            Some(value) => value.clone(),
            None => current.notes.clone(),
        };
        tx.execute(
            "UPDATE items
             SET name = ?2,
                 quantity = ?3,
                 notes = ?4,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE item_uuid = ?1;",
            params![
                item_uuid.to_string(),
                patch.name.as_deref().unwrap_or(current.name.as_str()),
                patch.quantity.unwrap_or(current.quantity),
                notes,
            ],
        )?;
        if let Some(tags) = &patch.tags {
            replace_tags(&tx, TagOwner::Item, &item_uuid.to_string(), tags)?;
        }

        let updated = load_required_item(&tx, item_uuid)?;
        tx.commit()?;
        Ok(updated)
    }

    fn delete_item(&self, item_uuid: ItemId) -> StoreResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM items WHERE item_uuid = ?1;",
            [item_uuid.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::ItemNotFound(item_uuid));
        }
        Ok(())
    }

    fn holder_of(&self, item_uuid: ItemId) -> StoreResult<Option<BoxId>> {
        item_custody(self.conn, item_uuid)?
            .map(|custody| custody.holder)
            .ok_or(StoreError::ItemNotFound(item_uuid))
    }

    fn begin_snapshot(&self) -> StoreResult<ReadSnapshot<'_>> {
        begin_read_snapshot(self.conn)
    }
}

/// Inserts the item row and its tags inside the caller's transaction.
///
/// `orphaned_since = None` is only valid when the caller attaches the item
/// before committing.
pub(crate) fn insert_item_row(
    conn: &Connection,
    input: &NewItem,
    orphaned_since: Option<i64>,
) -> StoreResult<ItemId> {
    let item_uuid = Uuid::new_v4();
    conn.execute(
        "INSERT INTO items (
            item_uuid,
            name,
            quantity,
            notes,
            orphaned_since
        ) VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            item_uuid.to_string(),
            input.name.as_str(),
            input.quantity.unwrap_or(1),
            input.notes.as_deref(),
            orphaned_since,
        ],
    )?;
    replace_tags(conn, TagOwner::Item, &item_uuid.to_string(), &input.tags)?;
    Ok(item_uuid)
}
