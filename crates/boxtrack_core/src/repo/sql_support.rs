//! SQL helpers shared by the box, item, custody and fixture repositories.
//!
//! # Responsibility
//! - Row parsing and batched hydration (tags, custody lists) for read models.
//! - Small existence/custody probes used inside write transactions.
//! - Schema readiness checks for repository constructors.
//!
//! # Invariants
//! - Batched `IN (...)` queries are chunked below SQLite's bind limit; one
//!   logical fetch therefore costs `ceil(n / MAX_BIND_PARAMS)` statements.
//! - Hydrated `item_ids` follow `position ASC`.

use crate::db::migrations::latest_version;
use crate::model::box_record::{BoxId, BoxRecord};
use crate::model::item::{ItemId, ItemRecord};
use crate::model::short_id::ShortId;
use crate::repo::store_error::{StoreError, StoreResult};
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row, Transaction,
    TransactionBehavior,
};
use std::collections::HashMap;
use uuid::Uuid;

pub(crate) const MAX_BIND_PARAMS: usize = 500;

pub(crate) const BOX_SELECT_SQL: &str = "SELECT
    box_uuid,
    short_id,
    label,
    location,
    description,
    notes,
    parent_uuid,
    created_at,
    updated_at
FROM boxes";

pub(crate) const ITEM_SELECT_SQL: &str = "SELECT
    item_uuid,
    name,
    quantity,
    notes,
    orphaned_since,
    created_at,
    updated_at
FROM items";

/// Which link table a tag set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagOwner {
    Box,
    Item,
}

impl TagOwner {
    fn link_table(self) -> &'static str {
        match self {
            Self::Box => "box_tags",
            Self::Item => "item_tags",
        }
    }

    fn owner_column(self) -> &'static str {
        match self {
            Self::Box => "box_uuid",
            Self::Item => "item_uuid",
        }
    }
}

/// Custody probe result for one existing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ItemCustody {
    pub holder: Option<BoxId>,
    pub orphaned_since: Option<i64>,
}

/// Opens a `BEGIN IMMEDIATE` transaction on a shared connection reference.
pub(crate) fn begin_immediate(conn: &Connection) -> StoreResult<Transaction<'_>> {
    Ok(Transaction::new_unchecked(
        conn,
        TransactionBehavior::Immediate,
    )?)
}

pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

pub(crate) fn id_texts(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}

/// Runs a box select and hydrates tags and custody lists in batch.
pub(crate) fn query_boxes(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StoreResult<Vec<BoxRecord>> {
    let mut boxes = Vec::new();
    {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        while let Some(row) = rows.next()? {
            boxes.push(parse_box_row(row)?);
        }
    }
    hydrate_boxes(conn, &mut boxes)?;
    Ok(boxes)
}

/// Runs an item select and hydrates tags in batch.
pub(crate) fn query_items(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StoreResult<Vec<ItemRecord>> {
    let mut items = Vec::new();
    {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }
    }
    if !items.is_empty() {
        let ids = items
            .iter()
            .map(|item| item.item_uuid.to_string())
            .collect::<Vec<_>>();
        let mut tags = load_tags_by_owner(conn, TagOwner::Item, &ids)?;
        for item in &mut items {
            item.tags = tags.remove(&item.item_uuid).unwrap_or_default();
        }
    }
    Ok(items)
}

pub(crate) fn load_box(conn: &Connection, box_uuid: BoxId) -> StoreResult<Option<BoxRecord>> {
    let mut boxes = query_boxes(
        conn,
        &format!("{BOX_SELECT_SQL} WHERE box_uuid = ?1;"),
        [box_uuid.to_string()],
    )?;
    Ok(boxes.pop())
}

pub(crate) fn load_required_box(conn: &Connection, box_uuid: BoxId) -> StoreResult<BoxRecord> {
    load_box(conn, box_uuid)?.ok_or(StoreError::BoxNotFound(box_uuid))
}

pub(crate) fn load_required_item(conn: &Connection, item_uuid: ItemId) -> StoreResult<ItemRecord> {
    let mut items = query_items(
        conn,
        &format!("{ITEM_SELECT_SQL} WHERE item_uuid = ?1;"),
        [item_uuid.to_string()],
    )?;
    items.pop().ok_or(StoreError::ItemNotFound(item_uuid))
}

fn hydrate_boxes(conn: &Connection, boxes: &mut [BoxRecord]) -> StoreResult<()> {
    if boxes.is_empty() {
        return Ok(());
    }
    let ids = boxes
        .iter()
        .map(|record| record.box_uuid.to_string())
        .collect::<Vec<_>>();
    let mut tags = load_tags_by_owner(conn, TagOwner::Box, &ids)?;
    let mut held = load_item_ids_by_box(conn, &ids)?;
    for record in boxes.iter_mut() {
        record.tags = tags.remove(&record.box_uuid).unwrap_or_default();
        record.item_ids = held.remove(&record.box_uuid).unwrap_or_default();
    }
    Ok(())
}

fn load_item_ids_by_box(
    conn: &Connection,
    box_ids: &[String],
) -> StoreResult<HashMap<BoxId, Vec<ItemId>>> {
    let mut held: HashMap<BoxId, Vec<ItemId>> = HashMap::new();
    for chunk in box_ids.chunks(MAX_BIND_PARAMS) {
        let sql = format!(
            "SELECT box_uuid, item_uuid
             FROM box_items
             WHERE box_uuid IN ({})
             ORDER BY box_uuid ASC, position ASC, item_uuid ASC;",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(chunk.iter()))?;
        while let Some(row) = rows.next()? {
            let box_text: String = row.get(0)?;
            let item_text: String = row.get(1)?;
            held.entry(parse_uuid(&box_text, "box_items.box_uuid")?)
                .or_default()
                .push(parse_uuid(&item_text, "box_items.item_uuid")?);
        }
    }
    Ok(held)
}

pub(crate) fn load_tags_by_owner(
    conn: &Connection,
    owner: TagOwner,
    owner_ids: &[String],
) -> StoreResult<HashMap<Uuid, Vec<String>>> {
    let mut tags: HashMap<Uuid, Vec<String>> = HashMap::new();
    let column = owner.owner_column();
    for chunk in owner_ids.chunks(MAX_BIND_PARAMS) {
        let sql = format!(
            "SELECT l.{column}, t.name
             FROM {table} l
             INNER JOIN tags t ON t.id = l.tag_id
             WHERE l.{column} IN ({marks})
             ORDER BY t.name COLLATE NOCASE ASC;",
            table = owner.link_table(),
            marks = placeholders(chunk.len()),
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(chunk.iter()))?;
        while let Some(row) = rows.next()? {
            let owner_text: String = row.get(0)?;
            let name: String = row.get(1)?;
            tags.entry(parse_uuid(&owner_text, "tag link owner")?)
                .or_default()
                .push(name.to_lowercase());
        }
    }
    Ok(tags)
}

/// Replaces the whole tag set of one owner. Caller supplies normalized tags
/// and an open transaction.
pub(crate) fn replace_tags(
    conn: &Connection,
    owner: TagOwner,
    owner_id: &str,
    tags: &[String],
) -> StoreResult<()> {
    let table = owner.link_table();
    let column = owner.owner_column();
    conn.execute(
        &format!("DELETE FROM {table} WHERE {column} = ?1;"),
        [owner_id],
    )?;
    for tag in tags {
        conn.execute(
            "INSERT OR IGNORE INTO tags (name) VALUES (?1);",
            [tag.as_str()],
        )?;
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {table} ({column}, tag_id)
                 SELECT ?1, id
                 FROM tags
                 WHERE name = ?2 COLLATE NOCASE;"
            ),
            params![owner_id, tag.as_str()],
        )?;
    }
    Ok(())
}

pub(crate) fn box_exists(conn: &Connection, box_uuid: BoxId) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM boxes WHERE box_uuid = ?1);",
        [box_uuid.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn ensure_box_exists(conn: &Connection, box_uuid: BoxId) -> StoreResult<()> {
    if box_exists(conn, box_uuid)? {
        Ok(())
    } else {
        Err(StoreError::BoxNotFound(box_uuid))
    }
}

/// Returns `None` when the box does not exist, `Some(parent)` otherwise.
pub(crate) fn parent_of(conn: &Connection, box_uuid: BoxId) -> StoreResult<Option<Option<BoxId>>> {
    let parent: Option<Option<String>> = conn
        .query_row(
            "SELECT parent_uuid FROM boxes WHERE box_uuid = ?1;",
            [box_uuid.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match parent {
        None => Ok(None),
        Some(None) => Ok(Some(None)),
        Some(Some(text)) => Ok(Some(Some(parse_uuid(&text, "boxes.parent_uuid")?))),
    }
}

pub(crate) fn short_id_owner(conn: &Connection, short_id: ShortId) -> StoreResult<Option<BoxId>> {
    let owner: Option<String> = conn
        .query_row(
            "SELECT box_uuid FROM boxes WHERE short_id = ?1;",
            [short_id.as_text()],
            |row| row.get(0),
        )
        .optional()?;
    owner
        .map(|text| parse_uuid(&text, "boxes.box_uuid"))
        .transpose()
}

/// Reads the custody state of an item; `None` when the item does not exist.
pub(crate) fn item_custody(conn: &Connection, item_uuid: ItemId) -> StoreResult<Option<ItemCustody>> {
    let row: Option<(Option<i64>, Option<String>)> = conn
        .query_row(
            "SELECT i.orphaned_since, bi.box_uuid
             FROM items i
             LEFT JOIN box_items bi ON bi.item_uuid = i.item_uuid
             WHERE i.item_uuid = ?1;",
            [item_uuid.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let Some((orphaned_since, holder)) = row else {
        return Ok(None);
    };
    let custody = ItemCustody {
        holder: holder
            .map(|text| parse_uuid(&text, "box_items.box_uuid"))
            .transpose()?,
        orphaned_since,
    };
    ensure_custody_consistent(item_uuid, custody)?;
    Ok(Some(custody))
}

/// Like `item_custody` but `ItemNotFound` when absent.
pub(crate) fn required_item_custody(conn: &Connection, item_uuid: ItemId) -> StoreResult<ItemCustody> {
    item_custody(conn, item_uuid)?.ok_or(StoreError::ItemNotFound(item_uuid))
}

/// Reports, never repairs, a held item carrying a timestamp or an unheld item
/// without one.
pub(crate) fn ensure_custody_consistent(item_uuid: ItemId, custody: ItemCustody) -> StoreResult<()> {
    match (custody.holder, custody.orphaned_since) {
        (Some(holder), Some(_)) => Err(StoreError::InvariantViolation(format!(
            "item {item_uuid} is held by box {holder} but marked orphaned"
        ))),
        (None, None) => Err(StoreError::InvariantViolation(format!(
            "item {item_uuid} is held by no box but has no orphaned_since"
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn next_position(conn: &Connection, box_uuid: BoxId) -> StoreResult<i64> {
    let next = conn.query_row(
        "SELECT COALESCE(MAX(position), -1) + 1
         FROM box_items
         WHERE box_uuid = ?1;",
        [box_uuid.to_string()],
        |row| row.get(0),
    )?;
    Ok(next)
}

/// Set-membership add: no-op when the row is already present.
pub(crate) fn add_membership(conn: &Connection, box_uuid: BoxId, item_uuid: ItemId) -> StoreResult<bool> {
    let position = next_position(conn, box_uuid)?;
    let changed = conn.execute(
        "INSERT OR IGNORE INTO box_items (box_uuid, item_uuid, position)
         VALUES (?1, ?2, ?3);",
        params![box_uuid.to_string(), item_uuid.to_string(), position],
    )?;
    Ok(changed == 1)
}

/// Set-membership remove: reports whether a row was removed.
pub(crate) fn remove_membership(
    conn: &Connection,
    box_uuid: BoxId,
    item_uuid: ItemId,
) -> StoreResult<bool> {
    let changed = conn.execute(
        "DELETE FROM box_items WHERE box_uuid = ?1 AND item_uuid = ?2;",
        params![box_uuid.to_string(), item_uuid.to_string()],
    )?;
    Ok(changed == 1)
}

pub(crate) fn set_orphaned_since(
    conn: &Connection,
    item_uuid: ItemId,
    orphaned_since: Option<i64>,
) -> StoreResult<()> {
    conn.execute(
        "UPDATE items
         SET orphaned_since = ?2,
             updated_at = (strftime('%s', 'now') * 1000)
         WHERE item_uuid = ?1;",
        params![item_uuid.to_string(), orphaned_since],
    )?;
    Ok(())
}

pub(crate) fn touch_box(conn: &Connection, box_uuid: BoxId) -> StoreResult<()> {
    conn.execute(
        "UPDATE boxes
         SET updated_at = (strftime('%s', 'now') * 1000)
         WHERE box_uuid = ?1;",
        [box_uuid.to_string()],
    )?;
    Ok(())
}

/// Stamps every item held by the given boxes as orphaned at `now` and drops
/// their membership rows. Returns the orphaned ids in box/position order.
pub(crate) fn orphan_items_of_boxes(
    conn: &Connection,
    box_ids: &[BoxId],
    now: i64,
) -> StoreResult<Vec<ItemId>> {
    let mut orphaned = Vec::new();
    for chunk in id_texts(box_ids).chunks(MAX_BIND_PARAMS) {
        let marks = placeholders(chunk.len());
        {
            let mut stmt = conn.prepare(&format!(
                "SELECT item_uuid
                 FROM box_items
                 WHERE box_uuid IN ({marks})
                 ORDER BY box_uuid ASC, position ASC;"
            ))?;
            let mut rows = stmt.query(params_from_iter(chunk.iter()))?;
            while let Some(row) = rows.next()? {
                let text: String = row.get(0)?;
                orphaned.push(parse_uuid(&text, "box_items.item_uuid")?);
            }
        }

        let mut bind = vec![rusqlite::types::Value::Integer(now)];
        bind.extend(
            chunk
                .iter()
                .map(|id| rusqlite::types::Value::Text(id.clone())),
        );
        conn.execute(
            &format!(
                "UPDATE items
                 SET orphaned_since = ?,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE item_uuid IN (
                     SELECT item_uuid FROM box_items WHERE box_uuid IN ({marks})
                 );"
            ),
            params_from_iter(bind),
        )?;
        conn.execute(
            &format!("DELETE FROM box_items WHERE box_uuid IN ({marks});"),
            params_from_iter(chunk.iter()),
        )?;
    }
    Ok(orphaned)
}

fn parse_box_row(row: &Row<'_>) -> StoreResult<BoxRecord> {
    let box_text: String = row.get("box_uuid")?;
    let short_text: String = row.get("short_id")?;
    let short_id = ShortId::parse(&short_text).map_err(|_| {
        StoreError::InvalidData(format!("invalid short id `{short_text}` in boxes.short_id"))
    })?;
    let parent_uuid = row
        .get::<_, Option<String>>("parent_uuid")?
        .map(|value| parse_uuid(&value, "boxes.parent_uuid"))
        .transpose()?;

    Ok(BoxRecord {
        box_uuid: parse_uuid(&box_text, "boxes.box_uuid")?,
        short_id,
        label: row.get("label")?,
        location: row.get("location")?,
        description: row.get("description")?,
        notes: row.get("notes")?,
        tags: Vec::new(),
        parent_uuid,
        item_ids: Vec::new(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_item_row(row: &Row<'_>) -> StoreResult<ItemRecord> {
    let item_text: String = row.get("item_uuid")?;
    let raw_quantity: i64 = row.get("quantity")?;
    let quantity = u32::try_from(raw_quantity)
        .ok()
        .filter(|value| *value >= 1)
        .ok_or_else(|| {
            StoreError::InvalidData(format!(
                "invalid quantity `{raw_quantity}` in items.quantity"
            ))
        })?;

    Ok(ItemRecord {
        item_uuid: parse_uuid(&item_text, "items.item_uuid")?,
        name: row.get("name")?,
        quantity,
        notes: row.get("notes")?,
        tags: Vec::new(),
        orphaned_since: row.get("orphaned_since")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

/// Verifies the connection is migrated and carries the tables this crate reads.
pub fn ensure_store_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    let required: [(&'static str, &[&'static str]); 6] = [
        (
            "boxes",
            &["box_uuid", "short_id", "parent_uuid", "label", "updated_at"],
        ),
        ("items", &["item_uuid", "name", "quantity", "orphaned_since"]),
        ("box_items", &["box_uuid", "item_uuid", "position"]),
        ("tags", &["id", "name"]),
        ("box_tags", &["box_uuid", "tag_id"]),
        ("item_tags", &["item_uuid", "tag_id"]),
    ];
    for (table, columns) in required {
        if !table_exists(conn, table)? {
            return Err(StoreError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(StoreError::MissingRequiredColumn { table, column });
            }
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
