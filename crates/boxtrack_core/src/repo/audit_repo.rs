//! Read-only snapshots used by the integrity audit.

use crate::model::box_record::BoxId;
use crate::model::item::ItemId;
use crate::model::short_id::ShortId;
use crate::repo::snapshot::{begin_read_snapshot, ReadSnapshot};
use crate::repo::sql_support::{ensure_store_ready, parse_uuid};
use crate::repo::store_error::{StoreError, StoreResult};
use rusqlite::Connection;

/// One box's hierarchy link as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink {
    pub box_uuid: BoxId,
    pub short_id: ShortId,
    pub parent_uuid: Option<BoxId>,
}

/// One item's custody state as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustodyRow {
    pub item_uuid: ItemId,
    pub holder: Option<BoxId>,
    pub orphaned_since: Option<i64>,
}

/// Repository interface for audit snapshots.
pub trait AuditRepository {
    fn parent_links(&self) -> StoreResult<Vec<ParentLink>>;
    fn custody_rows(&self) -> StoreResult<Vec<CustodyRow>>;
    /// Keeps both listings on one committed view while the guard lives.
    fn begin_snapshot(&self) -> StoreResult<ReadSnapshot<'_>>;
}

/// SQLite-backed audit snapshot reader.
pub struct SqliteAuditRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAuditRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_store_ready(conn)?;
        Ok(Self { conn })
    }
}

impl AuditRepository for SqliteAuditRepository<'_> {
    fn parent_links(&self) -> StoreResult<Vec<ParentLink>> {
        let mut stmt = self.conn.prepare(
            "SELECT box_uuid, short_id, parent_uuid
             FROM boxes
             ORDER BY short_id ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut links = Vec::new();
        while let Some(row) = rows.next()? {
            let box_text: String = row.get(0)?;
            let short_text: String = row.get(1)?;
            let parent_text: Option<String> = row.get(2)?;
            links.push(ParentLink {
                box_uuid: parse_uuid(&box_text, "boxes.box_uuid")?,
                short_id: ShortId::parse(&short_text).map_err(|_| {
                    StoreError::InvalidData(format!(
                        "invalid short id `{short_text}` in boxes.short_id"
                    ))
                })?,
                parent_uuid: parent_text
                    .map(|value| parse_uuid(&value, "boxes.parent_uuid"))
                    .transpose()?,
            });
        }
        Ok(links)
    }

    fn custody_rows(&self) -> StoreResult<Vec<CustodyRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.item_uuid, bi.box_uuid, i.orphaned_since
             FROM items i
             LEFT JOIN box_items bi ON bi.item_uuid = i.item_uuid
             ORDER BY i.item_uuid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut custody = Vec::new();
        while let Some(row) = rows.next()? {
            let item_text: String = row.get(0)?;
            let holder_text: Option<String> = row.get(1)?;
            custody.push(CustodyRow {
                item_uuid: parse_uuid(&item_text, "items.item_uuid")?,
                holder: holder_text
                    .map(|value| parse_uuid(&value, "box_items.box_uuid"))
                    .transpose()?,
                orphaned_since: row.get(2)?,
            });
        }
        Ok(custody)
    }

    fn begin_snapshot(&self) -> StoreResult<ReadSnapshot<'_>> {
        begin_read_snapshot(self.conn)
    }
}
