//! Box (container) repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide persistence APIs for the box hierarchy and its descriptive fields.
//! - Own the cycle-guarded parent write.
//!
//! # Invariants
//! - Listing order is deterministic: `short_id ASC`.
//! - `reparent_box` evaluates the cycle guard last, inside the same
//!   `BEGIN IMMEDIATE` transaction that persists the new parent.
//! - Box custody lists are never written here.

use crate::cycle_guard::would_create_cycle;
use crate::model::box_record::{BoxId, BoxPatch, BoxRecord, NewBox};
use crate::model::short_id::{ShortId, ShortIdRange};
use crate::repo::sql_support::{
    begin_immediate, ensure_box_exists, ensure_store_ready, id_texts, load_box, load_required_box,
    parent_of, placeholders, query_boxes, replace_tags, short_id_owner, TagOwner,
    BOX_SELECT_SQL, MAX_BIND_PARAMS,
};
use crate::repo::snapshot::{begin_read_snapshot, ReadSnapshot};
use crate::repo::store_error::{StoreError, StoreResult};
use rusqlite::{params, params_from_iter, Connection};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Parent filter for box listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParentFilter {
    /// Any box regardless of parent.
    #[default]
    Any,
    /// Boxes without a parent.
    TopLevel,
    /// Direct children of one box.
    Under(BoxId),
}

/// Query options for listing boxes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoxListQuery {
    pub parent: ParentFilter,
    pub short_id_range: Option<ShortIdRange>,
}

/// Repository interface for the container store.
pub trait BoxRepository {
    /// Inserts one box under an existing parent (or top level).
    ///
    /// Input fields are expected to be normalized already.
    fn create_box(&self, short_id: ShortId, input: &NewBox) -> StoreResult<BoxRecord>;
    /// Loads one box by durable id.
    fn get_box(&self, box_uuid: BoxId) -> StoreResult<Option<BoxRecord>>;
    /// Loads one box by its 3-digit code.
    fn find_box_by_short_id(&self, short_id: ShortId) -> StoreResult<Option<BoxRecord>>;
    /// Lists boxes by parent and short-id range.
    fn list_boxes(&self, query: &BoxListQuery) -> StoreResult<Vec<BoxRecord>>;
    /// Lists the direct children of every given box in one batched fetch.
    fn list_children_of(&self, parent_uuids: &[BoxId]) -> StoreResult<Vec<BoxRecord>>;
    /// Applies a descriptive patch; parent and custody are untouched.
    fn update_box(&self, box_uuid: BoxId, patch: &BoxPatch) -> StoreResult<BoxRecord>;
    /// Moves one box under a new parent (or to top level).
    fn reparent_box(&self, box_uuid: BoxId, new_parent: Option<BoxId>) -> StoreResult<BoxRecord>;
    /// Returns every short id in use within the range.
    fn taken_short_ids(&self, range: ShortIdRange) -> StoreResult<BTreeSet<ShortId>>;
    /// Pins one committed view for the reads that follow, until the guard drops.
    fn begin_snapshot(&self) -> StoreResult<ReadSnapshot<'_>>;
}

/// SQLite-backed container store.
pub struct SqliteBoxRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBoxRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_store_ready(conn)?;
        Ok(Self { conn })
    }
}

impl BoxRepository for SqliteBoxRepository<'_> {
    fn create_box(&self, short_id: ShortId, input: &NewBox) -> StoreResult<BoxRecord> {
        let box_uuid = Uuid::new_v4();
        let tx = begin_immediate(self.conn)?;

        if short_id_owner(&tx, short_id)?.is_some() {
            return Err(StoreError::ShortIdTaken(short_id));
        }
        if let Some(parent_uuid) = input.parent_uuid {
            ensure_box_exists(&tx, parent_uuid)?;
        }

        tx.execute(
            "INSERT INTO boxes (
                box_uuid,
                short_id,
                label,
                location,
                description,
                notes,
                parent_uuid
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                box_uuid.to_string(),
                short_id.as_text(),
                input.label.as_deref(),
                input.location.as_deref(),
                input.description.as_deref(),
                input.notes.as_deref(),
                input.parent_uuid.map(|value| value.to_string()),
            ],
        )?;
        replace_tags(&tx, TagOwner::Box, &box_uuid.to_string(), &input.tags)?;

        let created = load_required_box(&tx, box_uuid)?;
        tx.commit()?;
        Ok(created)
    }

    fn get_box(&self, box_uuid: BoxId) -> StoreResult<Option<BoxRecord>> {
        load_box(self.conn, box_uuid)
    }

    fn find_box_by_short_id(&self, short_id: ShortId) -> StoreResult<Option<BoxRecord>> {
        let mut boxes = query_boxes(
            self.conn,
            &format!("{BOX_SELECT_SQL} WHERE short_id = ?1;"),
            [short_id.as_text()],
        )?;
        Ok(boxes.pop())
    }

    fn list_boxes(&self, query: &BoxListQuery) -> StoreResult<Vec<BoxRecord>> {
        let mut sql = format!("{BOX_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<String> = Vec::new();

        match query.parent {
            ParentFilter::Any => {}
            ParentFilter::TopLevel => sql.push_str(" AND parent_uuid IS NULL"),
            ParentFilter::Under(parent_uuid) => {
                sql.push_str(" AND parent_uuid = ?");
                bind_values.push(parent_uuid.to_string());
            }
        }

        if let Some(range) = query.short_id_range {
            // Zero-padded text compares in numeric order.
            sql.push_str(" AND short_id BETWEEN ? AND ?");
            bind_values.push(range.first().as_text());
            bind_values.push(range.last().as_text());
        }

        sql.push_str(" ORDER BY short_id ASC;");
        query_boxes(self.conn, &sql, params_from_iter(bind_values))
    }

    fn list_children_of(&self, parent_uuids: &[BoxId]) -> StoreResult<Vec<BoxRecord>> {
        let mut children = Vec::new();
        for chunk in id_texts(parent_uuids).chunks(MAX_BIND_PARAMS) {
            let sql = format!(
                "{BOX_SELECT_SQL}
                 WHERE parent_uuid IN ({})
                 ORDER BY short_id ASC;",
                placeholders(chunk.len())
            );
            children.extend(query_boxes(
                self.conn,
                &sql,
                params_from_iter(chunk.iter()),
            )?);
        }
        Ok(children)
    }

    fn update_box(&self, box_uuid: BoxId, patch: &BoxPatch) -> StoreResult<BoxRecord> {
        let tx = begin_immediate(self.conn)?;
        let current = load_required_box(&tx, box_uuid)?;

        if let Some(short_id) = patch.short_id {
            match short_id_owner(&tx, short_id)? {
                Some(owner) if owner != box_uuid => {
                    return Err(StoreError::ShortIdTaken(short_id));
                }
                _ => {}
            }
        }

        let pick = |next: &Option<Option<String>>, current: &Option<String>| match next {
            Some(value) => value.clone(),
            None => current.clone(),
        };

        tx.execute(
            "UPDATE boxes
             SET short_id = ?2,
                 label = ?3,
                 location = ?4,
                 description = ?5,
                 notes = ?6,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE box_uuid = ?1;",
            params![
                box_uuid.to_string(),
                patch.short_id.unwrap_or(current.short_id).as_text(),
                pick(&patch.label, &current.label),
                pick(&patch.location, &current.location),
                pick(&patch.description, &current.description),
                pick(&patch.notes, &current.notes),
            ],
        )?;
        if let Some(tags) = &patch.tags {
            replace_tags(&tx, TagOwner::Box, &box_uuid.to_string(), tags)?;
        }

        let updated = load_required_box(&tx, box_uuid)?;
        tx.commit()?;
        Ok(updated)
    }

    fn reparent_box(&self, box_uuid: BoxId, new_parent: Option<BoxId>) -> StoreResult<BoxRecord> {
        let tx = begin_immediate(self.conn)?;
        ensure_box_exists(&tx, box_uuid)?;
        if let Some(parent_uuid) = new_parent {
            ensure_box_exists(&tx, parent_uuid)?;
        }

        // Last gate before the write; the reserved lock is already held.
        if let Some(parent_uuid) = new_parent {
            let cyclic = would_create_cycle(box_uuid, Some(parent_uuid), |current| {
                parent_of(&tx, current).map(Option::flatten)
            })?;
            if cyclic {
                return Err(StoreError::CycleDetected {
                    box_uuid,
                    parent_uuid,
                });
            }
        }

        tx.execute(
            "UPDATE boxes
             SET parent_uuid = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE box_uuid = ?1;",
            params![box_uuid.to_string(), new_parent.map(|value| value.to_string())],
        )?;

        let updated = load_required_box(&tx, box_uuid)?;
        tx.commit()?;
        Ok(updated)
    }

    fn taken_short_ids(&self, range: ShortIdRange) -> StoreResult<BTreeSet<ShortId>> {
        let mut stmt = self.conn.prepare(
            "SELECT short_id
             FROM boxes
             WHERE short_id BETWEEN ?1 AND ?2
             ORDER BY short_id ASC;",
        )?;
        let mut rows = stmt.query(params![range.first().as_text(), range.last().as_text()])?;
        let mut taken = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            let short_id = ShortId::parse(&text).map_err(|_| {
                StoreError::InvalidData(format!("invalid short id `{text}` in boxes.short_id"))
            })?;
            taken.insert(short_id);
        }
        Ok(taken)
    }

    fn begin_snapshot(&self) -> StoreResult<ReadSnapshot<'_>> {
        begin_read_snapshot(self.conn)
    }
}
