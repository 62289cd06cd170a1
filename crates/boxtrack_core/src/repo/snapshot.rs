//! Read snapshots spanning several repository queries.
//!
//! # Responsibility
//! - Pin one committed view of the store while a multi-query read runs.
//!
//! # Invariants
//! - While a pinned snapshot is alive, every read on its connection sees the
//!   same committed state, even if another connection commits in between.
//! - A connection already inside a transaction is not re-pinned; the outer
//!   transaction already fixes the view.
//! - Dropping the guard ends the read transaction. Nothing is ever written
//!   through it.

use crate::repo::store_error::StoreResult;
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Guard holding a read transaction open for the duration of a read pass.
pub struct ReadSnapshot<'conn> {
    tx: Option<Transaction<'conn>>,
}

impl ReadSnapshot<'_> {
    /// Whether this guard opened its own read transaction.
    ///
    /// `false` means the connection was already in a transaction when the
    /// snapshot was requested.
    pub fn is_pinned(&self) -> bool {
        self.tx.is_some()
    }
}

pub(crate) fn begin_read_snapshot(conn: &Connection) -> StoreResult<ReadSnapshot<'_>> {
    if !conn.is_autocommit() {
        return Ok(ReadSnapshot { tx: None });
    }
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Deferred)?;
    // A deferred transaction takes its view at the first read, not at BEGIN.
    tx.query_row("SELECT COUNT(*) FROM sqlite_master;", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(ReadSnapshot { tx: Some(tx) })
}

#[cfg(test)]
mod tests {
    use super::begin_read_snapshot;
    use crate::db::open_db_in_memory;

    #[test]
    fn snapshot_pins_once_and_releases_on_drop() {
        let conn = open_db_in_memory().unwrap();
        {
            let outer = begin_read_snapshot(&conn).unwrap();
            assert!(outer.is_pinned());
            assert!(!conn.is_autocommit());

            let inner = begin_read_snapshot(&conn).unwrap();
            assert!(!inner.is_pinned());
        }
        assert!(conn.is_autocommit());
    }
}
