//! Ordered schema steps for the box/item store.
//!
//! # Invariants
//! - Steps are listed with strictly increasing versions starting at 1.
//! - All pending steps run in one `BEGIN IMMEDIATE` transaction, so two
//!   processes opening a fresh file cannot both apply them.
//! - The reached version is stored in `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, TransactionBehavior};

struct SchemaStep {
    version: u32,
    label: &'static str,
    sql: &'static str,
}

const STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        label: "boxes_items",
        sql: include_str!("0001_boxes_items.sql"),
    },
    SchemaStep {
        version: 2,
        label: "tags",
        sql: include_str!("0002_tags.sql"),
    },
];

/// Schema version this build writes and expects.
pub fn latest_version() -> u32 {
    STEPS.last().map_or(0, |step| step.version)
}

/// Brings the store up to [`latest_version`].
///
/// A store already at the latest version is left alone; a store ahead of it
/// is rejected with [`DbError::SchemaTooNew`].
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    // Re-read under the write lock; another opener may have migrated already.
    let found = stored_version(&tx)?;
    let supported = latest_version();
    if found > supported {
        return Err(DbError::SchemaTooNew { found, supported });
    }

    let mut applied = 0usize;
    for step in STEPS.iter().filter(|step| step.version > found) {
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        applied += 1;
        info!(
            "event=db_migrate module=db status=applied version={} step={}",
            step.version, step.label
        );
    }
    tx.commit()?;

    if applied > 0 {
        info!("event=db_migrate module=db status=ok from={found} to={supported} steps={applied}");
    }
    Ok(())
}

fn stored_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::STEPS;

    #[test]
    fn steps_are_numbered_consecutively_from_one() {
        for (index, step) in STEPS.iter().enumerate() {
            assert_eq!(step.version as usize, index + 1, "step {}", step.label);
        }
    }
}
