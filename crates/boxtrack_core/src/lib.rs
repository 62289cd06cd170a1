//! Box hierarchy and item custody engine.
//! This crate owns every storage invariant; callers go through the services.

pub mod config;
pub mod cycle_guard;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::SeedConfig;
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::box_record::{BoxCrumb, BoxId, BoxPatch, BoxRecord, NewBox};
pub use model::item::{ItemId, ItemPatch, ItemRecord, ItemValidationError, NewItem};
pub use model::short_id::{ShortId, ShortIdAllocator, ShortIdError, ShortIdRange};
pub use repo::audit_repo::{AuditRepository, SqliteAuditRepository};
pub use repo::box_repo::{BoxListQuery, BoxRepository, ParentFilter, SqliteBoxRepository};
pub use repo::custody_repo::{
    AttachManyOutcome, AttachOutcome, CustodyRepository, DeletedBox, EmptyBoxOutcome,
    MoveOutcome, SqliteCustodyRepository,
};
pub use repo::fixture_repo::{FixtureRepository, SqliteFixtureRepository, WipeReport};
pub use repo::item_repo::{ItemRepository, SqliteItemRepository};
pub use repo::snapshot::ReadSnapshot;
pub use repo::store_error::{StoreError, StoreResult};
pub use service::box_service::BoxService;
pub use service::custody_service::CustodyService;
pub use service::error::{CoreError, CoreResult, EntityRef};
pub use service::integrity_service::{AuditFinding, AuditReport, IntegrityService};
pub use service::item_service::ItemService;
pub use service::seed_service::{
    FullWipeConfirmation, SeedMetadata, SeedNode, SeedReport, SeedService,
};
pub use rusqlite::Connection;
pub use service::tree_materializer::{
    BoxTree, FlatItem, MaterializeOptions, MaterializedTree, TreeMaterializer, TreeStats,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
