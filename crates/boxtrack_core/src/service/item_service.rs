//! Item store use-case service.
//!
//! # Responsibility
//! - Create, read, update and delete items outside of custody changes.
//!
//! # Invariants
//! - Items created here start orphaned; custody is granted only by
//!   `CustodyService`.

use crate::model::box_record::BoxId;
use crate::model::item::{ItemId, ItemPatch, ItemRecord, NewItem};
use crate::model::now_epoch_ms;
use crate::repo::item_repo::ItemRepository;
use crate::service::error::{CoreError, CoreResult, EntityRef};
use crate::service::logged;
use log::info;

const MODULE: &str = "item_service";

/// Item store service facade.
pub struct ItemService<R: ItemRepository> {
    repo: R,
}

impl<R: ItemRepository> ItemService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Creates one standalone (orphaned) item.
    pub fn create_item(&self, input: &NewItem) -> CoreResult<ItemRecord> {
        logged("item_create", MODULE, || {
            let normalized = input.normalized()?;
            let created = self.repo.create_item(&normalized, now_epoch_ms())?;
            info!(
                "event=item_create module={MODULE} status=ok item_uuid={}",
                created.item_uuid
            );
            Ok(created)
        })
    }

    pub fn get_item(&self, item_uuid: ItemId) -> CoreResult<Option<ItemRecord>> {
        self.repo.get_item(item_uuid).map_err(Into::into)
    }

    /// Loads one item, failing with `NotFound` when absent.
    pub fn require_item(&self, item_uuid: ItemId) -> CoreResult<ItemRecord> {
        self.get_item(item_uuid)?
            .ok_or(CoreError::NotFound(EntityRef::Item(item_uuid)))
    }

    /// Items held by no box, longest-orphaned first.
    pub fn list_orphaned_items(&self) -> CoreResult<Vec<ItemRecord>> {
        self.repo.list_orphaned_items().map_err(Into::into)
    }

    /// Box currently holding the item, if any.
    pub fn holder_of(&self, item_uuid: ItemId) -> CoreResult<Option<BoxId>> {
        self.repo.holder_of(item_uuid).map_err(Into::into)
    }

    /// Updates name, quantity, notes or tags.
    pub fn update_item(&self, item_uuid: ItemId, patch: &ItemPatch) -> CoreResult<ItemRecord> {
        logged("item_update", MODULE, || {
            let normalized = patch.normalized()?;
            let updated = self.repo.update_item(item_uuid, &normalized)?;
            info!("event=item_update module={MODULE} status=ok item_uuid={item_uuid}");
            Ok(updated)
        })
    }

    /// Deletes an item; any box holding it loses it in the same statement.
    pub fn delete_item(&self, item_uuid: ItemId) -> CoreResult<()> {
        logged("item_delete", MODULE, || {
            self.repo.delete_item(item_uuid)?;
            info!("event=item_delete module={MODULE} status=ok item_uuid={item_uuid}");
            Ok(())
        })
    }
}
