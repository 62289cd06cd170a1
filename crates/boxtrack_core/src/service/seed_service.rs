//! Deterministic fixture seeding and scoped wipes.
//!
//! # Responsibility
//! - Clear the reserved short-id band and rebuild it from tree literals.
//! - Offer a full-dataset mode gated behind an explicit confirmation value.
//!
//! # Invariants
//! - Id assignment state lives in a `ShortIdAllocator` local to one call.
//! - Id exhaustion and invalid item names are detected before any write.
//! - Reserved-range seeding never deletes or renumbers a box outside the band.
//! - Seeding the same forest twice yields the same box and item counts.
//! - The wipe and every planted box and item commit separately. A store
//!   failure mid-plant leaves the band partly seeded with custody still
//!   consistent; rerunning the seed wipes that remainder and converges.
//! - Auto-issued ids from the inner `BoxService` avoid `config.reserved`.

use crate::config::SeedConfig;
use crate::model::box_record::{BoxId, NewBox};
use crate::model::item::NewItem;
use crate::model::short_id::{ShortIdAllocator, ShortIdRange};
use crate::repo::box_repo::BoxRepository;
use crate::repo::custody_repo::CustodyRepository;
use crate::repo::fixture_repo::{FixtureRepository, WipeReport};
use crate::service::box_service::BoxService;
use crate::service::custody_service::CustodyService;
use crate::service::error::{CoreError, CoreResult};
use crate::service::logged;
use log::{info, warn};
use serde::{Deserialize, Serialize};

const MODULE: &str = "seed_service";

/// Descriptive fields applied to a seeded box.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedMetadata {
    pub location: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub tags: Vec<String>,
}

/// One box literal in a seed forest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedNode {
    pub label: String,
    #[serde(default)]
    pub metadata: SeedMetadata,
    /// One item is created per entry, in order.
    #[serde(default)]
    pub item_names: Vec<String>,
    #[serde(default)]
    pub children: Vec<SeedNode>,
}

impl SeedNode {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn with_items<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.item_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = SeedNode>) -> Self {
        self.children.extend(children);
        self
    }

    /// Number of boxes in this literal, including itself.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(SeedNode::node_count).sum::<usize>()
    }

    fn first_blank_item(&self) -> Option<&str> {
        self.item_names
            .iter()
            .find(|name| name.trim().is_empty())
            .map(|_| self.label.as_str())
            .or_else(|| self.children.iter().find_map(SeedNode::first_blank_item))
    }
}

/// Explicit opt-in for full-dataset seeding.
///
/// Has no `Default`; callers must spell out the constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullWipeConfirmation {
    _private: (),
}

impl FullWipeConfirmation {
    pub fn wipe_everything() -> Self {
        Self { _private: () }
    }
}

/// What one seeding run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub wiped: WipeReport,
    /// Range the allocator walked.
    pub range: ShortIdRange,
    pub boxes_created: usize,
    pub items_created: usize,
    /// Top-level boxes created, one per tree.
    pub root_box_ids: Vec<BoxId>,
}

/// Fixture seeding facade.
pub struct SeedService<B: BoxRepository, C: CustodyRepository, F: FixtureRepository> {
    boxes: BoxService<B>,
    custody: CustodyService<C>,
    fixtures: F,
    config: SeedConfig,
}

impl<B, C, F> SeedService<B, C, F>
where
    B: BoxRepository,
    C: CustodyRepository,
    F: FixtureRepository,
{
    pub fn new(box_repo: B, custody_repo: C, fixtures: F) -> Self {
        Self::with_config(box_repo, custody_repo, fixtures, SeedConfig::default())
    }

    pub fn with_config(box_repo: B, custody_repo: C, fixtures: F, config: SeedConfig) -> Self {
        Self {
            boxes: BoxService::with_reserved(box_repo, config.reserved),
            custody: CustodyService::new(custody_repo),
            fixtures,
            config,
        }
    }

    pub fn config(&self) -> &SeedConfig {
        &self.config
    }

    /// Deletes every box in the reserved band and every item those boxes hold.
    pub fn wipe_reserved_range(&self) -> CoreResult<WipeReport> {
        logged("seed_wipe_reserved", MODULE, || {
            let report = self.fixtures.wipe_range(self.config.reserved)?;
            info!(
                "event=seed_wipe_reserved module={MODULE} status=ok range={} boxes_deleted={} items_deleted={} boxes_released={}",
                self.config.reserved,
                report.boxes_deleted,
                report.items_deleted,
                report.boxes_released
            );
            Ok(report)
        })
    }

    /// Rebuilds the reserved band from `trees`.
    ///
    /// # Errors
    /// - `OutOfIds` when the forest has more nodes than the band holds.
    /// - `InvalidInput` when an item name is blank.
    pub fn seed_from_trees(&self, trees: &[SeedNode]) -> CoreResult<SeedReport> {
        logged("seed_reserved", MODULE, || {
            let range = self.config.reserved;
            let allocator = ShortIdAllocator::new(range);
            check_forest(trees, &allocator)?;

            let wiped = self.wipe_reserved_range()?;
            let report = self.plant(trees, allocator, wiped)?;
            info!(
                "event=seed_reserved module={MODULE} status=ok range={range} boxes_created={} items_created={}",
                report.boxes_created, report.items_created
            );
            Ok(report)
        })
    }

    /// Wipes the whole dataset and seeds from `config.full_start`, skipping
    /// the reserved band.
    pub fn seed_full(
        &self,
        trees: &[SeedNode],
        _confirmation: FullWipeConfirmation,
    ) -> CoreResult<SeedReport> {
        logged("seed_full", MODULE, || {
            let range = self.config.full_range();
            let allocator = ShortIdAllocator::new(range).excluding(self.config.reserved);
            check_forest(trees, &allocator)?;

            warn!("event=seed_full module={MODULE} status=start action=wipe_everything");
            let wiped = self.fixtures.wipe_everything()?;
            let report = self.plant(trees, allocator, wiped)?;
            info!(
                "event=seed_full module={MODULE} status=ok range={range} boxes_deleted={} boxes_created={} items_created={}",
                report.wiped.boxes_deleted, report.boxes_created, report.items_created
            );
            Ok(report)
        })
    }

    fn plant(
        &self,
        trees: &[SeedNode],
        mut allocator: ShortIdAllocator,
        wiped: WipeReport,
    ) -> CoreResult<SeedReport> {
        let mut report = SeedReport {
            wiped,
            range: allocator.range(),
            boxes_created: 0,
            items_created: 0,
            root_box_ids: Vec::with_capacity(trees.len()),
        };
        for tree in trees {
            let root = self.plant_node(tree, None, &mut allocator, &mut report)?;
            report.root_box_ids.push(root);
        }
        Ok(report)
    }

    fn plant_node(
        &self,
        node: &SeedNode,
        parent_uuid: Option<BoxId>,
        allocator: &mut ShortIdAllocator,
        report: &mut SeedReport,
    ) -> CoreResult<BoxId> {
        let short_id = allocator.next_id().ok_or(CoreError::OutOfIds {
            range: allocator.range(),
            requested: 1,
            available: 0,
        })?;
        let created = self.boxes.create_box(NewBox {
            short_id: Some(short_id),
            label: Some(node.label.clone()),
            location: node.metadata.location.clone(),
            description: node.metadata.description.clone(),
            notes: node.metadata.notes.clone(),
            tags: node.metadata.tags.clone(),
            parent_uuid,
        })?;
        report.boxes_created += 1;

        for name in &node.item_names {
            self.custody
                .create_item_in_box(created.box_uuid, &NewItem::named(name.as_str()))?;
            report.items_created += 1;
        }
        for child in &node.children {
            self.plant_node(child, Some(created.box_uuid), allocator, report)?;
        }
        Ok(created.box_uuid)
    }
}

fn check_forest(trees: &[SeedNode], allocator: &ShortIdAllocator) -> CoreResult<()> {
    if let Some(label) = trees.iter().find_map(SeedNode::first_blank_item) {
        return Err(CoreError::InvalidInput(format!(
            "seed node `{label}` has a blank item name"
        )));
    }
    let requested = trees.iter().map(SeedNode::node_count).sum::<usize>();
    let available = allocator.remaining();
    if requested > available {
        return Err(CoreError::OutOfIds {
            range: allocator.range(),
            requested,
            available,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::SeedNode;

    #[test]
    fn seed_node_deserializes_with_defaults() {
        let json = r#"[
            {
                "label": "Garage",
                "metadata": { "location": "north wall", "tags": ["Tools"] },
                "item_names": ["Drill"],
                "children": [{ "label": "Shelf" }]
            }
        ]"#;
        let trees: Vec<SeedNode> = serde_json::from_str(json).unwrap();
        assert_eq!(trees.len(), 1);
        assert_eq!(trees[0].node_count(), 2);
        assert_eq!(trees[0].metadata.location.as_deref(), Some("north wall"));
        assert!(trees[0].children[0].item_names.is_empty());
    }

    #[test]
    fn blank_item_name_is_found_in_nested_nodes() {
        let tree = SeedNode::new("Attic")
            .with_children([SeedNode::new("Trunk").with_items(["Quilt", "  "])]);
        assert_eq!(tree.first_blank_item(), Some("Trunk"));
        assert_eq!(SeedNode::new("Empty").first_blank_item(), None);
    }
}
