//! Subtree materialization with batched fetches and derived views.
//!
//! # Responsibility
//! - Hydrate the full subtree under one root box (boxes, items, children).
//! - Derive breadcrumbs, aggregate stats and a flattened item list from that
//!   single hydrated tree.
//!
//! # Invariants
//! - Box fetches cost one batched call per tree level; item fetch is one
//!   batched call for the whole subtree.
//! - The whole pass (root lookup, level fetches, item fetch, ancestor walk)
//!   runs under one read snapshot; writes other connections commit meanwhile
//!   stay invisible to it.
//! - A box reached twice during collection, or an item id referenced by a box
//!   but missing from the store, is reported as `InvariantViolation`.
//! - Summing items across all nodes equals the flattened list length.

use crate::model::box_record::{BoxCrumb, BoxId, BoxRecord};
use crate::model::item::{ItemId, ItemRecord};
use crate::model::short_id::ShortId;
use crate::repo::box_repo::BoxRepository;
use crate::repo::item_repo::ItemRepository;
use crate::service::error::{CoreError, CoreResult};
use crate::service::logged;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

const MODULE: &str = "tree_materializer";

static WHITESPACE_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Which derived views to compute alongside the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeOptions {
    /// Breadcrumbs from the top-level ancestor down to the root's parent.
    pub include_ancestors: bool,
    pub include_stats: bool,
    pub flatten: bool,
}

impl MaterializeOptions {
    pub fn all() -> Self {
        Self {
            include_ancestors: true,
            include_stats: true,
            flatten: true,
        }
    }
}

/// One hydrated node: box fields, held items, child nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoxTree {
    #[serde(flatten)]
    pub record: BoxRecord,
    pub items: Vec<ItemRecord>,
    pub children: Vec<BoxTree>,
}

impl BoxTree {
    /// Number of boxes in this subtree, including this one.
    pub fn box_count(&self) -> usize {
        1 + self.children.iter().map(BoxTree::box_count).sum::<usize>()
    }

    /// Number of items held anywhere in this subtree.
    pub fn item_count_total(&self) -> usize {
        self.items.len()
            + self
                .children
                .iter()
                .map(BoxTree::item_count_total)
                .sum::<usize>()
    }

    /// Depth-first pre-order visit of every node.
    pub fn visit<'a>(&'a self, visitor: &mut impl FnMut(&'a BoxTree)) {
        visitor(self);
        for child in &self.children {
            child.visit(visitor);
        }
    }
}

/// Aggregates over a materialized subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub box_count: usize,
    /// Distinct item names after trimming, lowercasing and collapsing inner
    /// whitespace runs.
    pub distinct_item_names: usize,
    /// Sum of quantities; a quantity below 1 counts as 1.
    pub total_quantity: u64,
}

/// One item annotated with where it sits in the subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatItem {
    pub item: ItemRecord,
    /// Box that holds the item.
    pub owner: BoxCrumb,
    /// Boxes from the materialized root down to and including `owner`.
    pub path: Vec<BoxCrumb>,
}

/// Materialization result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializedTree {
    pub tree: BoxTree,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ancestors: Option<Vec<BoxCrumb>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<TreeStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flat_items: Option<Vec<FlatItem>>,
}

/// Read-side service that hydrates subtrees.
pub struct TreeMaterializer<B: BoxRepository, I: ItemRepository> {
    boxes: B,
    items: I,
}

struct CollectedSubtree {
    records: HashMap<BoxId, BoxRecord>,
    children: HashMap<BoxId, Vec<BoxId>>,
    item_order: Vec<ItemId>,
    round_trips: usize,
}

impl<B: BoxRepository, I: ItemRepository> TreeMaterializer<B, I> {
    pub fn new(boxes: B, items: I) -> Self {
        Self { boxes, items }
    }

    /// Hydrates the subtree rooted at the box with `root_short_id`.
    ///
    /// Returns `Ok(None)` when no box has that short id.
    pub fn materialize(
        &self,
        root_short_id: &str,
        options: MaterializeOptions,
    ) -> CoreResult<Option<MaterializedTree>> {
        logged("tree_materialize", MODULE, || {
            let short_id = ShortId::parse(root_short_id)?;
            // Held until the pass ends so every level, item and ancestor
            // fetch reads the same committed state.
            let _boxes_view = self.boxes.begin_snapshot()?;
            let _items_view = self.items.begin_snapshot()?;
            let Some(root) = self.boxes.find_box_by_short_id(short_id)? else {
                debug!("event=tree_materialize module={MODULE} status=noop short_id={short_id}");
                return Ok(None);
            };
            let root_uuid = root.box_uuid;
            let root_parent = root.parent_uuid;

            let mut collected = self.collect_subtree(root)?;
            let mut items = self.load_items(&collected.item_order)?;
            let tree = link_node(root_uuid, &mut collected, &mut items)?;

            let ancestors = if options.include_ancestors {
                Some(self.ancestors_of(root_uuid, root_parent)?)
            } else {
                None
            };
            let stats = options.include_stats.then(|| compute_stats(&tree));
            let flat_items = options.flatten.then(|| flatten_items(&tree));

            debug!(
                "event=tree_materialize module={MODULE} status=ok short_id={short_id} box_count={} round_trips={}",
                tree.box_count(),
                collected.round_trips
            );
            Ok(Some(MaterializedTree {
                tree,
                ancestors,
                stats,
                flat_items,
            }))
        })
    }

    fn collect_subtree(&self, root: BoxRecord) -> CoreResult<CollectedSubtree> {
        let mut collected = CollectedSubtree {
            records: HashMap::new(),
            children: HashMap::new(),
            item_order: root.item_ids.clone(),
            round_trips: 0,
        };
        let mut seen = HashSet::from([root.box_uuid]);
        let mut frontier = vec![root.box_uuid];
        collected.records.insert(root.box_uuid, root);

        while !frontier.is_empty() {
            let fetched = self.boxes.list_children_of(&frontier)?;
            collected.round_trips += 1;

            let mut next = Vec::with_capacity(fetched.len());
            for child in fetched {
                let Some(parent_uuid) = child.parent_uuid else {
                    continue;
                };
                if !seen.insert(child.box_uuid) {
                    return Err(CoreError::InvariantViolation(format!(
                        "box {} reached twice while collecting subtree; parent links contain a cycle",
                        child.box_uuid
                    )));
                }
                collected
                    .children
                    .entry(parent_uuid)
                    .or_default()
                    .push(child.box_uuid);
                collected.item_order.extend(child.item_ids.iter().copied());
                next.push(child.box_uuid);
                collected.records.insert(child.box_uuid, child);
            }
            frontier = next;
        }
        Ok(collected)
    }

    fn load_items(&self, item_order: &[ItemId]) -> CoreResult<HashMap<ItemId, ItemRecord>> {
        let mut unique = HashSet::with_capacity(item_order.len());
        let wanted = item_order
            .iter()
            .copied()
            .filter(|id| unique.insert(*id))
            .collect::<Vec<_>>();
        if wanted.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .items
            .get_items(&wanted)?
            .into_iter()
            .map(|item| (item.item_uuid, item))
            .collect())
    }

    fn ancestors_of(
        &self,
        root_uuid: BoxId,
        mut cursor: Option<BoxId>,
    ) -> CoreResult<Vec<BoxCrumb>> {
        let mut visited = HashSet::from([root_uuid]);
        let mut ancestors = Vec::new();
        while let Some(current) = cursor {
            if !visited.insert(current) {
                return Err(CoreError::InvariantViolation(format!(
                    "ancestor walk from box {root_uuid} revisited box {current}"
                )));
            }
            let Some(record) = self.boxes.get_box(current)? else {
                break;
            };
            cursor = record.parent_uuid;
            ancestors.push(record.crumb());
        }
        ancestors.reverse();
        Ok(ancestors)
    }
}

fn link_node(
    box_uuid: BoxId,
    collected: &mut CollectedSubtree,
    items: &mut HashMap<ItemId, ItemRecord>,
) -> CoreResult<BoxTree> {
    let record = collected.records.remove(&box_uuid).ok_or_else(|| {
        CoreError::InvariantViolation(format!("box {box_uuid} missing from collected subtree"))
    })?;

    let mut held = Vec::with_capacity(record.item_ids.len());
    for item_uuid in &record.item_ids {
        let item = items.remove(item_uuid).ok_or_else(|| {
            CoreError::InvariantViolation(format!(
                "box {box_uuid} references item {item_uuid} that is missing or held twice"
            ))
        })?;
        held.push(item);
    }

    let child_ids = collected.children.remove(&box_uuid).unwrap_or_default();
    let mut children = Vec::with_capacity(child_ids.len());
    for child_uuid in child_ids {
        children.push(link_node(child_uuid, collected, items)?);
    }

    Ok(BoxTree {
        record,
        items: held,
        children,
    })
}

fn compute_stats(tree: &BoxTree) -> TreeStats {
    let mut names = HashSet::new();
    let mut total_quantity = 0u64;
    tree.visit(&mut |node| {
        for item in &node.items {
            names.insert(name_key(&item.name));
            total_quantity += item.effective_quantity();
        }
    });
    TreeStats {
        box_count: tree.box_count(),
        distinct_item_names: names.len(),
        total_quantity,
    }
}

fn name_key(name: &str) -> String {
    WHITESPACE_RUN_RE
        .replace_all(name.trim(), " ")
        .to_lowercase()
}

fn flatten_items(tree: &BoxTree) -> Vec<FlatItem> {
    fn walk(node: &BoxTree, path: &mut Vec<BoxCrumb>, out: &mut Vec<FlatItem>) {
        let owner = node.record.crumb();
        path.push(owner.clone());
        for item in &node.items {
            out.push(FlatItem {
                item: item.clone(),
                owner: owner.clone(),
                path: path.clone(),
            });
        }
        for child in &node.children {
            walk(child, path, out);
        }
        path.pop();
    }

    let mut out = Vec::new();
    walk(tree, &mut Vec::new(), &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::{compute_stats, flatten_items, BoxTree};
    use crate::model::box_record::BoxRecord;
    use crate::model::item::ItemRecord;
    use crate::model::short_id::ShortId;
    use uuid::Uuid;

    fn node(short_id: &str, items: Vec<ItemRecord>, children: Vec<BoxTree>) -> BoxTree {
        BoxTree {
            record: BoxRecord {
                box_uuid: Uuid::new_v4(),
                short_id: ShortId::parse(short_id).unwrap(),
                label: Some(format!("box {short_id}")),
                location: None,
                description: None,
                notes: None,
                tags: Vec::new(),
                parent_uuid: None,
                item_ids: items.iter().map(|item| item.item_uuid).collect(),
                created_at: 0,
                updated_at: 0,
            },
            items,
            children,
        }
    }

    fn item(name: &str, quantity: u32) -> ItemRecord {
        ItemRecord {
            item_uuid: Uuid::new_v4(),
            name: name.to_string(),
            quantity,
            notes: None,
            tags: Vec::new(),
            orphaned_since: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn stats_merge_name_variants_and_floor_quantity() {
        let tree = node(
            "100",
            vec![item("Duct Tape", 2), item(" duct   tape ", 1)],
            vec![node("101", vec![item("Glue", 0)], Vec::new())],
        );
        let stats = compute_stats(&tree);
        assert_eq!(stats.box_count, 2);
        assert_eq!(stats.distinct_item_names, 2);
        assert_eq!(stats.total_quantity, 4);
    }

    #[test]
    fn flattened_paths_run_from_root_to_owner() {
        let leaf = node("102", vec![item("Fuse", 1)], Vec::new());
        let middle = node("101", Vec::new(), vec![leaf]);
        let tree = node("100", vec![item("Drill", 1)], vec![middle]);

        let flat = flatten_items(&tree);
        assert_eq!(flat.len(), tree.item_count_total());

        let fuse = flat.iter().find(|entry| entry.item.name == "Fuse").unwrap();
        let path = fuse
            .path
            .iter()
            .map(|crumb| crumb.short_id.as_text())
            .collect::<Vec<_>>();
        assert_eq!(path, vec!["100", "101", "102"]);
        assert_eq!(fuse.owner.short_id.as_text(), "102");
    }
}
