//! Store-wide consistency audit.
//!
//! # Responsibility
//! - Scan parent links and custody rows and report every broken invariant.
//!
//! # Invariants
//! - Read-only: findings are reported, never repaired.
//! - Each parent cycle is reported once, listing its members in walk order.

use crate::model::box_record::BoxId;
use crate::model::item::ItemId;
use crate::repo::audit_repo::{AuditRepository, CustodyRow, ParentLink};
use crate::service::error::{CoreError, CoreResult};
use crate::service::logged;
use log::{error, info};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

const MODULE: &str = "integrity_service";

/// One broken invariant found by the audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AuditFinding {
    /// Following parent links from these boxes returns to the start.
    ParentCycle { box_uuids: Vec<BoxId> },
    /// A box points at a parent that does not exist.
    DanglingParent { box_uuid: BoxId, parent_uuid: BoxId },
    /// A held item still carries an orphan timestamp.
    HeldButOrphaned {
        item_uuid: ItemId,
        holder: BoxId,
        orphaned_since: i64,
    },
    /// An unheld item has no orphan timestamp.
    UnheldWithoutTimestamp { item_uuid: ItemId },
}

impl Display for AuditFinding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParentCycle { box_uuids } => {
                let members = box_uuids
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" -> ");
                write!(f, "parent cycle through {members}")
            }
            Self::DanglingParent {
                box_uuid,
                parent_uuid,
            } => write!(f, "box {box_uuid} points at missing parent {parent_uuid}"),
            Self::HeldButOrphaned {
                item_uuid, holder, ..
            } => write!(
                f,
                "item {item_uuid} is held by box {holder} but marked orphaned"
            ),
            Self::UnheldWithoutTimestamp { item_uuid } => {
                write!(f, "item {item_uuid} is held by no box and has no orphan timestamp")
            }
        }
    }
}

/// Result of one audit scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub boxes_scanned: usize,
    pub items_scanned: usize,
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Integrity audit facade.
pub struct IntegrityService<R: AuditRepository> {
    repo: R,
}

impl<R: AuditRepository> IntegrityService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Scans the whole store.
    pub fn audit(&self) -> CoreResult<AuditReport> {
        logged("integrity_audit", MODULE, || {
            let _view = self.repo.begin_snapshot()?;
            let links = self.repo.parent_links()?;
            let custody = self.repo.custody_rows()?;

            let mut findings = hierarchy_findings(&links);
            findings.extend(custody.iter().filter_map(custody_finding));

            let report = AuditReport {
                boxes_scanned: links.len(),
                items_scanned: custody.len(),
                findings,
            };
            if report.is_consistent() {
                info!(
                    "event=integrity_audit module={MODULE} status=ok boxes={} items={}",
                    report.boxes_scanned, report.items_scanned
                );
            } else {
                error!(
                    "event=integrity_audit module={MODULE} status=inconsistent boxes={} items={} findings={}",
                    report.boxes_scanned,
                    report.items_scanned,
                    report.findings.len()
                );
            }
            Ok(report)
        })
    }

    /// Fails with `InvariantViolation` naming the first finding, if any.
    pub fn ensure_consistent(&self) -> CoreResult<()> {
        let report = self.audit()?;
        match report.findings.first() {
            None => Ok(()),
            Some(first) => Err(CoreError::InvariantViolation(format!(
                "{first} ({} finding(s) total)",
                report.findings.len()
            ))),
        }
    }
}

fn hierarchy_findings(links: &[ParentLink]) -> Vec<AuditFinding> {
    let parents: HashMap<BoxId, Option<BoxId>> = links
        .iter()
        .map(|link| (link.box_uuid, link.parent_uuid))
        .collect();

    let mut findings = Vec::new();
    for link in links {
        if let Some(parent_uuid) = link.parent_uuid {
            if !parents.contains_key(&parent_uuid) {
                findings.push(AuditFinding::DanglingParent {
                    box_uuid: link.box_uuid,
                    parent_uuid,
                });
            }
        }
    }

    let mut settled: HashSet<BoxId> = HashSet::new();
    for link in links {
        let mut path: Vec<BoxId> = Vec::new();
        let mut on_path: HashSet<BoxId> = HashSet::new();
        let mut cursor = Some(link.box_uuid);
        while let Some(current) = cursor {
            if settled.contains(&current) {
                break;
            }
            if !on_path.insert(current) {
                if let Some(start) = path.iter().position(|id| *id == current) {
                    findings.push(AuditFinding::ParentCycle {
                        box_uuids: path[start..].to_vec(),
                    });
                }
                break;
            }
            path.push(current);
            cursor = parents.get(&current).copied().flatten();
        }
        settled.extend(path);
    }
    findings
}

fn custody_finding(row: &CustodyRow) -> Option<AuditFinding> {
    match (row.holder, row.orphaned_since) {
        (Some(holder), Some(orphaned_since)) => Some(AuditFinding::HeldButOrphaned {
            item_uuid: row.item_uuid,
            holder,
            orphaned_since,
        }),
        (None, None) => Some(AuditFinding::UnheldWithoutTimestamp {
            item_uuid: row.item_uuid,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{hierarchy_findings, AuditFinding};
    use crate::model::short_id::ShortId;
    use crate::repo::audit_repo::ParentLink;
    use uuid::Uuid;

    fn link(number: u16, box_uuid: Uuid, parent_uuid: Option<Uuid>) -> ParentLink {
        ParentLink {
            box_uuid,
            short_id: ShortId::from_number(number).unwrap(),
            parent_uuid,
        }
    }

    #[test]
    fn clean_chain_has_no_findings() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let links = vec![link(1, a, None), link(2, b, Some(a)), link(3, c, Some(b))];
        assert!(hierarchy_findings(&links).is_empty());
    }

    #[test]
    fn loop_is_reported_once_with_tail_excluded() {
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        // c -> a -> b -> a
        let links = vec![link(1, a, Some(b)), link(2, b, Some(a)), link(3, c, Some(a))];
        let findings = hierarchy_findings(&links);
        assert_eq!(findings.len(), 1);
        match &findings[0] {
            AuditFinding::ParentCycle { box_uuids } => {
                assert_eq!(box_uuids.len(), 2);
                assert!(!box_uuids.contains(&c));
            }
            other => panic!("unexpected finding: {other:?}"),
        }
    }

    #[test]
    fn missing_parent_is_dangling() {
        let (a, ghost) = (Uuid::new_v4(), Uuid::new_v4());
        let findings = hierarchy_findings(&[link(1, a, Some(ghost))]);
        assert_eq!(
            findings,
            vec![AuditFinding::DanglingParent {
                box_uuid: a,
                parent_uuid: ghost
            }]
        );
    }
}
