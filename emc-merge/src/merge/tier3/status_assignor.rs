// Tier 3: Status & Flag Assignment
//
// Concept: Final confirmation status of a merged entry from its members,
// plus the union of every flag raised upstream
// Synchronization: Accepts a consolidated `MergedEntry` and its cluster
//
// Precedence: confirmed > candidate > false positive > retracted >
// unconfirmed. One confirmed member is enough; disagreement is kept in the
// original-status string for audit.

use emc_common::Status;
use std::collections::BTreeSet;

use crate::merge::types::{Cluster, MergedEntry, ResolvedRecord};

/// Status and flag assignor (Tier 3 concept)
///
/// **Legible Software Principle:**
/// - Independent module: Reads members, writes status fields and flags only
/// - Explicit synchronization: Runs once per entry after consolidation
/// - Transparent behavior: Raw member statuses stay visible
/// - Integrity: Flags are absorbed, never cleared
#[derive(Debug, Default)]
pub struct StatusAssignor;

impl StatusAssignor {
    pub fn new() -> Self {
        Self
    }

    pub fn assign(&self, entry: &mut MergedEntry<'_>, cluster: &Cluster, records: &[ResolvedRecord<'_>]) {
        let statuses: BTreeSet<Status> = entry.members.iter().map(|r| r.status).collect();

        entry.checked_status = Status::strongest(statuses.iter().copied()).unwrap_or(Status::Unconfirmed);
        entry.status_disagreement = statuses.len() > 1;
        entry.original_status = original_status(entry);

        if entry.status_disagreement {
            tracing::debug!(
                main_id = %entry.main_id,
                letter = %entry.letter,
                checked_status = %entry.checked_status,
                original = %entry.original_status,
                "Member statuses disagree"
            );
        }

        for i in &cluster.members {
            entry.flags.absorb(records[*i].flags);
        }
    }
}

/// Sorted `catalog: raw status` pairs joined by `, `
fn original_status(entry: &MergedEntry<'_>) -> String {
    let pairs: BTreeSet<String> = entry
        .members
        .iter()
        .map(|r| {
            let raw = if r.raw_status.trim().is_empty() {
                r.status.as_str()
            } else {
                r.raw_status.trim()
            };
            format!("{}: {}", r.catalog, raw)
        })
        .collect();
    pairs.into_iter().collect::<Vec<_>>().join(", ")
}
