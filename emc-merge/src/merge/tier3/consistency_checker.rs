// Tier 3: Consistency Checker
//
// Concept: Catch merges whose member host strings look unrelated, a sign that
// an alias or override joined two different stars
// Synchronization: Accepts final merged entries, writes decision-log warnings
//
// Uses strsim normalized Levenshtein similarity on case-folded host strings.
// Below `min_host_similarity` the entry is reported. No flag is raised: a
// renamed star (e.g. "HD 189733" vs "V452 Vul") is legitimate.

use std::collections::BTreeSet;

use crate::merge::decision_log::{Decision, DecisionLog};
use crate::merge::types::MergedEntry;

/// Consistency checker (Tier 3 validation concept)
///
/// **Legible Software Principle:**
/// - Independent module: Validates without changing entries
/// - Explicit synchronization: Runs after naming, before output
/// - Transparent behavior: Threshold is an explicit field
/// - Integrity: Always returns deterministic results
pub struct ConsistencyChecker {
    /// Pairs of hosts below this similarity are reported
    min_host_similarity: f64,
}

impl Default for ConsistencyChecker {
    fn default() -> Self {
        Self {
            min_host_similarity: 0.5,
        }
    }
}

impl ConsistencyChecker {
    /// Report entries whose member hosts disagree; returns how many
    pub fn check(&self, entries: &[MergedEntry<'_>], log: &mut DecisionLog) -> usize {
        let mut reported = 0;
        for entry in entries {
            if let Some(similarity) = self.lowest_host_similarity(entry) {
                if similarity < self.min_host_similarity {
                    let hosts: Vec<String> = distinct_hosts(entry).into_iter().collect();
                    tracing::warn!(
                        name = %entry.exo_mercat_name,
                        hosts = ?hosts,
                        similarity,
                        "Merged entry has dissimilar host names"
                    );
                    log.record(Decision::HostNamesDissimilar {
                        main_id: entry.main_id.clone(),
                        hosts,
                        similarity,
                    });
                    reported += 1;
                }
            }
        }
        reported
    }

    /// Smallest pairwise similarity of member hosts, if there are two or more
    fn lowest_host_similarity(&self, entry: &MergedEntry<'_>) -> Option<f64> {
        let hosts: Vec<String> = distinct_hosts(entry)
            .into_iter()
            .map(|h| h.to_lowercase())
            .collect();
        let mut lowest: Option<f64> = None;
        for (a, ha) in hosts.iter().enumerate() {
            for hb in hosts.iter().skip(a + 1) {
                let similarity = strsim::normalized_levenshtein(ha, hb);
                lowest = Some(lowest.map_or(similarity, |l| l.min(similarity)));
            }
        }
        lowest
    }
}

fn distinct_hosts(entry: &MergedEntry<'_>) -> BTreeSet<String> {
    entry.members.iter().map(|r| r.host.clone()).collect()
}
