// Tier 2: Binary Designation Normalization
//
// Concept: Make the stellar component label (`A`, `B`, `AB`, `N`, ...)
// consistent across catalogs for records of the same planet of the same star
// Synchronization: Runs on resolved records after identifier resolution and
// before grouping; edits only `ResolvedRecord::binary` and flags
//
// Algorithm:
// 1. Group records by (main_id, letter)
// 2. No labels in the group: leave it alone (labels are never invented)
// 3. One label: unlabeled members inherit it; flag only when the members'
//    positions disagree
// 4. Several labels, positions agree: relabel all to the majority label and
//    flag
// 5. Several labels, positions disagree: a genuine multiple system; labels
//    are kept, unlabeled members take the label of the nearest labeled
//    member within tolerance, and the group is flagged

use emc_common::config::{MergeConfig, ARCSECOND_DEG};
use emc_common::SourceCatalog;
use std::collections::{BTreeMap, BTreeSet};

use crate::merge::decision_log::{Decision, DecisionLog, RecordRef};
use crate::merge::types::{Flag, ResolvedRecord};

/// Labels that carry no component information
const UNLABELED: [&str; 2] = ["", "S-type"];

/// Binary designation normalizer (Tier 2 concept)
///
/// **Legible Software Principle:**
/// - Independent module: Works on resolved records only, no lookups
/// - Explicit synchronization: Must run before grouping, which keys on `binary`
/// - Transparent behavior: Every relabel is logged with old and new label
/// - Integrity: Never invents a label no source provided
pub struct BinaryNormalizer {
    /// Positions closer than this (degrees) are the same star
    angular_tolerance_deg: f64,
    /// Catalog order used to break majority ties
    precedence: Vec<SourceCatalog>,
}

impl Default for BinaryNormalizer {
    fn default() -> Self {
        Self {
            angular_tolerance_deg: ARCSECOND_DEG, // 1 arcsecond
            precedence: SourceCatalog::ALL.to_vec(),
        }
    }
}

impl BinaryNormalizer {
    pub fn from_config(config: &MergeConfig) -> Self {
        Self {
            angular_tolerance_deg: config.tolerances.angular_separation_deg,
            precedence: config.catalogs.precedence.clone(),
        }
    }

    /// Harmonize binary labels in place
    pub fn normalize(&self, records: &mut [ResolvedRecord<'_>], log: &mut DecisionLog) {
        for rr in records.iter_mut() {
            if UNLABELED.contains(&rr.binary.as_str()) {
                rr.binary.clear();
            }
        }

        let mut groups: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
        for (i, rr) in records.iter().enumerate() {
            groups
                .entry((rr.main_id.clone(), rr.letter.clone()))
                .or_default()
                .push(i);
        }

        let mut relabeled = 0usize;
        for ((main_id, letter), members) in &groups {
            let labels: BTreeSet<String> = members
                .iter()
                .map(|i| records[*i].binary.clone())
                .filter(|b| !b.is_empty())
                .collect();

            if labels.is_empty() {
                continue;
            }

            let agree = self.positions_agree(records, members);

            if labels.len() == 1 {
                let Some(label) = labels.iter().next() else {
                    continue;
                };
                relabeled += self.relabel(records, members, main_id, letter, label, log, |b| b.is_empty());
                if !agree {
                    self.raise(
                        records,
                        members,
                        main_id,
                        "component label inherited across disagreeing positions",
                        log,
                    );
                }
            } else if agree {
                let label = self.majority_label(records, members);
                relabeled += self.relabel(records, members, main_id, letter, &label, log, |b| *b != label);
                self.raise(
                    records,
                    members,
                    main_id,
                    format!(
                        "catalogs disagree on component ({}); majority '{}' used",
                        labels.iter().cloned().collect::<Vec<_>>().join(", "),
                        label
                    ),
                    log,
                );
            } else {
                relabeled += self.attach_to_nearest(records, members, main_id, letter, log);
                self.raise(
                    records,
                    members,
                    main_id,
                    format!(
                        "multiple system ({}) with disagreeing positions; labels kept",
                        labels.iter().cloned().collect::<Vec<_>>().join(", ")
                    ),
                    log,
                );
            }
        }

        tracing::info!(groups = groups.len(), relabeled, "Binary labels normalized");
    }

    /// True when every pair of member positions lies within tolerance
    fn positions_agree(&self, records: &[ResolvedRecord<'_>], members: &[usize]) -> bool {
        let positions: Vec<_> = members
            .iter()
            .filter_map(|i| records[*i].record.coordinates)
            .collect();
        positions.iter().enumerate().all(|(a, pa)| {
            positions
                .iter()
                .skip(a + 1)
                .all(|pb| pa.within(pb, self.angular_tolerance_deg))
        })
    }

    /// Most supported label; ties go to the best catalog among supporters,
    /// then to the lexicographically first label
    fn majority_label(&self, records: &[ResolvedRecord<'_>], members: &[usize]) -> String {
        let mut support: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for i in members {
            let rr = &records[*i];
            if rr.binary.is_empty() {
                continue;
            }
            let rank = self
                .precedence
                .iter()
                .position(|c| *c == rr.record.catalog)
                .unwrap_or(usize::MAX);
            let entry = support.entry(rr.binary.as_str()).or_insert((0, usize::MAX));
            entry.0 += 1;
            entry.1 = entry.1.min(rank);
        }

        support
            .iter()
            .min_by(|(la, (ca, ra)), (lb, (cb, rb))| cb.cmp(ca).then(ra.cmp(rb)).then(la.cmp(lb)))
            .map(|(label, _)| label.to_string())
            .unwrap_or_default()
    }

    /// Set `label` on members selected by `pick`; returns how many changed
    #[allow(clippy::too_many_arguments)]
    fn relabel(
        &self,
        records: &mut [ResolvedRecord<'_>],
        members: &[usize],
        main_id: &str,
        letter: &str,
        label: &str,
        log: &mut DecisionLog,
        pick: impl Fn(&String) -> bool,
    ) -> usize {
        let mut by_old: BTreeMap<String, Vec<RecordRef>> = BTreeMap::new();
        for i in members {
            let rr = &mut records[*i];
            if pick(&rr.binary) && rr.binary != label {
                by_old
                    .entry(std::mem::replace(&mut rr.binary, label.to_string()))
                    .or_default()
                    .push(RecordRef::from(rr.record));
            }
        }

        let changed = by_old.values().map(Vec::len).sum();
        for (from, refs) in by_old {
            tracing::debug!(main_id, letter, from = %from, to = label, "Binary label changed");
            log.record(Decision::BinaryRelabeled {
                main_id: main_id.to_string(),
                letter: letter.to_string(),
                from,
                to: label.to_string(),
                records: refs,
            });
        }
        changed
    }

    fn attach_to_nearest(
        &self,
        records: &mut [ResolvedRecord<'_>],
        members: &[usize],
        main_id: &str,
        letter: &str,
        log: &mut DecisionLog,
    ) -> usize {
        let labeled: Vec<(String, emc_common::Coordinates)> = members
            .iter()
            .filter(|i| !records[**i].binary.is_empty())
            .filter_map(|i| {
                records[*i]
                    .record
                    .coordinates
                    .map(|c| (records[*i].binary.clone(), c))
            })
            .collect();

        let mut changed = 0;
        for i in members {
            if !records[*i].binary.is_empty() {
                continue;
            }
            let Some(position) = records[*i].record.coordinates else {
                continue;
            };
            let nearest = labeled
                .iter()
                .map(|(label, c)| (position.separation_deg(c), label))
                .filter(|(sep, _)| *sep <= self.angular_tolerance_deg)
                .min_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
            if let Some((_, label)) = nearest {
                let label = label.clone();
                changed += self.relabel(records, &[*i], main_id, letter, &label, log, |b| b.is_empty());
            }
        }
        changed
    }

    fn raise(
        &self,
        records: &mut [ResolvedRecord<'_>],
        members: &[usize],
        main_id: &str,
        reason: impl Into<String>,
        log: &mut DecisionLog,
    ) {
        let mut refs = Vec::with_capacity(members.len());
        for i in members {
            records[*i].flags.raise(Flag::BinaryMismatch);
            refs.push(RecordRef::from(records[*i].record));
        }
        log.flag(Flag::BinaryMismatch, main_id, reason, refs);
    }
}
