// Tier 2: Grouping & Merge Engine
//
// Concept: Partition resolved records into clusters, one per physical planet
// Synchronization: Runs after identifier resolution and binary normalization
// (needs final `main_id` and `binary`); hands clusters to the consolidator
//
// Algorithm (fixed point over (main_id, binary) systems):
// 1. Records with a proper letter are grouped by letter, then split into
//    connected components of period similarity (semi-major axis when no
//    period is known)
// 2. Records with an empty or KOI-style letter join the proper-letter
//    cluster their orbit matches; the rest cluster among themselves and get
//    their shared letter or the next unused one
// 3. Synthesized letters are written back and the system is queued again;
//    a system is done when its partition no longer changes
// 4. Stop at the iteration cap with `merging_mismatch_flag` if not stable
// 5. Flag clusters that share a (main_id, binary, letter) key, clusters
//    holding two records of one catalog, and merges no orbit confirms

use emc_common::config::MergeConfig;
use emc_common::SourceCatalog;
use std::collections::{BTreeMap, BTreeSet};

use crate::merge::decision_log::{Decision, DecisionLog, RecordRef};
use crate::merge::tier1::names::{is_proper_letter, strip_binary_suffix};
use crate::merge::types::{Cluster, Flag, Flags, MergedEntry, ResolvedRecord};

type SystemKey = (String, String);

/// Orbit value with its larger error bound
type Orbit = (f64, f64);

/// One cluster inside a system before flags are applied
#[derive(Debug, Clone, PartialEq)]
struct SystemCluster {
    letter: String,
    members: Vec<usize>,
}

/// Result of grouping one run
#[derive(Debug)]
pub struct GroupingOutcome {
    pub clusters: Vec<Cluster>,
    /// Passes made over the worklist
    pub iterations: usize,
    pub converged: bool,
}

/// Grouping engine (Tier 2 concept)
///
/// **Legible Software Principle:**
/// - Independent module: Pure function of resolved records
/// - Explicit synchronization: Bounded worklist, explicit convergence signal
/// - Transparent behavior: Letter assignments and non-convergence are logged
/// - Integrity: Clusters are connected components, independent of input order
pub struct GroupingEngine {
    /// Relative tolerance for period similarity
    period_relative: f64,
    /// Relative tolerance for semi-major axis similarity
    semi_major_axis_relative: f64,
    /// Worklist pass cap
    max_iterations: usize,
}

impl Default for GroupingEngine {
    fn default() -> Self {
        Self {
            period_relative: 0.1,          // 10% of the smaller period
            semi_major_axis_relative: 0.1, // 10% of the smaller axis
            max_iterations: 10,
        }
    }
}

impl GroupingEngine {
    pub fn from_config(config: &MergeConfig) -> Self {
        Self {
            period_relative: config.tolerances.period_relative,
            semi_major_axis_relative: config.tolerances.semi_major_axis_relative,
            max_iterations: config.grouping.max_iterations,
        }
    }

    /// Partition records into clusters; synthesized letters are written to
    /// `ResolvedRecord::letter`
    pub fn group(&self, records: &mut [ResolvedRecord<'_>], log: &mut DecisionLog) -> GroupingOutcome {
        let mut systems: BTreeMap<SystemKey, Vec<usize>> = BTreeMap::new();
        for (i, rr) in records.iter().enumerate() {
            systems
                .entry((rr.main_id.clone(), rr.binary.clone()))
                .or_default()
                .push(i);
        }

        let mut partitions: BTreeMap<SystemKey, Vec<SystemCluster>> = BTreeMap::new();
        let mut worklist: BTreeSet<SystemKey> = systems.keys().cloned().collect();
        let mut iterations = 0;
        let mut converged = true;

        while !worklist.is_empty() {
            if iterations == self.max_iterations {
                converged = false;
                break;
            }
            iterations += 1;

            let mut next = BTreeSet::new();
            for key in worklist {
                let Some(members) = systems.get(&key) else {
                    continue;
                };
                let clusters = self.partition_system(records, members);
                for cluster in &clusters {
                    for i in &cluster.members {
                        records[*i].letter = cluster.letter.clone();
                    }
                }
                if partitions.get(&key) != Some(&clusters) {
                    next.insert(key.clone());
                }
                partitions.insert(key, clusters);
            }
            tracing::debug!(iteration = iterations, changed = next.len(), "Grouping pass complete");
            worklist = next;
        }

        if !converged {
            tracing::warn!(iterations, "Grouping did not converge; last partition kept");
            log.record(Decision::GroupingNotConverged { iterations });
        }

        let mut clusters = Vec::new();
        for ((main_id, binary), system) in partitions {
            for sc in system {
                clusters.push(Cluster {
                    main_id: main_id.clone(),
                    binary: binary.clone(),
                    letter: sc.letter,
                    members: sc.members,
                    flags: Flags::default(),
                    duplicate_names: BTreeSet::new(),
                });
            }
        }

        self.log_letter_assignments(records, &clusters, log);
        self.flag_clusters(records, &mut clusters, converged, log);

        tracing::info!(
            records = records.len(),
            clusters = clusters.len(),
            iterations,
            converged,
            "Grouping complete"
        );

        GroupingOutcome {
            clusters,
            iterations,
            converged,
        }
    }

    /// One pass over a (main_id, binary) system
    fn partition_system(&self, records: &[ResolvedRecord<'_>], members: &[usize]) -> Vec<SystemCluster> {
        let (proper, improper): (Vec<usize>, Vec<usize>) = members
            .iter()
            .copied()
            .partition(|i| is_proper_letter(&records[*i].letter));

        // Step 1: proper letters
        let mut by_letter: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for i in proper {
            by_letter.entry(records[i].letter.clone()).or_default().push(i);
        }
        let mut clusters: Vec<SystemCluster> = Vec::new();
        for (letter, group) in by_letter {
            for component in self.split_by_orbit(records, &group) {
                clusters.push(SystemCluster {
                    letter: letter.clone(),
                    members: component,
                });
            }
        }
        self.note_period_collisions(records, &clusters);

        // Step 2: improper letters join a matching proper cluster
        let mut remaining = Vec::new();
        for i in improper {
            match self.best_match(records, i, &clusters) {
                Some(target) => clusters[target].members.push(i),
                None => remaining.push(i),
            }
        }

        let mut used: BTreeSet<String> = clusters.iter().map(|c| c.letter.clone()).collect();
        let mut orphans = self.split_by_orbit(records, &remaining);
        orphans.sort_by(|a, b| {
            let pa = min_orbit(records, a);
            let pb = min_orbit(records, b);
            pa.total_cmp(&pb).then_with(|| a.cmp(b))
        });
        for component in orphans {
            let letters: BTreeSet<&str> = component
                .iter()
                .map(|i| records[*i].letter.as_str())
                .filter(|l| !l.is_empty())
                .collect();
            let letter = match letters.iter().next() {
                Some(l) if letters.len() == 1 => l.to_string(),
                _ => next_free_letter(&used),
            };
            used.insert(letter.clone());
            clusters.push(SystemCluster {
                letter,
                members: component,
            });
        }

        for cluster in &mut clusters {
            cluster.members.sort_unstable();
        }
        clusters.sort_by(|a, b| a.letter.cmp(&b.letter).then_with(|| a.members.cmp(&b.members)));
        clusters
    }

    /// Connected components of orbit similarity
    ///
    /// Period decides when both records have one; otherwise the semi-major
    /// axis. Records with no orbit at all stay together, and join the other
    /// records when those form a single component.
    fn split_by_orbit(&self, records: &[ResolvedRecord<'_>], group: &[usize]) -> Vec<Vec<usize>> {
        let (with_orbit, without): (Vec<usize>, Vec<usize>) = group
            .iter()
            .copied()
            .partition(|i| records[*i].period().is_some() || records[*i].semi_major_axis().is_some());

        let mut components = connected_components(&with_orbit, |a, b| self.same_orbit(&records[a], &records[b]));

        if !without.is_empty() {
            if components.len() == 1 {
                components[0].extend(without);
            } else {
                components.push(without);
            }
        }
        components
    }

    fn same_orbit(&self, a: &ResolvedRecord<'_>, b: &ResolvedRecord<'_>) -> bool {
        match (a.period(), b.period()) {
            (Some(pa), Some(pb)) => similar(pa, pb, self.period_relative),
            _ => match (a.semi_major_axis(), b.semi_major_axis()) {
                (Some(aa), Some(ab)) => similar(aa, ab, self.semi_major_axis_relative),
                _ => false,
            },
        }
    }

    /// Proper cluster an improper record belongs to, if any
    ///
    /// Several matches go to the closest period, then the smaller letter.
    fn best_match(&self, records: &[ResolvedRecord<'_>], i: usize, clusters: &[SystemCluster]) -> Option<usize> {
        let rr = &records[i];
        let own = rr.period().or_else(|| rr.semi_major_axis())?.0;

        clusters
            .iter()
            .enumerate()
            .filter_map(|(idx, c)| {
                let distance = c
                    .members
                    .iter()
                    .filter(|m| self.same_orbit(rr, &records[**m]))
                    .filter_map(|m| records[*m].period().or_else(|| records[*m].semi_major_axis()))
                    .map(|(v, _)| (v - own).abs())
                    .min_by(f64::total_cmp)?;
                Some((idx, distance))
            })
            .min_by(|a, b| {
                a.1.total_cmp(&b.1)
                    .then_with(|| clusters[a.0].letter.cmp(&clusters[b.0].letter))
            })
            .map(|(idx, _)| idx)
    }

    /// Two different letters with the same period are reported, not merged
    fn note_period_collisions(&self, records: &[ResolvedRecord<'_>], clusters: &[SystemCluster]) {
        for (a, ca) in clusters.iter().enumerate() {
            for cb in clusters.iter().skip(a + 1) {
                if ca.letter == cb.letter {
                    continue;
                }
                let collide = ca.members.iter().any(|x| {
                    cb.members.iter().any(|y| {
                        matches!(
                            (records[*x].period(), records[*y].period()),
                            (Some(px), Some(py)) if similar(px, py, self.period_relative)
                        )
                    })
                });
                if collide {
                    if let Some(first) = ca.members.first() {
                        tracing::warn!(
                            main_id = %records[*first].main_id,
                            letter_a = %ca.letter,
                            letter_b = %cb.letter,
                            "Distinct planet letters share a period"
                        );
                    }
                }
            }
        }
    }

    fn log_letter_assignments(&self, records: &[ResolvedRecord<'_>], clusters: &[Cluster], log: &mut DecisionLog) {
        for cluster in clusters {
            let changed: Vec<&ResolvedRecord<'_>> = cluster
                .members
                .iter()
                .map(|i| &records[*i])
                .filter(|rr| rr.record.letter != cluster.letter)
                .collect();
            if changed.is_empty() {
                continue;
            }
            let synthesized = cluster
                .members
                .iter()
                .all(|i| records[*i].record.letter != cluster.letter);
            log.record(Decision::LetterAssigned {
                main_id: cluster.main_id.clone(),
                binary: cluster.binary.clone(),
                letter: cluster.letter.clone(),
                synthesized,
                records: changed.iter().map(|rr| RecordRef::from(rr.record)).collect(),
            });
        }
    }

    fn flag_clusters(
        &self,
        records: &[ResolvedRecord<'_>],
        clusters: &mut [Cluster],
        converged: bool,
        log: &mut DecisionLog,
    ) {
        let mut by_key: BTreeMap<(String, String, String), Vec<usize>> = BTreeMap::new();
        for (idx, cluster) in clusters.iter().enumerate() {
            by_key
                .entry((cluster.main_id.clone(), cluster.binary.clone(), cluster.letter.clone()))
                .or_default()
                .push(idx);
        }

        // Several clusters claim one key
        for ((main_id, _, letter), idxs) in &by_key {
            if idxs.len() < 2 {
                continue;
            }
            let mut refs = Vec::new();
            for idx in idxs {
                let cluster = &mut clusters[*idx];
                cluster.flags.raise(Flag::DuplicateCatalog);
                for m in &cluster.members {
                    let record = records[*m].record;
                    cluster
                        .duplicate_names
                        .insert(format!("{}: {}", record.catalog, record.name));
                    refs.push(RecordRef::from(record));
                }
            }
            log.flag(
                Flag::DuplicateCatalog,
                main_id,
                format!("{} clusters with irreconcilable orbits share letter '{}'", idxs.len(), letter),
                refs,
            );
        }

        for cluster in clusters.iter_mut() {
            // One catalog twice in a cluster
            let mut per_catalog: BTreeMap<SourceCatalog, Vec<usize>> = BTreeMap::new();
            for m in &cluster.members {
                per_catalog.entry(records[*m].record.catalog).or_default().push(*m);
            }
            let repeated: Vec<usize> = per_catalog
                .values()
                .filter(|v| v.len() > 1)
                .flatten()
                .copied()
                .collect();
            if !repeated.is_empty() {
                cluster.flags.raise(Flag::DuplicateCatalog);
                for m in &repeated {
                    let record = records[*m].record;
                    cluster
                        .duplicate_names
                        .insert(format!("{}: {}", record.catalog, record.name));
                }
                log.flag(
                    Flag::DuplicateCatalog,
                    &cluster.main_id,
                    format!("one catalog lists planet '{}' more than once", cluster.letter),
                    repeated.iter().map(|m| RecordRef::from(records[*m].record)).collect(),
                );
            }

            // Merge with nothing to confirm it
            let orbitless = cluster
                .members
                .iter()
                .all(|m| records[*m].period().is_none() && records[*m].semi_major_axis().is_none());
            if cluster.members.len() > 1 && orbitless {
                cluster.flags.raise(Flag::MergingMismatch);
                log.flag(
                    Flag::MergingMismatch,
                    &cluster.main_id,
                    format!("planet '{}' merged on letter alone; no period or axis", cluster.letter),
                    cluster.members.iter().map(|m| RecordRef::from(records[*m].record)).collect(),
                );
            }

            if !converged {
                cluster.flags.raise(Flag::MergingMismatch);
            }
        }

        if !converged {
            for cluster in clusters.iter() {
                log.flag(
                    Flag::MergingMismatch,
                    &cluster.main_id,
                    "grouping did not converge",
                    cluster.members.iter().map(|m| RecordRef::from(records[*m].record)).collect(),
                );
            }
        }
    }
}

/// `|x1 - x2| <= tol * min(x1, x2) + sqrt(s1^2 + s2^2)`
fn similar(a: Orbit, b: Orbit, relative: f64) -> bool {
    (a.0 - b.0).abs() <= relative * a.0.min(b.0) + a.1.hypot(b.1)
}

/// Smallest orbit value in a component, for deterministic letter order
fn min_orbit(records: &[ResolvedRecord<'_>], component: &[usize]) -> f64 {
    component
        .iter()
        .filter_map(|i| records[*i].period().or_else(|| records[*i].semi_major_axis()))
        .map(|(v, _)| v)
        .min_by(f64::total_cmp)
        .unwrap_or(f64::INFINITY)
}

fn next_free_letter(used: &BTreeSet<String>) -> String {
    ('b'..='z')
        .map(|c| c.to_string())
        .find(|l| !used.contains(l))
        .unwrap_or_else(|| format!("b{}", used.len()))
}

/// Connected components of `related` over `items`, each sorted, ordered by
/// smallest member
fn connected_components(items: &[usize], related: impl Fn(usize, usize) -> bool) -> Vec<Vec<usize>> {
    let mut parent: Vec<usize> = (0..items.len()).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for a in 0..items.len() {
        for b in (a + 1)..items.len() {
            if related(items[a], items[b]) {
                let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
                if ra != rb {
                    parent[ra.max(rb)] = ra.min(rb);
                }
            }
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for a in 0..items.len() {
        let root = find(&mut parent, a);
        groups.entry(root).or_default().push(items[a]);
    }
    let mut components: Vec<Vec<usize>> = groups
        .into_values()
        .map(|mut g| {
            g.sort_unstable();
            g
        })
        .collect();
    components.sort();
    components
}

/// Give every entry its `exo_mercat_name`
///
/// Name is `main_id` without a trailing component label, then binary, then
/// letter. Colliding names get ` (2)`, ` (3)`, ... in period order.
pub fn assign_exo_mercat_names(entries: &mut [MergedEntry<'_>]) {
    let mut by_name: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, entry) in entries.iter().enumerate() {
        let stem = strip_binary_suffix(&entry.main_id)
            .map(|(stem, _)| stem)
            .unwrap_or_else(|| entry.main_id.clone());
        let name = [stem.as_str(), entry.binary.as_str(), entry.letter.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        by_name.entry(name).or_default().push(idx);
    }

    for (name, mut idxs) in by_name {
        idxs.sort_by(|a, b| {
            let pa = entries[*a].quantity(emc_common::QuantityKind::Period).map(|q| q.value);
            let pb = entries[*b].quantity(emc_common::QuantityKind::Period).map(|q| q.value);
            pa.unwrap_or(f64::INFINITY)
                .total_cmp(&pb.unwrap_or(f64::INFINITY))
                .then_with(|| entries[*a].main_id.cmp(&entries[*b].main_id))
                .then_with(|| {
                    let na = entries[*a].members.first().map(|r| &r.name);
                    let nb = entries[*b].members.first().map(|r| &r.name);
                    na.cmp(&nb)
                })
        });
        for (n, idx) in idxs.iter().enumerate() {
            entries[*idx].exo_mercat_name = if n == 0 {
                name.clone()
            } else {
                format!("{} ({})", name, n + 1)
            };
        }
    }
}
