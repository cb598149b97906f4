// Tier 2: Identifier Resolution
//
// Concept: Map every source record to a canonical stellar identifier
// (`main_id`) through an external lookup capability, and surface every
// ambiguity instead of silently picking one.
// Synchronization: Accepts canonically ordered `&SourceRecord`s, outputs
// `ResolvedRecord`s in the same order plus the alias union per identifier.
//
// Algorithm:
// 1. Plan a query cascade per record: override, host (with binary variants),
//    aliases, TIC number, coordinate cone
// 2. Run the cascade in phases (host, alias, TIC, cone). Each phase issues
//    its distinct uncached queries with bounded concurrency and completes
//    before the next starts; records settled by an earlier phase skip the
//    later ones. Name queries go out in batches when the lookup batches
// 3. Pick per record the first candidate within the angular tolerance, else
//    the first candidate with `angular_separation_flag`, else leave the
//    record unresolved (host string as identifier, flagged)
// 4. Polish identifiers: a returned planet is re-resolved as its star, a
//    trailing component label becomes a binary hint
// 5. Fold identifiers that share an external id into one
// 6. Detect identity conflicts between linked strings (same record, or same
//    spelling up to qualifiers); overrides settle them, otherwise abort
// 7. Flag distinct identifiers at the same position (coordinate mismatch)
//    and union aliases per identifier

use emc_common::config::MergeConfig;
use emc_common::{Coordinates, SourceCatalog, SourceRecord};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::overrides::OverrideTable;
use super::resolution_cache::{CacheKey, CachedOutcome, ResolutionCache};
use crate::error::{MergeError, MergeResult};
use crate::merge::decision_log::{Decision, DecisionLog, RecordRef};
use crate::merge::tier1::lookup::{BatchResult, LookupHit, LookupResult, StellarLookup};
use crate::merge::tier1::names::{name_key, strip_binary_suffix, strip_planet_letter, tic_id};
use crate::merge::tier1::retry::{retry_lookup, retry_with_backoff, RetryPolicy};
use crate::merge::types::{
    Flag, IdentifierResolution, MainIdProvenance, ResolutionMethod, ResolvedRecord,
};

/// Output of identifier resolution for one run
#[derive(Debug)]
pub struct ResolutionOutcome<'a> {
    /// One entry per input record, same order
    pub records: Vec<ResolvedRecord<'a>>,
    /// `main_id` -> union of every name seen for it
    pub aliases: BTreeMap<String, BTreeSet<String>>,
}

/// One step of a record's query cascade
#[derive(Debug, Clone)]
struct QueryStep {
    method: ResolutionMethod,
    key: CacheKey,
    query: String,
}

#[derive(Debug, Clone)]
struct RecordPlan {
    /// (query, target) when an override covers the host or an alias
    forced: Option<(String, String)>,
    steps: Vec<QueryStep>,
}

/// A cached hit considered for a record
#[derive(Debug, Clone)]
struct Candidate {
    method: ResolutionMethod,
    query: String,
    hit: LookupHit,
    separation_deg: Option<f64>,
    within: bool,
}

/// Unit of lookup work within a phase
#[derive(Debug)]
enum Work {
    Single(CacheKey),
    Batch(Vec<String>),
}

/// Identifier after planet/component suffix handling
#[derive(Debug, Clone)]
struct Polished {
    main_id: String,
    coordinates: Option<Coordinates>,
    ids: BTreeSet<String>,
    binary_hint: Option<String>,
}

/// Identifier resolver (Tier 2 concept)
///
/// **Legible Software Principle:**
/// - Independent module: Talks to the outside world only through `StellarLookup`
/// - Explicit synchronization: All lookups finish before `resolve_all` returns
/// - Transparent behavior: Every override, conflict and flag is logged
/// - Integrity: A query string maps to exactly one identifier per run
pub struct IdentifierResolver {
    lookup: Arc<dyn StellarLookup>,
    policy: RetryPolicy,
    /// Lookups in flight at once
    max_concurrency: usize,
    /// Positions closer than this (degrees) are the same star
    angular_tolerance_deg: f64,
    /// Cone radius (degrees) for coordinate fallback
    coordinate_radius_deg: f64,
    overrides: OverrideTable,
    precedence: Vec<SourceCatalog>,
    cache: ResolutionCache,
}

impl IdentifierResolver {
    pub fn new(lookup: Arc<dyn StellarLookup>, config: &MergeConfig) -> MergeResult<Self> {
        Ok(Self {
            lookup,
            policy: RetryPolicy::from_config(&config.resolver),
            max_concurrency: config.resolver.max_concurrency.max(1),
            angular_tolerance_deg: config.tolerances.angular_separation_deg,
            coordinate_radius_deg: config.resolver.coordinate_search_radius_deg,
            overrides: OverrideTable::from_config(&config.overrides)?,
            precedence: config.catalogs.precedence.clone(),
            cache: ResolutionCache::new(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    /// Resolve every record
    ///
    /// # Errors
    /// `IdentityConflict` when linked strings resolve to different
    /// identifiers at the same position and no override settles it;
    /// `ContradictoryOverride` when one linked group is forced two ways.
    pub async fn resolve_all<'a>(
        &mut self,
        records: &[&'a SourceRecord],
        log: &mut DecisionLog,
    ) -> MergeResult<ResolutionOutcome<'a>> {
        let plans: Vec<RecordPlan> = records.iter().map(|r| self.plan_for(r)).collect();

        tracing::info!(
            records = records.len(),
            forced = plans.iter().filter(|p| p.forced.is_some()).count(),
            lookup = self.lookup.name(),
            "Starting identifier resolution"
        );

        // Steps 1-2: phased lookups
        for method in [
            ResolutionMethod::HostSearch,
            ResolutionMethod::AliasSearch,
            ResolutionMethod::TicSearch,
            ResolutionMethod::CoordinateSearch,
        ] {
            let keys: Vec<CacheKey> = records
                .iter()
                .zip(&plans)
                .filter(|(record, plan)| plan.forced.is_none() && !self.is_settled(record, plan))
                .flat_map(|(_, plan)| {
                    plan.steps
                        .iter()
                        .filter(|s| s.method == method)
                        .map(|s| s.key.clone())
                })
                .collect();
            self.run_phase(&method.to_string(), keys, log).await;
        }

        // Step 3: candidate choice
        let chosen: Vec<Option<Candidate>> = records
            .iter()
            .zip(&plans)
            .map(|(record, plan)| {
                if plan.forced.is_some() {
                    None
                } else {
                    self.choose_candidate(record, plan)
                }
            })
            .collect();

        // Step 4: planets returned instead of stars are looked up again
        let polish_keys: Vec<CacheKey> = chosen
            .iter()
            .flatten()
            .filter_map(|c| strip_planet_letter(&c.hit.main_id))
            .map(CacheKey::Name)
            .collect();
        self.run_phase("polish", polish_keys, log).await;

        let polished: Vec<Option<Polished>> = chosen
            .iter()
            .map(|c| c.as_ref().map(|c| self.polish(&c.hit)))
            .collect();

        // Step 5: shared external ids
        let unified = self.unify_shared_ids(&chosen, &polished, log);

        let mut resolved = self.assemble(records, &plans, &chosen, &polished, &unified, log);

        // Step 6: identity conflicts
        self.detect_conflicts(records, &mut resolved, &unified, log)?;

        // Step 7: coordinate mismatches and alias union
        self.flag_coordinate_mismatches(records, &mut resolved, log);
        let aliases = collect_aliases(&resolved);

        let (hits, not_found, failed) = self.cache.summary();
        tracing::info!(
            queries = self.cache.len(),
            hits,
            not_found,
            failed,
            identifiers = aliases.len(),
            unresolved = resolved.iter().filter(|r| r.flags.is_set(Flag::Unresolved)).count(),
            "Identifier resolution complete"
        );

        Ok(ResolutionOutcome {
            records: resolved,
            aliases,
        })
    }

    fn plan_for(&self, record: &SourceRecord) -> RecordPlan {
        let forced = std::iter::once(&record.host)
            .chain(record.aliases.iter())
            .find_map(|q| self.overrides.get(q).map(|t| (q.clone(), t.to_string())));

        let mut steps = Vec::new();
        let mut push = |method, query: String| {
            steps.push(QueryStep {
                method,
                key: CacheKey::Name(query.clone()),
                query,
            })
        };

        if !record.binary.is_empty() {
            push(
                ResolutionMethod::HostSearch,
                format!("{} {}", record.host, record.binary),
            );
            push(
                ResolutionMethod::HostSearch,
                format!("{}{}", record.host, record.binary),
            );
        }
        push(ResolutionMethod::HostSearch, record.host.clone());
        for alias in &record.aliases {
            push(ResolutionMethod::AliasSearch, alias.clone());
        }

        let tic = tic_id(&record.host).or_else(|| record.aliases.iter().find_map(|a| tic_id(a)));
        if let Some(tic) = tic {
            steps.push(QueryStep {
                method: ResolutionMethod::TicSearch,
                key: CacheKey::Tic(tic),
                query: format!("TIC {}", tic),
            });
        }
        if let Some(coordinates) = record.coordinates {
            steps.push(QueryStep {
                method: ResolutionMethod::CoordinateSearch,
                key: CacheKey::cone(coordinates),
                query: format!("{:.6} {:+.6}", coordinates.ra, coordinates.dec),
            });
        }

        RecordPlan { forced, steps }
    }

    /// Issue the uncached keys of one phase and wait for all of them
    async fn run_phase(&mut self, phase: &str, keys: Vec<CacheKey>, log: &mut DecisionLog) {
        let pending: BTreeSet<CacheKey> = keys
            .into_iter()
            .filter(|k| !self.cache.contains(k))
            .collect();
        if pending.is_empty() {
            return;
        }

        tracing::debug!(phase, queries = pending.len(), "Running lookup phase");

        let lookup: &dyn StellarLookup = self.lookup.as_ref();
        let policy = &self.policy;
        let radius = self.coordinate_radius_deg;

        let batch_size = lookup.batch_size();
        let mut work = Vec::new();
        let mut names = Vec::new();
        for key in pending {
            match key {
                CacheKey::Name(name) if batch_size > 1 => names.push(name),
                other => work.push(Work::Single(other)),
            }
        }
        work.extend(names.chunks(batch_size).map(|chunk| Work::Batch(chunk.to_vec())));

        let answered: Vec<Vec<(CacheKey, LookupResult, u32)>> = stream::iter(work)
            .map(move |item| async move {
                match item {
                    Work::Single(key) => {
                        let label = key.to_string();
                        let key_ref = &key;
                        let (result, attempts) =
                            retry_lookup(&label, policy, move || dispatch(lookup, key_ref, radius)).await;
                        vec![(key, result, attempts)]
                    }
                    Work::Batch(names) => {
                        let label = format!("{} names from {}", names.len(), names[0]);
                        let names_ref = &names;
                        let (result, attempts) =
                            retry_with_backoff(&label, policy, move || lookup.resolve_batch(names_ref)).await;
                        spread_batch(names, result, attempts)
                    }
                }
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;
        let mut results: Vec<(CacheKey, LookupResult, u32)> = answered.into_iter().flatten().collect();

        // Completion order is arbitrary; cache and log in key order
        results.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, result, attempts) in results {
            let outcome = match result {
                Ok(Some(hit)) => CachedOutcome::Hit(hit),
                Ok(None) => CachedOutcome::NotFound,
                Err(err) => {
                    log.record(Decision::LookupFailed {
                        query: key.to_string(),
                        attempts,
                        reason: err.to_string(),
                    });
                    CachedOutcome::Failed {
                        attempts,
                        reason: err.to_string(),
                    }
                }
            };
            self.cache.insert(key, outcome);
        }
    }

    fn candidates(&self, record: &SourceRecord, plan: &RecordPlan) -> Vec<Candidate> {
        plan.steps
            .iter()
            .filter_map(|step| {
                let hit = self.cache.hit(&step.key)?;
                let separation_deg = match (record.coordinates, hit.coordinates) {
                    (Some(a), Some(b)) => Some(a.separation_deg(&b)),
                    _ => None,
                };
                Some(Candidate {
                    method: step.method,
                    query: step.query.clone(),
                    hit: hit.clone(),
                    separation_deg,
                    within: separation_deg
                        .map(|s| s <= self.angular_tolerance_deg)
                        .unwrap_or(true),
                })
            })
            .collect()
    }

    fn choose_candidate(&self, record: &SourceRecord, plan: &RecordPlan) -> Option<Candidate> {
        let candidates = self.candidates(record, plan);
        candidates
            .iter()
            .find(|c| c.within)
            .or_else(|| candidates.first())
            .cloned()
    }

    fn is_settled(&self, record: &SourceRecord, plan: &RecordPlan) -> bool {
        self.candidates(record, plan).iter().any(|c| c.within)
    }

    fn polish(&self, hit: &LookupHit) -> Polished {
        let mut main_id = hit.main_id.clone();
        let mut coordinates = hit.coordinates;
        let mut ids = hit.ids.clone();

        if let Some(star) = strip_planet_letter(&main_id) {
            match self.cache.hit(&CacheKey::Name(star.clone())) {
                Some(star_hit) => {
                    main_id = star_hit.main_id.clone();
                    coordinates = star_hit.coordinates.or(coordinates);
                    ids.extend(star_hit.ids.iter().cloned());
                }
                None => main_id = star,
            }
        }

        let binary_hint = match strip_binary_suffix(&main_id) {
            Some((stem, label)) => {
                main_id = stem;
                Some(label)
            }
            None => None,
        };

        Polished {
            main_id,
            coordinates,
            ids,
            binary_hint,
        }
    }

    /// Map every polished identifier to the representative of the identifiers
    /// it shares an external id with
    fn unify_shared_ids(
        &self,
        chosen: &[Option<Candidate>],
        polished: &[Option<Polished>],
        log: &mut DecisionLog,
    ) -> BTreeMap<String, String> {
        let mut sets = DisjointSet::default();
        let mut owner: BTreeMap<&str, &str> = BTreeMap::new();
        let mut trust: BTreeMap<&str, u8> = BTreeMap::new();
        let mut shared_by: BTreeMap<String, String> = BTreeMap::new();

        for (candidate, p) in chosen.iter().zip(polished) {
            let (Some(candidate), Some(p)) = (candidate, p) else {
                continue;
            };
            sets.add(&p.main_id);
            let rank = MainIdProvenance::Resolved(candidate.method)
                .sort_key(&self.precedence)
                .0;
            trust
                .entry(p.main_id.as_str())
                .and_modify(|r| *r = (*r).min(rank))
                .or_insert(rank);
            for id in &p.ids {
                match owner.get(id.as_str()) {
                    Some(first) if *first != p.main_id => {
                        if sets.union(first, &p.main_id) {
                            shared_by.insert(p.main_id.clone(), id.clone());
                        }
                    }
                    Some(_) => {}
                    None => {
                        owner.insert(id.as_str(), p.main_id.as_str());
                    }
                }
            }
        }

        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for id in sets.members() {
            groups.entry(sets.find(&id)).or_default().push(id);
        }

        let mut unified = BTreeMap::new();
        for members in groups.values() {
            let Some(representative) = members
                .iter()
                .min_by(|a, b| {
                    let ra = trust.get(a.as_str()).copied().unwrap_or(u8::MAX);
                    let rb = trust.get(b.as_str()).copied().unwrap_or(u8::MAX);
                    ra.cmp(&rb).then_with(|| a.cmp(b))
                })
                .cloned()
            else {
                continue;
            };
            for member in members {
                if *member != representative {
                    log.record(Decision::IdentifierUnified {
                        from: member.clone(),
                        to: representative.clone(),
                        shared_id: shared_by.get(member).cloned().unwrap_or_default(),
                    });
                }
                unified.insert(member.clone(), representative.clone());
            }
        }
        unified
    }

    fn assemble<'a>(
        &self,
        records: &[&'a SourceRecord],
        plans: &[RecordPlan],
        chosen: &[Option<Candidate>],
        polished: &[Option<Polished>],
        unified: &BTreeMap<String, String>,
        log: &mut DecisionLog,
    ) -> Vec<ResolvedRecord<'a>> {
        let mut forced_groups: BTreeMap<(String, String), Vec<RecordRef>> = BTreeMap::new();
        let mut resolved = Vec::with_capacity(records.len());

        for (i, record) in records.iter().copied().enumerate() {
            let mut rr = ResolvedRecord::unresolved(record);

            if let Some((query, target)) = &plans[i].forced {
                rr.main_id = target.clone();
                rr.provenance = MainIdProvenance::Resolved(ResolutionMethod::Forced);
                rr.resolution = Some(IdentifierResolution {
                    query: query.clone(),
                    main_id: target.clone(),
                    coordinates: None,
                    method: ResolutionMethod::Forced,
                    angular_separation_deg: None,
                    ids: BTreeSet::new(),
                });
                forced_groups
                    .entry((query.clone(), target.clone()))
                    .or_default()
                    .push(RecordRef::from(record));
            } else if let (Some(candidate), Some(p)) = (&chosen[i], &polished[i]) {
                let main_id = unified.get(&p.main_id).cloned().unwrap_or_else(|| p.main_id.clone());
                rr.main_id = main_id.clone();
                rr.provenance = MainIdProvenance::Resolved(candidate.method);

                if candidate.within {
                    rr.coordinates = p.coordinates.or(record.coordinates);
                } else {
                    rr.flags.raise(Flag::AngularSeparation);
                    log.flag(
                        Flag::AngularSeparation,
                        &main_id,
                        format!(
                            "{} resolved {:.6} deg from catalog position via '{}'; catalog coordinates kept",
                            candidate.method,
                            candidate.separation_deg.unwrap_or_default(),
                            candidate.query
                        ),
                        vec![RecordRef::from(record)],
                    );
                }

                if let Some(hint) = &p.binary_hint {
                    if record.binary.is_empty() {
                        rr.binary = hint.clone();
                    } else if record.binary != *hint {
                        tracing::debug!(
                            main_id = %main_id,
                            catalog_binary = %record.binary,
                            resolved_binary = %hint,
                            "Binary label disagrees with resolved component"
                        );
                        log.record(Decision::ComponentDisagreement {
                            main_id: main_id.clone(),
                            catalog_binary: record.binary.clone(),
                            resolved_binary: hint.clone(),
                            record: RecordRef::from(record),
                        });
                    }
                }

                rr.resolution = Some(IdentifierResolution {
                    query: candidate.query.clone(),
                    main_id,
                    coordinates: p.coordinates,
                    method: candidate.method,
                    angular_separation_deg: candidate.separation_deg,
                    ids: p.ids.clone(),
                });
            } else {
                rr.flags.raise(Flag::Unresolved);
                log.flag(
                    Flag::Unresolved,
                    &rr.main_id,
                    "no lookup resolved host, aliases or position; catalog host kept",
                    vec![RecordRef::from(record)],
                );
            }

            resolved.push(rr);
        }

        for ((query, main_id), records) in forced_groups {
            tracing::info!(query = %query, main_id = %main_id, records = records.len(), "Override applied");
            log.record(Decision::ForcedOverride {
                query,
                main_id,
                records,
            });
        }

        resolved
    }

    /// Final identifier and position a string resolved to, if it was looked up
    fn resolved_string(
        &self,
        query: &str,
        unified: &BTreeMap<String, String>,
    ) -> Option<(String, Option<Coordinates>)> {
        let hit = self.cache.hit(&CacheKey::Name(query.to_string()))?;
        let p = self.polish(hit);
        let id = unified.get(&p.main_id).cloned().unwrap_or(p.main_id);
        Some((id, p.coordinates))
    }

    fn detect_conflicts(
        &self,
        records: &[&SourceRecord],
        resolved: &mut [ResolvedRecord<'_>],
        unified: &BTreeMap<String, String>,
        log: &mut DecisionLog,
    ) -> MergeResult<()> {
        let linkage = NameLinkage::build(records);
        let mut unforced: Vec<MergeError> = Vec::new();

        for class in linkage.classes().values() {
            let strings = &class.strings;
            let members = &class.records;
            let refs: Vec<RecordRef> = members.iter().map(|i| RecordRef::from(records[*i])).collect();

            // Forced targets inside the class
            let targets: BTreeMap<&str, &str> = strings
                .iter()
                .filter_map(|s| self.overrides.get(s).map(|t| (s.as_str(), t)))
                .collect();
            let distinct_targets: BTreeSet<&str> = targets.values().copied().collect();
            if distinct_targets.len() > 1 {
                let mut it = targets.iter();
                if let (Some((query, first)), Some((_, second))) = (it.next(), it.next()) {
                    return Err(MergeError::ContradictoryOverride {
                        query: query.to_string(),
                        first: first.to_string(),
                        second: second.to_string(),
                    });
                }
            }
            let forced_target = distinct_targets.iter().next().map(|t| t.to_string());

            // First string and position per resolved identifier
            let mut by_id: BTreeMap<String, (String, Option<Coordinates>)> = BTreeMap::new();
            for s in strings {
                if let Some((id, coords)) = self.resolved_string(s, unified) {
                    by_id.entry(id).or_insert((s.clone(), coords));
                }
            }

            let ids: Vec<(&String, &(String, Option<Coordinates>))> = by_id.iter().collect();
            let mut class_conflicts = Vec::new();
            for (a, (id_a, (query_a, coords_a))) in ids.iter().enumerate() {
                for (id_b, (query_b, coords_b)) in ids.iter().skip(a + 1) {
                    match (coords_a, coords_b) {
                        (Some(ca), Some(cb)) if ca.within(cb, self.angular_tolerance_deg) => {
                            class_conflicts.push((
                                query_a.clone(),
                                (*id_a).clone(),
                                query_b.clone(),
                                (*id_b).clone(),
                                ca.separation_deg(cb),
                            ));
                        }
                        _ => {
                            log.record(Decision::AliasDisagreement {
                                query: query_a.clone(),
                                main_id: (*id_a).clone(),
                                alias: query_b.clone(),
                                alias_main_id: (*id_b).clone(),
                                records: refs.clone(),
                            });
                        }
                    }
                }
            }

            if class_conflicts.is_empty() {
                continue;
            }

            for (query_a, main_id_a, query_b, main_id_b, separation_deg) in class_conflicts {
                log.record(Decision::IdentityConflict {
                    query_a: query_a.clone(),
                    main_id_a: main_id_a.clone(),
                    query_b: query_b.clone(),
                    main_id_b: main_id_b.clone(),
                    separation_deg,
                    forced: forced_target.is_some(),
                    records: refs.clone(),
                });
                if forced_target.is_none() {
                    tracing::error!(
                        query_a = %query_a,
                        main_id_a = %main_id_a,
                        query_b = %query_b,
                        main_id_b = %main_id_b,
                        "Unforced identity conflict"
                    );
                    unforced.push(MergeError::IdentityConflict {
                        query_a,
                        main_id_a,
                        query_b,
                        main_id_b,
                        separation_deg,
                    });
                }
            }

            if let Some(target) = forced_target {
                tracing::warn!(main_id = %target, records = members.len(), "Identity conflict settled by override");
                for i in members {
                    resolved[*i].main_id = target.clone();
                    resolved[*i].provenance = MainIdProvenance::Resolved(ResolutionMethod::Forced);
                }
                log.record(Decision::ForcedOverride {
                    query: strings.iter().next().cloned().unwrap_or_default(),
                    main_id: target,
                    records: refs,
                });
            }
        }

        match unforced.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn flag_coordinate_mismatches(
        &self,
        records: &[&SourceRecord],
        resolved: &mut [ResolvedRecord<'_>],
        log: &mut DecisionLog,
    ) {
        let tol = self.angular_tolerance_deg;

        let mut by_id: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, rr) in resolved.iter().enumerate() {
            by_id.entry(rr.main_id.clone()).or_default().push(i);
        }

        // Reference position per identifier: most trusted member
        let mut positions: Vec<(String, Coordinates)> = Vec::new();
        for (id, members) in &by_id {
            let reference = members
                .iter()
                .filter(|i| resolved[**i].coordinates.is_some())
                .min_by_key(|i| (resolved[**i].provenance.sort_key(&self.precedence), **i));
            if let Some(coords) = reference.and_then(|i| resolved[*i].coordinates) {
                positions.push((id.clone(), coords));
            }

            // Unresolved members of one identifier must agree on position
            if members
                .iter()
                .all(|i| matches!(resolved[*i].provenance, MainIdProvenance::Unresolved(_)))
            {
                if let Some(reference) = reference.and_then(|i| resolved[*i].coordinates) {
                    let outliers: Vec<usize> = members
                        .iter()
                        .copied()
                        .filter(|i| {
                            records[*i]
                                .coordinates
                                .map(|c| !c.within(&reference, tol))
                                .unwrap_or(false)
                        })
                        .collect();
                    if !outliers.is_empty() {
                        for i in members {
                            resolved[*i].flags.raise(Flag::CoordinateMismatch);
                        }
                        log.flag(
                            Flag::CoordinateMismatch,
                            id,
                            "catalog positions for one unresolved host disagree",
                            members.iter().map(|i| RecordRef::from(records[*i])).collect(),
                        );
                    }
                }
            }
        }

        // Distinct identifiers at the same position
        let linkage = NameLinkage::build(records);
        positions.sort_by(|a, b| a.1.dec.total_cmp(&b.1.dec).then_with(|| a.0.cmp(&b.0)));
        for (a, (id_a, ca)) in positions.iter().enumerate() {
            for (id_b, cb) in positions.iter().skip(a + 1) {
                if cb.dec - ca.dec > tol {
                    break;
                }
                if !ca.within(cb, tol) {
                    continue;
                }
                let roots_a: BTreeSet<&str> =
                    by_id[id_a].iter().map(|i| linkage.root_of_record(*i)).collect();
                let linked = by_id[id_b]
                    .iter()
                    .any(|i| roots_a.contains(linkage.root_of_record(*i)));
                if linked {
                    continue;
                }

                let members: Vec<usize> = by_id[id_a].iter().chain(&by_id[id_b]).copied().collect();
                for i in &members {
                    resolved[*i].flags.raise(Flag::CoordinateMismatch);
                }
                tracing::warn!(main_id_a = %id_a, main_id_b = %id_b, "Distinct identifiers at the same position");
                log.flag(
                    Flag::CoordinateMismatch,
                    id_a,
                    format!(
                        "'{}' and '{}' lie {:.6} deg apart",
                        id_a,
                        id_b,
                        ca.separation_deg(cb)
                    ),
                    members.iter().map(|i| RecordRef::from(records[*i])).collect(),
                );
            }
        }
    }
}

/// One lookup call for a cache key
async fn dispatch(lookup: &dyn StellarLookup, key: &CacheKey, radius_deg: f64) -> LookupResult {
    match key {
        CacheKey::Name(name) => lookup.resolve(name).await,
        CacheKey::Tic(tic) => lookup.resolve_survey_id(*tic).await,
        CacheKey::Cone { .. } => match key.cone_centre() {
            Some(centre) => lookup.resolve_by_coordinates(centre, radius_deg).await,
            None => Ok(None),
        },
    }
}

/// One result per name; a failed batch fails every name in it
fn spread_batch(names: Vec<String>, result: BatchResult, attempts: u32) -> Vec<(CacheKey, LookupResult, u32)> {
    match result {
        Ok(mut answers) => names
            .into_iter()
            .map(|name| {
                let hit = answers.remove(&name).flatten();
                (CacheKey::Name(name), Ok(hit), attempts)
            })
            .collect(),
        Err(err) => names
            .into_iter()
            .map(|name| (CacheKey::Name(name), Err(err.clone()), attempts))
            .collect(),
    }
}

fn collect_aliases(resolved: &[ResolvedRecord<'_>]) -> BTreeMap<String, BTreeSet<String>> {
    let mut aliases: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for rr in resolved {
        let entry = aliases.entry(rr.main_id.clone()).or_default();
        entry.insert(rr.record.host.clone());
        entry.extend(rr.record.aliases.iter().cloned());
        if let Some(resolution) = &rr.resolution {
            entry.extend(resolution.ids.iter().cloned());
        }
    }
    for (main_id, names) in aliases.iter_mut() {
        names.retain(|n| !n.is_empty() && n != "A" && n != "B" && n != main_id);
    }
    aliases
}

/// Union-find over strings, interned to indices
///
/// Path halving keeps `root` near constant; the lexicographically smallest
/// string becomes a class root, so roots do not depend on union order.
#[derive(Debug, Default)]
struct DisjointSet {
    index: BTreeMap<String, usize>,
    names: Vec<String>,
    parent: Vec<usize>,
}

impl DisjointSet {
    fn add(&mut self, s: &str) -> usize {
        if let Some(i) = self.index.get(s) {
            return *i;
        }
        let i = self.names.len();
        self.index.insert(s.to_string(), i);
        self.names.push(s.to_string());
        self.parent.push(i);
        i
    }

    fn members(&self) -> Vec<String> {
        self.names.clone()
    }

    fn root(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    /// Root string of `s`; unknown strings are their own root
    fn find(&mut self, s: &str) -> String {
        match self.index.get(s).copied() {
            Some(i) => {
                let r = self.root(i);
                self.names[r].clone()
            }
            None => s.to_string(),
        }
    }

    /// Returns true when two different sets were joined
    fn union(&mut self, a: &str, b: &str) -> bool {
        let (ia, ib) = (self.add(a), self.add(b));
        let (ra, rb) = (self.root(ia), self.root(ib));
        if ra == rb {
            return false;
        }
        let (keep, drop) = if self.names[ra] < self.names[rb] { (ra, rb) } else { (rb, ra) };
        self.parent[drop] = keep;
        true
    }
}

/// Strings of one linked class and the records whose host is among them
#[derive(Debug, Default)]
struct LinkedClass {
    strings: BTreeSet<String>,
    records: Vec<usize>,
}

/// Strings taken to denote the same star
///
/// A record's host and aliases are linked, and strings with the same
/// `name_key` are linked across records. Classes are materialized once.
struct NameLinkage {
    classes: BTreeMap<String, LinkedClass>,
    record_roots: Vec<String>,
}

impl NameLinkage {
    fn build(records: &[&SourceRecord]) -> Self {
        let mut sets = DisjointSet::default();
        let mut by_key: BTreeMap<String, String> = BTreeMap::new();

        for record in records {
            sets.add(&record.host);
            for alias in &record.aliases {
                sets.union(&record.host, alias);
            }
            for s in std::iter::once(&record.host).chain(record.aliases.iter()) {
                let key = name_key(s);
                if key.is_empty() {
                    continue;
                }
                match by_key.get(&key) {
                    Some(first) => {
                        let first = first.clone();
                        sets.union(&first, s);
                    }
                    None => {
                        by_key.insert(key, s.clone());
                    }
                }
            }
        }

        let mut classes: BTreeMap<String, LinkedClass> = BTreeMap::new();
        for i in 0..sets.names.len() {
            let r = sets.root(i);
            classes
                .entry(sets.names[r].clone())
                .or_default()
                .strings
                .insert(sets.names[i].clone());
        }

        let mut record_roots = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            let root = sets.find(&record.host);
            classes.entry(root.clone()).or_default().records.push(idx);
            record_roots.push(root);
        }

        Self {
            classes,
            record_roots,
        }
    }

    /// Linked classes keyed by root
    fn classes(&self) -> &BTreeMap<String, LinkedClass> {
        &self.classes
    }

    fn root_of_record(&self, index: usize) -> &str {
        &self.record_roots[index]
    }
}
