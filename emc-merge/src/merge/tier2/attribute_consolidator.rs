// Tier 2: Attribute Consolidation
//
// Concept: Turn one cluster of records into one merged entry by selecting,
// per measured quantity, a single value with its errors and provenance
// Synchronization: Called once per cluster after grouping converged
//
// Selection order (total, each criterion breaks the previous one's ties):
// 1. Measured before theoretical
// 2. Error bounds present, then smaller relative error
// 3. Endorsed by more distinct catalogs (values within closeness tolerance)
// 4. Later discovery year, then later catalog update
// 5. Catalog precedence
// 6. Provenance string
// 7. Value and errors, then record sort key

use emc_common::config::MergeConfig;
use emc_common::record::{MassKind, RemovalReason};
use emc_common::{Measurement, QuantityKind, SourceCatalog, SourceRecord, Status};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{MergeError, MergeResult};
use crate::merge::types::{
    Cluster, ConsolidatedQuantity, MainIdProvenance, MergedEntry, ResolvedRecord,
};

/// Catalog trust order, most trusted first
///
/// Must name every catalog exactly once so that it is a total order.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPrecedence {
    order: Vec<SourceCatalog>,
}

impl Default for CatalogPrecedence {
    fn default() -> Self {
        Self {
            order: SourceCatalog::ALL.to_vec(),
        }
    }
}

impl CatalogPrecedence {
    pub fn from_config(order: &[SourceCatalog]) -> MergeResult<Self> {
        for catalog in SourceCatalog::ALL {
            let count = order.iter().filter(|c| **c == catalog).count();
            if count == 0 {
                return Err(MergeError::PrecedenceTie(format!(
                    "catalog '{}' missing from [catalogs] precedence; no rule orders it",
                    catalog
                )));
            }
            if count > 1 {
                return Err(MergeError::PrecedenceTie(format!(
                    "catalog '{}' listed {} times in [catalogs] precedence",
                    catalog, count
                )));
            }
        }
        Ok(Self {
            order: order.to_vec(),
        })
    }

    pub fn rank(&self, catalog: SourceCatalog) -> usize {
        self.order
            .iter()
            .position(|c| *c == catalog)
            .unwrap_or(self.order.len())
    }

    pub fn as_slice(&self) -> &[SourceCatalog] {
        &self.order
    }
}

/// A record's measurement of one quantity, with what ranking needs
struct Contender<'r> {
    record: &'r SourceRecord,
    measurement: &'r Measurement,
    value: f64,
    endorsements: usize,
}

/// Attribute consolidator (Tier 2 concept)
///
/// **Legible Software Principle:**
/// - Independent module: Pure selection logic over borrowed records
/// - Explicit synchronization: One call per converged cluster
/// - Transparent behavior: Every criterion is a named step in `rank`
/// - Integrity: Total order, so the result never depends on record order
pub struct AttributeConsolidator {
    /// Two values within this relative distance endorse each other
    value_closeness_relative: f64,
    precedence: CatalogPrecedence,
}

impl Default for AttributeConsolidator {
    fn default() -> Self {
        Self {
            value_closeness_relative: 0.01, // 1%
            precedence: CatalogPrecedence::default(),
        }
    }
}

impl AttributeConsolidator {
    pub fn from_config(config: &MergeConfig) -> MergeResult<Self> {
        Ok(Self {
            value_closeness_relative: config.tolerances.value_closeness_relative,
            precedence: CatalogPrecedence::from_config(&config.catalogs.precedence)?,
        })
    }

    pub fn precedence(&self) -> &CatalogPrecedence {
        &self.precedence
    }

    /// Build the merged entry of one cluster
    ///
    /// Name, status and member flags are filled in by later stages.
    pub fn consolidate<'a>(
        &self,
        cluster: &Cluster,
        records: &[ResolvedRecord<'a>],
        aliases: &BTreeMap<String, BTreeSet<String>>,
    ) -> MergedEntry<'a> {
        let members: Vec<&ResolvedRecord<'a>> = cluster.members.iter().map(|i| &records[*i]).collect();
        let sources: Vec<&'a SourceRecord> = members.iter().map(|rr| rr.record).collect();

        let mut quantities = BTreeMap::new();
        for kind in QuantityKind::MEASURED {
            if let Some(selected) = self.select(kind, &sources) {
                quantities.insert(kind, selected);
            }
        }

        let bestmass_provenance = best_mass_kind(&sources, &quantities);
        if let Some(kind) = bestmass_provenance {
            if let Some(selected) = quantities.get(&kind.quantity()).cloned() {
                quantities.insert(QuantityKind::BestMass, selected);
            }
        }

        // Coordinates and provenance from the most trusted member
        let trusted = members
            .iter()
            .enumerate()
            .min_by_key(|(idx, rr)| (rr.provenance.sort_key(self.precedence.as_slice()), *idx))
            .map(|(_, rr)| *rr);

        let mut catalog_names: BTreeMap<SourceCatalog, String> = BTreeMap::new();
        for record in &sources {
            catalog_names
                .entry(record.catalog)
                .or_insert_with(|| record.name.clone());
        }

        let removed_values: BTreeSet<String> = sources
            .iter()
            .flat_map(|record| {
                QuantityKind::MEASURED.into_iter().filter_map(move |kind| {
                    record.quantities.get(kind).removal.map(|reason| {
                        format!("{}:{}:{}", record.catalog, kind.column(), removal_label(reason))
                    })
                })
            })
            .collect();

        MergedEntry {
            exo_mercat_name: String::new(),
            main_id: cluster.main_id.clone(),
            main_id_provenance: trusted
                .map(|rr| rr.provenance)
                .unwrap_or(MainIdProvenance::Unresolved(SourceCatalog::Nasa)),
            main_id_coordinates: trusted.and_then(|rr| rr.coordinates),
            main_id_aliases: aliases.get(&cluster.main_id).cloned().unwrap_or_default(),
            host: most_common_host(&sources),
            letter: cluster.letter.clone(),
            binary: cluster.binary.clone(),
            quantities,
            bestmass_provenance,
            checked_status: Status::Unconfirmed,
            original_status: String::new(),
            status_disagreement: false,
            catalogs: sources.iter().map(|r| r.catalog).collect(),
            catalog_names,
            discovery_year: sources.iter().filter_map(|r| r.discovery_year).min(),
            discovery_method: sources
                .iter()
                .filter_map(|r| r.discovery_method.clone())
                .filter(|m| !m.is_empty())
                .collect(),
            angular_separation_deg: members
                .iter()
                .filter_map(|rr| rr.resolution.as_ref().and_then(|r| r.angular_separation_deg))
                .max_by(f64::total_cmp),
            duplicate_names: cluster.duplicate_names.clone(),
            removed_values,
            flags: cluster.flags,
            row_update: sources.iter().filter_map(|r| r.last_update).max(),
            members: sources,
        }
    }

    /// Best value for one quantity across the cluster
    fn select(&self, kind: QuantityKind, sources: &[&SourceRecord]) -> Option<ConsolidatedQuantity> {
        let present: Vec<(&SourceRecord, &Measurement, f64)> = sources
            .iter()
            .filter_map(|r| {
                let m = r.quantities.get(kind);
                m.value.filter(|v| v.is_finite()).map(|v| (*r, m, v))
            })
            .collect();

        let contenders: Vec<Contender<'_>> = present
            .iter()
            .map(|(record, measurement, value)| {
                let endorsements = present
                    .iter()
                    .filter(|(_, _, other)| self.close(*value, *other))
                    .map(|(r, _, _)| r.catalog)
                    .collect::<BTreeSet<_>>()
                    .len();
                Contender {
                    record: *record,
                    measurement: *measurement,
                    value: *value,
                    endorsements,
                }
            })
            .collect();

        let best = contenders.iter().min_by(|a, b| self.rank(a, b))?;

        Some(ConsolidatedQuantity {
            value: best.value,
            error_min: best.measurement.error_min,
            error_max: best.measurement.error_max,
            provenance: best.measurement.url.clone(),
            catalog: best.record.catalog,
            catalog_list: contenders.iter().map(|c| c.record.catalog).collect(),
            theoretical: best.measurement.theoretical,
        })
    }

    fn close(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.value_closeness_relative * a.abs().max(b.abs())
    }

    /// `Less` means `a` is the better value
    fn rank(&self, a: &Contender<'_>, b: &Contender<'_>) -> Ordering {
        // 1. Measured first
        a.measurement
            .theoretical
            .cmp(&b.measurement.theoretical)
            // 2. Errors present, then smaller relative error
            .then_with(|| b.measurement.has_errors().cmp(&a.measurement.has_errors()))
            .then_with(|| {
                let ra = a.measurement.relative_error().unwrap_or(f64::INFINITY);
                let rb = b.measurement.relative_error().unwrap_or(f64::INFINITY);
                ra.total_cmp(&rb)
            })
            // 3. More endorsing catalogs
            .then_with(|| b.endorsements.cmp(&a.endorsements))
            // 4. Most recent
            .then_with(|| b.record.discovery_year.cmp(&a.record.discovery_year))
            .then_with(|| b.record.last_update.cmp(&a.record.last_update))
            // 5-7. Catalog precedence, provenance, record
            .then_with(|| {
                self.precedence
                    .rank(a.record.catalog)
                    .cmp(&self.precedence.rank(b.record.catalog))
            })
            .then_with(|| a.measurement.url.cmp(&b.measurement.url))
            .then_with(|| a.measurement.canonical_cmp(b.measurement))
            .then_with(|| a.record.canonical_cmp(b.record))
    }
}

/// Which of mass/msini becomes the best mass
///
/// Designations that all agree decide; otherwise mass is preferred when the
/// cluster has one.
fn best_mass_kind(
    sources: &[&SourceRecord],
    quantities: &BTreeMap<QuantityKind, ConsolidatedQuantity>,
) -> Option<MassKind> {
    let designated: BTreeSet<MassKind> = sources.iter().filter_map(|r| r.best_mass).collect();
    let available = |kind: MassKind| quantities.contains_key(&kind.quantity());

    if designated.len() == 1 {
        if let Some(kind) = designated.iter().next().copied() {
            if available(kind) {
                return Some(kind);
            }
        }
    }
    [MassKind::Mass, MassKind::Msini]
        .into_iter()
        .find(|kind| available(*kind))
}

/// Mode of member host strings; ties go to the lexicographically first
fn most_common_host(sources: &[&SourceRecord]) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in sources {
        *counts.entry(record.host.as_str()).or_default() += 1;
    }
    let top = counts.values().copied().max().unwrap_or(0);
    counts
        .into_iter()
        .find(|(_, n)| *n == top)
        .map(|(host, _)| host.to_string())
        .unwrap_or_default()
}

fn removal_label(reason: RemovalReason) -> &'static str {
    match reason {
        RemovalReason::NegativeValue => "negative_value",
        RemovalReason::OutOfRange => "out_of_range",
    }
}
