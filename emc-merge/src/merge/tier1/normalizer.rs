// Tier 1: Attribute Normalizer
//
// Concept: Turn one catalog table into `SourceRecord`s that satisfy the
// invariants the merge relies on: standardized names, a status from the
// shared vocabulary, non-negative error bounds, no physically impossible
// values and at most one best-mass designation.
//
// Synchronization: Each catalog supplies a `CatalogNormalizer` strategy;
// `normalize_catalog` is the shared driver calling the steps in a fixed
// order:
//   0. known-mistake corrections (shared, configured)
//   1. parse row (shared)
//   2. standardize, then the configured binary corrections
//   3. assign_status
//   4. handle_reference_format
//   5. remove_theoretical_masses
//   6. cleanup_errors -> make_errors_absolute -> remove_impossible_values (shared)
//   7. best-mass designation (shared)

use emc_common::record::{MassKind, RemovalReason};
use emc_common::table::CatalogRow;
use emc_common::{Coordinates, Measurement, QuantityKind, SourceCatalog, SourceRecord, Status};
use once_cell::sync::Lazy;
use regex::Regex;

use super::catalogs::normalizer_for;
use super::names::{split_aliases, split_planet_name, standardize_name};
use super::replacements::KnownMistakes;
use crate::error::{MergeError, MergeResult};
use crate::merge::decision_log::{Decision, DecisionLog, RecordRef};

static HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href=["']?([^"'\s>]+)"#).expect("valid regex"));

const ADS_PREFIX: &str = "https://ui.adsabs.harvard.edu/abs/";

/// Per-catalog normalization strategy
pub trait CatalogNormalizer: Send + Sync {
    fn catalog(&self) -> SourceCatalog;

    /// Standardize names, host, letter, binary and aliases
    fn standardize(&self, row: &CatalogRow, record: &mut SourceRecord) {
        standardize_common(row, record);
    }

    /// Map the catalog's raw status text onto the shared vocabulary
    fn assign_status(&self, raw_status: &str) -> Status;

    /// Turn a raw reference cell into the provenance string kept per value
    fn handle_reference_format(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            self.catalog().to_string()
        } else {
            trimmed.to_string()
        }
    }

    /// Take model-derived values out of the measured pool by flagging them
    /// theoretical; consolidation ranks them below every measured value
    fn remove_theoretical_masses(&self, _row: &CatalogRow, _record: &mut SourceRecord) {}
}

/// Shared standardization used by every catalog unless overridden
pub fn standardize_common(row: &CatalogRow, record: &mut SourceRecord) {
    record.name = standardize_name(&row.text_or_empty("name"));

    let (name_host, name_letter) = split_planet_name(&record.name);
    let host = standardize_name(&row.text_or_empty("host"));
    record.host = if host.is_empty() {
        name_host
    } else {
        split_planet_name(&host).0
    };

    let letter = row.text_or_empty("letter");
    record.letter = if letter.is_empty() { name_letter } else { letter };

    let binary = row.text_or_empty("binary");
    record.binary = match binary.as_str() {
        "S-type" | "S" => String::new(),
        _ => binary,
    };

    if let Some(aliases) = row.text("alias") {
        record.aliases = split_aliases(aliases)
            .filter(|a| *a != record.host)
            .collect();
    }
}

/// Extract the reference URL from an HTML anchor, shortening ADS links to
/// their bibcode
pub fn extract_href(raw: &str) -> Option<String> {
    let url = HREF.captures(raw)?.get(1)?.as_str();
    let url = url.strip_prefix(ADS_PREFIX).unwrap_or(url);
    let url = url.strip_suffix("/abstract").unwrap_or(url);
    Some(url.to_string())
}

/// Error bounds of 0 or infinity carry no information
pub fn cleanup_errors(m: &mut Measurement) {
    for bound in [&mut m.error_min, &mut m.error_max] {
        if matches!(bound, Some(e) if *e == 0.0 || !e.is_finite()) {
            *bound = None;
        }
    }
}

/// Catalogs write lower bounds as negative offsets
pub fn make_errors_absolute(m: &mut Measurement) {
    m.error_min = m.error_min.map(f64::abs);
    m.error_max = m.error_max.map(f64::abs);
}

/// Clear values no planet can have; returns the reason when one was removed
pub fn remove_impossible_value(kind: QuantityKind, m: &mut Measurement) -> Option<RemovalReason> {
    let value = m.value?;
    let reason = if !value.is_finite() {
        Some(RemovalReason::OutOfRange)
    } else if value < 0.0 {
        Some(RemovalReason::NegativeValue)
    } else {
        match kind {
            QuantityKind::Eccentricity if value > 1.0 => Some(RemovalReason::OutOfRange),
            QuantityKind::Inclination if value > 180.0 => Some(RemovalReason::OutOfRange),
            QuantityKind::Period | QuantityKind::SemiMajorAxis if value == 0.0 => {
                Some(RemovalReason::OutOfRange)
            }
            _ => None,
        }
    };
    if let Some(reason) = reason {
        m.remove(reason);
    }
    reason
}

/// Parse the best-mass designation cell
///
/// `Mass` / `Msini` select one; a cell naming both is a fatal conflict;
/// anything else (e.g. `M-R relationship`) designates nothing.
fn parse_best_mass(row: &CatalogRow, catalog: SourceCatalog, name: &str) -> MergeResult<Option<MassKind>> {
    let Some(raw) = row.text("bestmass_provenance") else {
        return Ok(None);
    };
    let lower = raw.to_ascii_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let mass = tokens.contains(&"mass");
    let msini = tokens.contains(&"msini");
    match (mass || tokens.contains(&"both"), msini || tokens.contains(&"both")) {
        (true, true) => Err(MergeError::BestMassConflict {
            catalog: catalog.to_string(),
            name: name.to_string(),
        }),
        (true, false) => Ok(Some(MassKind::Mass)),
        (false, true) => Ok(Some(MassKind::Msini)),
        (false, false) => Ok(None),
    }
}

/// Parse the fields every catalog shares
fn parse_row(catalog: SourceCatalog, row: &CatalogRow) -> MergeResult<SourceRecord> {
    let mut record = SourceRecord::new(catalog, "", "", "");

    record.coordinates = match (row.number("ra")?, row.number("dec")?) {
        (Some(ra), Some(dec)) => Some(Coordinates::new(ra, dec)),
        _ => None,
    };

    for kind in QuantityKind::MEASURED {
        let col = kind.column();
        let m = record.quantities.get_mut(kind);
        m.value = row.number(col)?;
        m.error_min = row.number(&format!("{}_min", col))?;
        m.error_max = row.number(&format!("{}_max", col))?;
        m.url = row.text_or_empty(&format!("{}_url", col));
    }

    record.raw_status = row.text_or_empty("status");
    record.discovery_method = row.text("discovery_method").map(str::to_string);
    record.discovery_year = row.year("discovery_year")?;
    record.last_update = row.date("last_update")?;

    Ok(record)
}

/// Normalize one catalog table with its strategy
pub fn normalize_catalog(
    normalizer: &dyn CatalogNormalizer,
    rows: &[CatalogRow],
    mistakes: &KnownMistakes,
    log: &mut DecisionLog,
) -> MergeResult<Vec<SourceRecord>> {
    let catalog = normalizer.catalog();
    let mut records = Vec::with_capacity(rows.len());
    let mut removed = 0usize;
    let mut dropped = 0usize;

    for row in rows {
        let Some(row) = mistakes.correct_row(catalog, row, log) else {
            dropped += 1;
            continue;
        };
        let row: &CatalogRow = &row;
        let mut record = parse_row(catalog, row)?;

        normalizer.standardize(row, &mut record);
        mistakes.correct_binary(&mut record, row.line, log);
        if record.host.is_empty() {
            tracing::warn!(catalog = %catalog, line = row.line, "Row without host or name skipped");
            continue;
        }

        record.status = normalizer.assign_status(&record.raw_status);

        for kind in QuantityKind::MEASURED {
            let m = record.quantities.get_mut(kind);
            m.url = normalizer.handle_reference_format(&m.url);
        }

        normalizer.remove_theoretical_masses(row, &mut record);

        for kind in QuantityKind::MEASURED {
            let m = record.quantities.get_mut(kind);
            cleanup_errors(m);
            make_errors_absolute(m);
            if let Some(reason) = remove_impossible_value(kind, m) {
                removed += 1;
                log.record(Decision::ValueRemoved {
                    record: RecordRef::from(&record),
                    quantity: kind,
                    reason: format!("{:?}", reason),
                });
            }
        }

        record.best_mass = parse_best_mass(row, catalog, &record.name)?;
        if let Some(kind) = record.best_mass {
            record.quantities.best_mass = record.quantities.get(kind.quantity()).clone();
        }

        records.push(record);
    }

    tracing::info!(
        catalog = %catalog,
        rows = rows.len(),
        records = records.len(),
        dropped_rows = dropped,
        removed_values = removed,
        "Catalog normalized"
    );
    Ok(records)
}

/// Normalize every supplied catalog in catalog order
pub fn normalize_all(
    tables: &[(SourceCatalog, Vec<CatalogRow>)],
    mistakes: &KnownMistakes,
    log: &mut DecisionLog,
) -> MergeResult<Vec<SourceRecord>> {
    let mut ordered: Vec<&(SourceCatalog, Vec<CatalogRow>)> = tables.iter().collect();
    ordered.sort_by_key(|(catalog, _)| *catalog);

    let mut all = Vec::new();
    for (catalog, rows) in ordered {
        let normalizer = normalizer_for(*catalog);
        all.extend(normalize_catalog(normalizer.as_ref(), rows, mistakes, log)?);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::tier1::catalogs::nasa::NasaNormalizer;

    fn row(pairs: &[(&str, &str)]) -> CatalogRow {
        CatalogRow::from_pairs(1, pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn test_cleanup_and_absolute_errors() {
        let mut m = Measurement::new(5.0, Some(-0.2), Some(0.0), "x");
        cleanup_errors(&mut m);
        make_errors_absolute(&mut m);
        assert_eq!(m.error_min, Some(0.2));
        assert_eq!(m.error_max, None);

        let mut inf = Measurement::new(5.0, Some(f64::INFINITY), Some(-0.1), "x");
        cleanup_errors(&mut inf);
        make_errors_absolute(&mut inf);
        assert_eq!(inf.error_min, None);
        assert_eq!(inf.error_max, Some(0.1));
    }

    #[test]
    fn test_impossible_values_removed() {
        let mut period = Measurement::new(-3.0, Some(0.1), Some(0.1), "x");
        assert_eq!(
            remove_impossible_value(QuantityKind::Period, &mut period),
            Some(RemovalReason::NegativeValue)
        );
        assert!(!period.is_present());

        let mut ecc = Measurement::new(1.3, None, None, "x");
        assert_eq!(
            remove_impossible_value(QuantityKind::Eccentricity, &mut ecc),
            Some(RemovalReason::OutOfRange)
        );

        let mut ok = Measurement::new(0.0, None, None, "x");
        assert_eq!(remove_impossible_value(QuantityKind::Eccentricity, &mut ok), None);
        assert!(ok.is_present());
    }

    #[test]
    fn test_extract_href() {
        let raw = "<a refstr=X href=https://ui.adsabs.harvard.edu/abs/2019AJ....157..245C/abstract target=ref>X</a>";
        assert_eq!(extract_href(raw), Some("2019AJ....157..245C".to_string()));
        assert_eq!(extract_href("no anchor"), None);
    }

    #[test]
    fn test_driver_removes_only_the_bad_value() {
        let rows = vec![row(&[
            ("name", "HD 1 b"),
            ("host", "HD 1"),
            ("letter", "b"),
            ("ra", "10.0"),
            ("dec", "20.0"),
            ("status", "CONFIRMED"),
            ("p", "-4.0"),
            ("e", "0.2"),
            ("e_min", "-0.01"),
            ("e_max", "0.02"),
        ])];
        let mut log = DecisionLog::new();
        let records = normalize_catalog(&NasaNormalizer, &rows, &KnownMistakes::default(), &mut log).unwrap();

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert!(!r.quantities.period.is_present());
        assert_eq!(r.quantities.period.removal, Some(RemovalReason::NegativeValue));
        assert_eq!(r.quantities.eccentricity.value, Some(0.2));
        assert_eq!(r.quantities.eccentricity.error_min, Some(0.01));
        assert_eq!(log.count("value_removed"), 1);
    }

    #[test]
    fn test_best_mass_designation() {
        let rows = vec![row(&[
            ("name", "HD 2 b"),
            ("host", "HD 2"),
            ("letter", "b"),
            ("ra", "1"),
            ("dec", "2"),
            ("status", "CONFIRMED"),
            ("msini", "0.5"),
            ("bestmass_provenance", "Msini"),
        ])];
        let mut log = DecisionLog::new();
        let records = normalize_catalog(&NasaNormalizer, &rows, &KnownMistakes::default(), &mut log).unwrap();
        assert_eq!(records[0].best_mass, Some(MassKind::Msini));
        assert_eq!(records[0].quantities.best_mass.value, Some(0.5));
    }

    #[test]
    fn test_double_best_mass_is_fatal() {
        let rows = vec![row(&[
            ("name", "HD 3 b"),
            ("host", "HD 3"),
            ("letter", "b"),
            ("ra", "1"),
            ("dec", "2"),
            ("status", "CONFIRMED"),
            ("bestmass_provenance", "Mass,Msini"),
        ])];
        let mut log = DecisionLog::new();
        let err = normalize_catalog(&NasaNormalizer, &rows, &KnownMistakes::default(), &mut log).unwrap_err();
        assert!(matches!(err, MergeError::BestMassConflict { .. }));
    }

    #[test]
    fn test_standardize_derives_host_and_letter_from_name() {
        let r = row(&[("name", "Gliese 876 c"), ("host", ""), ("letter", "")]);
        let mut record = SourceRecord::new(SourceCatalog::Eu, "", "", "");
        standardize_common(&r, &mut record);
        assert_eq!(record.name, "GJ 876 c");
        assert_eq!(record.host, "GJ 876");
        assert_eq!(record.letter, "c");
    }

    #[test]
    fn test_standardize_drops_s_type_and_host_alias() {
        let r = row(&[
            ("name", "HD 4 b"),
            ("host", "HD 4"),
            ("letter", "b"),
            ("binary", "S-type"),
            ("alias", "HD 4, HIP 12, A"),
        ]);
        let mut record = SourceRecord::new(SourceCatalog::Oec, "", "", "");
        standardize_common(&r, &mut record);
        assert_eq!(record.binary, "");
        assert_eq!(record.aliases.iter().cloned().collect::<Vec<_>>(), vec!["HIP 12".to_string()]);
    }

    #[test]
    fn test_known_mistakes_applied_before_standardizing() {
        let mut table = emc_common::config::ReplacementsConfig::default();
        table
            .drop
            .insert("name".to_string(), vec!["Solar System".to_string()]);
        table
            .name_to_host
            .insert("Gliese 9 b".to_string(), "Gliese 9 A".to_string());
        table
            .name_to_binary
            .insert("GJ 9 b".to_string(), "A".to_string());
        let mistakes = KnownMistakes::from_config(&table);

        let rows = vec![
            row(&[
                ("name", "Solar System b"),
                ("host", "Sun"),
                ("letter", "b"),
                ("ra", "0"),
                ("dec", "0"),
                ("status", "CONFIRMED"),
            ]),
            row(&[
                ("name", "Gliese 9 b"),
                ("host", "Gliese 9"),
                ("letter", "b"),
                ("ra", "5"),
                ("dec", "6"),
                ("status", "CONFIRMED"),
            ]),
        ];
        let mut log = DecisionLog::new();
        let records = normalize_catalog(&NasaNormalizer, &rows, &mistakes, &mut log).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "GJ 9 b");
        assert_eq!(records[0].host, "GJ 9 A");
        assert_eq!(records[0].binary, "A");
        assert_eq!(log.count("row_dropped"), 1);
        assert_eq!(log.count("known_mistake_corrected"), 2);
    }
}
