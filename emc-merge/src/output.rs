//! Output tables
//!
//! Merged entries are written as CSV with a fixed column order, one row per
//! entry in `exo_mercat_name` order. The decision log goes to a separate
//! JSON-lines file.
//!
//! When the previous run's output is available, entries whose content did not
//! change keep their previous `row_update` date.

use chrono::NaiveDate;
use emc_common::time::{format_date, parse_date, today};
use emc_common::QuantityKind;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::error::MergeResult;
use crate::merge::decision_log::DecisionLog;
use crate::merge::types::{Flag, MergedEntry};

/// Quantities written to the output, in column order
const OUTPUT_QUANTITIES: [QuantityKind; 8] = [
    QuantityKind::Period,
    QuantityKind::SemiMajorAxis,
    QuantityKind::Eccentricity,
    QuantityKind::Inclination,
    QuantityKind::Radius,
    QuantityKind::Mass,
    QuantityKind::Msini,
    QuantityKind::BestMass,
];

const ROW_UPDATE_COLUMN: &str = "row_update";

/// Output column names
pub fn headers() -> Vec<String> {
    let mut headers: Vec<String> = [
        "exo_mercat_name",
        "main_id",
        "main_id_provenance",
        "main_id_ra",
        "main_id_dec",
        "main_id_aliases",
        "host",
        "binary",
        "letter",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    for kind in OUTPUT_QUANTITIES {
        let c = kind.column();
        headers.push(c.to_string());
        headers.push(format!("{}_min", c));
        headers.push(format!("{}_max", c));
        headers.push(format!("{}_url", c));
        headers.push(format!("{}_catalog", c));
        headers.push(format!("{}_catalog_list", c));
    }

    headers.extend(
        [
            "bestmass_provenance",
            "checked_status",
            "original_status_string",
            "status_disagreement",
            "catalog",
            "catalog_names",
            "discovery_year",
            "discovery_method",
            "angular_separation",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    headers.extend(Flag::ALL.iter().map(|f| f.column().to_string()));
    headers.extend(
        ["duplicate_names", "removed_values", ROW_UPDATE_COLUMN]
            .iter()
            .map(|s| s.to_string()),
    );
    headers
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn join<I, S>(items: I, sep: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(sep)
}

/// One output row, cells in `headers()` order
pub fn entry_row(entry: &MergedEntry<'_>) -> Vec<String> {
    let mut row = vec![
        entry.exo_mercat_name.clone(),
        entry.main_id.clone(),
        entry.main_id_provenance.label(),
        number(entry.main_id_coordinates.map(|c| c.ra)),
        number(entry.main_id_coordinates.map(|c| c.dec)),
        join(&entry.main_id_aliases, ","),
        entry.host.clone(),
        entry.binary.clone(),
        entry.letter.clone(),
    ];

    for kind in OUTPUT_QUANTITIES {
        match entry.quantity(kind) {
            Some(q) => {
                row.push(q.value.to_string());
                row.push(number(q.error_min));
                row.push(number(q.error_max));
                row.push(q.provenance.clone());
                row.push(q.catalog.to_string());
                row.push(join(q.catalog_list.iter().map(|c| c.as_str()), ","));
            }
            None => row.extend(std::iter::repeat(String::new()).take(6)),
        }
    }

    row.push(
        entry
            .bestmass_provenance
            .map(|k| k.as_str().to_string())
            .unwrap_or_default(),
    );
    row.push(entry.checked_status.as_str().to_string());
    row.push(entry.original_status.clone());
    row.push(u8::from(entry.status_disagreement).to_string());
    row.push(join(entry.catalogs.iter().map(|c| c.as_str()), ","));
    row.push(join(
        entry
            .catalog_names
            .iter()
            .map(|(catalog, name)| format!("{}: {}", catalog, name)),
        ", ",
    ));
    row.push(entry.discovery_year.map(|y| y.to_string()).unwrap_or_default());
    row.push(join(&entry.discovery_method, ","));
    row.push(number(entry.angular_separation_deg));
    for flag in Flag::ALL {
        row.push(u8::from(entry.flags.is_set(flag)).to_string());
    }
    row.push(join(&entry.duplicate_names, ","));
    row.push(join(&entry.removed_values, ","));
    row.push(entry.row_update.map(format_date).unwrap_or_default());
    row
}

/// Write merged entries as CSV
pub fn write_merged_catalog<W: Write>(writer: W, entries: &[MergedEntry<'_>]) -> MergeResult<()> {
    let rows: Vec<Vec<String>> = entries.iter().map(entry_row).collect();
    emc_common::table::write_table(writer, &headers(), &rows)?;
    Ok(())
}

pub fn write_merged_catalog_file(path: &Path, entries: &[MergedEntry<'_>]) -> MergeResult<()> {
    let file = File::create(path)?;
    write_merged_catalog(BufWriter::new(file), entries)?;
    tracing::info!(path = %path.display(), entries = entries.len(), "Merged catalog written");
    Ok(())
}

pub fn write_decision_log_file(path: &Path, log: &DecisionLog) -> MergeResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    log.write_jsonl(&mut writer)?;
    writer.flush()?;
    tracing::info!(
        path = %path.display(),
        run_id = %log.run_id(),
        decisions = log.entries().len(),
        "Decision log written"
    );
    Ok(())
}

/// Rows of a previous output, keyed by `exo_mercat_name`
#[derive(Debug, Default)]
pub struct PreviousCatalog {
    /// name -> (cells other than row_update, by column name; row_update)
    rows: BTreeMap<String, (BTreeMap<String, String>, Option<NaiveDate>)>,
}

impl PreviousCatalog {
    pub fn read<R: Read>(reader: R) -> MergeResult<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(emc_common::Error::from)?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut rows = BTreeMap::new();
        for record in csv_reader.records() {
            let record = record.map_err(emc_common::Error::from)?;
            let mut cells: BTreeMap<String, String> = headers
                .iter()
                .cloned()
                .zip(record.iter().map(|c| c.to_string()))
                .collect();
            let row_update = cells.remove(ROW_UPDATE_COLUMN).and_then(|d| parse_date(&d));
            if let Some(name) = cells.get("exo_mercat_name").cloned() {
                rows.insert(name, (cells, row_update));
            }
        }
        Ok(Self { rows })
    }

    pub fn read_file(path: &Path) -> MergeResult<Self> {
        let previous = Self::read(File::open(path)?)?;
        tracing::info!(path = %path.display(), rows = previous.len(), "Previous catalog loaded");
        Ok(previous)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Set `row_update` on every entry: the previous date when the entry's
/// content is unchanged, otherwise today. Returns how many were unchanged.
pub fn carry_row_updates(entries: &mut [MergedEntry<'_>], previous: &PreviousCatalog) -> usize {
    let headers = headers();
    let today = today();
    let mut unchanged = 0;

    for entry in entries.iter_mut() {
        let cells: BTreeMap<String, String> = headers
            .iter()
            .cloned()
            .zip(entry_row(entry))
            .filter(|(h, _)| h != ROW_UPDATE_COLUMN)
            .collect();

        entry.row_update = match previous.rows.get(&entry.exo_mercat_name) {
            Some((old_cells, old_date)) if *old_cells == cells => {
                unchanged += 1;
                old_date.or(Some(today))
            }
            _ => Some(today),
        };
    }

    tracing::info!(unchanged, changed = entries.len() - unchanged, "Row update dates assigned");
    unchanged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::tier2::attribute_consolidator::AttributeConsolidator;
    use crate::merge::types::{Cluster, Flags, ResolvedRecord};
    use emc_common::{Measurement, SourceCatalog, SourceRecord};
    use std::collections::BTreeSet;

    fn entry_for(records: &[SourceRecord]) -> MergedEntry<'_> {
        let rrs: Vec<ResolvedRecord<'_>> = records.iter().map(ResolvedRecord::unresolved).collect();
        let mut flags = Flags::default();
        flags.raise(Flag::DuplicateCatalog);
        let cluster = Cluster {
            main_id: "HD 1".to_string(),
            binary: String::new(),
            letter: "b".to_string(),
            members: (0..records.len()).collect(),
            flags,
            duplicate_names: BTreeSet::new(),
        };
        let mut entry = AttributeConsolidator::default().consolidate(&cluster, &rrs, &BTreeMap::new());
        entry.exo_mercat_name = "HD 1 b".to_string();
        entry
    }

    fn records() -> Vec<SourceRecord> {
        let mut r = SourceRecord::new(SourceCatalog::Nasa, "HD 1 b", "HD 1", "b");
        r.quantities.period = Measurement::new(3.5, Some(0.1), Some(0.2), "ref");
        r.last_update = NaiveDate::from_ymd_opt(2020, 1, 2);
        vec![r]
    }

    #[test]
    fn test_row_matches_headers() {
        let records = records();
        let entry = entry_for(&records);
        let row = entry_row(&entry);
        let headers = headers();
        assert_eq!(row.len(), headers.len());

        let cell = |name: &str| {
            let idx = headers.iter().position(|h| h == name).unwrap();
            row[idx].clone()
        };
        assert_eq!(cell("p"), "3.5");
        assert_eq!(cell("p_max"), "0.2");
        assert_eq!(cell("p_catalog"), "nasa");
        assert_eq!(cell("duplicate_catalog_flag"), "1");
        assert_eq!(cell("binary_mismatch_flag"), "0");
        assert_eq!(cell("row_update"), "2020-01-02");
    }

    #[test]
    fn test_unchanged_rows_keep_previous_date() {
        let records = records();
        let entry = entry_for(&records);

        let mut buffer = Vec::new();
        write_merged_catalog(&mut buffer, std::slice::from_ref(&entry)).unwrap();
        let previous = PreviousCatalog::read(buffer.as_slice()).unwrap();
        assert_eq!(previous.len(), 1);

        let mut entries = vec![entry];
        entries[0].row_update = None;
        assert_eq!(carry_row_updates(&mut entries, &previous), 1);
        assert_eq!(entries[0].row_update, NaiveDate::from_ymd_opt(2020, 1, 2));
    }

    #[test]
    fn test_changed_rows_get_today() {
        let records = records();
        let entry = entry_for(&records);

        let mut buffer = Vec::new();
        write_merged_catalog(&mut buffer, std::slice::from_ref(&entry)).unwrap();
        let previous = PreviousCatalog::read(buffer.as_slice()).unwrap();

        let mut entries = vec![entry];
        entries[0].host = "HD 1 (renamed)".to_string();
        assert_eq!(carry_row_updates(&mut entries, &previous), 0);
        assert_eq!(entries[0].row_update, Some(today()));
    }

    #[test]
    fn test_files_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_path = dir.path().join("exo-mercat.csv");
        let log_path = dir.path().join("exo-mercat.decisions.jsonl");

        let records = records();
        let entry = entry_for(&records);
        write_merged_catalog_file(&catalog_path, std::slice::from_ref(&entry)).unwrap();

        let mut log = DecisionLog::new();
        log.record(crate::merge::decision_log::Decision::GroupingNotConverged { iterations: 3 });
        write_decision_log_file(&log_path, &log).unwrap();

        let previous = PreviousCatalog::read_file(&catalog_path).unwrap();
        assert_eq!(previous.len(), 1);
        let text = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("grouping_not_converged"));
    }

    #[test]
    fn test_unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("out.csv");
        assert!(write_merged_catalog_file(&path, &[]).is_err());
        assert!(!path.exists());
    }
}
