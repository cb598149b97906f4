// Tier 1: Known-Mistake Corrections
//
// Concept: Apply the configured table of known catalog mistakes to raw rows
// before any name rule runs. Rows that are not planets are dropped;
// misspelled planet names and hosts, wrong host positions and wrong binary
// labels are rewritten.
//
// Order per row (each step sees the output of the previous one):
//   1. drop patterns (substring match on the named column)
//   2. name -> name
//   3. name -> host
//   4. host -> host
//   5. host -> ra, host -> dec
// `name -> binary` runs after standardization, on the standardized name.

use emc_common::config::ReplacementsConfig;
use emc_common::table::CatalogRow;
use emc_common::{SourceCatalog, SourceRecord};
use std::borrow::Cow;

use crate::merge::decision_log::{Decision, DecisionLog};

/// Configured known-mistake table (Tier 1 concept)
///
/// **Legible Software Principle:**
/// - Independent module: Reads raw rows, knows nothing of lookups or merging
/// - Explicit synchronization: Runs before `CatalogNormalizer::standardize`
/// - Transparent behavior: Every drop and rewrite is a decision log entry
/// - Integrity: Exact matches only, so an entry cannot touch unrelated rows
#[derive(Debug, Clone, Default)]
pub struct KnownMistakes {
    table: ReplacementsConfig,
}

impl KnownMistakes {
    pub fn from_config(table: &ReplacementsConfig) -> Self {
        Self {
            table: table.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Corrected row, or `None` when a drop pattern matched
    pub fn correct_row<'r>(
        &self,
        catalog: SourceCatalog,
        row: &'r CatalogRow,
        log: &mut DecisionLog,
    ) -> Option<Cow<'r, CatalogRow>> {
        if self.is_empty() {
            return Some(Cow::Borrowed(row));
        }

        for (column, patterns) in &self.table.drop {
            let Some(cell) = row.text(column) else {
                continue;
            };
            if let Some(pattern) = patterns.iter().map(|p| p.trim()).find(|p| cell.contains(*p)) {
                tracing::debug!(catalog = %catalog, line = row.line, column = %column, pattern, "Row dropped");
                log.record(Decision::RowDropped {
                    catalog,
                    line: row.line,
                    column: column.clone(),
                    pattern: pattern.to_string(),
                });
                return None;
            }
        }

        let mut row = row.clone();
        let steps = [
            ("name", "name", &self.table.name_to_name),
            ("name", "host", &self.table.name_to_host),
            ("host", "host", &self.table.host_to_host),
        ];
        for (key_column, field, table) in steps {
            if let Some(to) = table.get(&row.text_or_empty(key_column)) {
                rewrite(catalog, &mut row, field, to, log);
            }
        }

        let host = row.text_or_empty("host");
        if let Some(ra) = self.table.host_to_ra.get(&host) {
            rewrite(catalog, &mut row, "ra", &ra.to_string(), log);
        }
        if let Some(dec) = self.table.host_to_dec.get(&host) {
            rewrite(catalog, &mut row, "dec", &dec.to_string(), log);
        }

        Some(Cow::Owned(row))
    }

    /// Apply the binary table to a standardized record
    pub fn correct_binary(&self, record: &mut SourceRecord, line: usize, log: &mut DecisionLog) {
        let Some(to) = self.table.name_to_binary.get(&record.name) else {
            return;
        };
        if record.binary == *to {
            return;
        }
        log.record(Decision::KnownMistakeCorrected {
            catalog: record.catalog,
            line,
            field: "binary".to_string(),
            from: std::mem::replace(&mut record.binary, to.clone()),
            to: to.clone(),
        });
    }
}

fn rewrite(catalog: SourceCatalog, row: &mut CatalogRow, field: &str, to: &str, log: &mut DecisionLog) {
    let from = row.text_or_empty(field);
    if from == to {
        return;
    }
    tracing::debug!(catalog = %catalog, line = row.line, field, from = %from, to, "Known mistake corrected");
    log.record(Decision::KnownMistakeCorrected {
        catalog,
        line: row.line,
        field: field.to_string(),
        from,
        to: to.to_string(),
    });
    row.set(field, to);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> CatalogRow {
        CatalogRow::from_pairs(7, pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    fn table() -> KnownMistakes {
        let mut config = ReplacementsConfig::default();
        config
            .drop
            .insert("name".to_string(), vec!["Solar System".to_string()]);
        config
            .name_to_name
            .insert("Kepler-9 bb".to_string(), "Kepler-9 b".to_string());
        config
            .name_to_host
            .insert("Kepler-9 b".to_string(), "Kepler 9".to_string());
        config
            .host_to_host
            .insert("Kepler 9".to_string(), "Kepler-9".to_string());
        config.host_to_ra.insert("Kepler-9".to_string(), 285.5);
        config
            .name_to_binary
            .insert("Kepler-9 b".to_string(), String::new());
        KnownMistakes::from_config(&config)
    }

    #[test]
    fn test_empty_table_borrows_row() {
        let r = row(&[("name", "HD 1 b")]);
        let mut log = DecisionLog::new();
        let corrected = KnownMistakes::default().correct_row(SourceCatalog::Eu, &r, &mut log);
        assert!(matches!(corrected, Some(Cow::Borrowed(_))));
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_drop_pattern_removes_row() {
        let r = row(&[("name", "Solar System Jupiter"), ("host", "Sun")]);
        let mut log = DecisionLog::new();
        assert!(table().correct_row(SourceCatalog::Oec, &r, &mut log).is_none());
        assert_eq!(log.count("row_dropped"), 1);
    }

    #[test]
    fn test_rewrites_chain_in_order() {
        let r = row(&[("name", "Kepler-9 bb"), ("host", "Kepler-9x"), ("ra", "1.0"), ("dec", "2.0")]);
        let mut log = DecisionLog::new();
        let corrected = table()
            .correct_row(SourceCatalog::Eu, &r, &mut log)
            .unwrap()
            .into_owned();

        assert_eq!(corrected.text("name"), Some("Kepler-9 b"));
        assert_eq!(corrected.text("host"), Some("Kepler-9"));
        assert_eq!(corrected.number("ra").unwrap(), Some(285.5));
        assert_eq!(corrected.number("dec").unwrap(), Some(2.0));
        assert_eq!(corrected.line, 7);
        // name, host twice, ra
        assert_eq!(log.count("known_mistake_corrected"), 4);
    }

    #[test]
    fn test_unmatched_row_is_untouched() {
        let r = row(&[("name", "HD 2 b"), ("host", "HD 2")]);
        let mut log = DecisionLog::new();
        let corrected = table().correct_row(SourceCatalog::Eu, &r, &mut log).unwrap();
        assert_eq!(*corrected, r);
        assert!(log.entries().is_empty());
    }

    #[test]
    fn test_binary_table_clears_label() {
        let mut record = SourceRecord::new(SourceCatalog::Oec, "Kepler-9 b", "Kepler-9", "b");
        record.binary = "A".to_string();
        let mut log = DecisionLog::new();

        table().correct_binary(&mut record, 3, &mut log);
        assert_eq!(record.binary, "");
        assert_eq!(
            log.entries(),
            &[Decision::KnownMistakeCorrected {
                catalog: SourceCatalog::Oec,
                line: 3,
                field: "binary".to_string(),
                from: "A".to_string(),
                to: String::new(),
            }]
        );
    }
}
