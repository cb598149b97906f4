//! Tabular input/output
//!
//! Catalog tables are CSV files with one header row. Every input table must
//! carry the columns in [`REQUIRED_COLUMNS`]; a missing one aborts the run
//! before any record is read. All other columns are optional and an empty
//! cell is a missing value.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;

use crate::time::parse_date;
use crate::{Error, Result};

/// Columns every catalog table must provide
pub const REQUIRED_COLUMNS: [&str; 6] = ["name", "host", "letter", "ra", "dec", "status"];

/// One row of a catalog table, keyed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogRow {
    /// 1-based data row number (header excluded), for diagnostics
    pub line: usize,
    cells: BTreeMap<String, String>,
}

impl CatalogRow {
    pub fn from_pairs<I, K, V>(line: usize, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            line,
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Trimmed cell text; `None` for absent columns and empty cells
    pub fn text(&self, column: &str) -> Option<&str> {
        self.cells
            .get(column)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// Replace a cell, adding the column when absent
    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        self.cells.insert(column.to_string(), value.into());
    }

    /// Cell text or empty string
    pub fn text_or_empty(&self, column: &str) -> String {
        self.text(column).unwrap_or_default().to_string()
    }

    /// Numeric cell; NaN and empty cells are missing
    pub fn number(&self, column: &str) -> Result<Option<f64>> {
        match self.text(column) {
            None => Ok(None),
            Some(raw) => {
                let value: f64 = raw.parse().map_err(|_| {
                    Error::InvalidInput(format!(
                        "row {}: column '{}' is not a number: '{}'",
                        self.line, column, raw
                    ))
                })?;
                Ok(if value.is_nan() { None } else { Some(value) })
            }
        }
    }

    /// Integer cell, accepting `2015.0` style floats
    pub fn year(&self, column: &str) -> Result<Option<i32>> {
        Ok(self.number(column)?.map(|v| v.round() as i32))
    }

    pub fn date(&self, column: &str) -> Result<Option<NaiveDate>> {
        match self.text(column) {
            None => Ok(None),
            Some(raw) => parse_date(raw).map(Some).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "row {}: column '{}' is not a date: '{}'",
                    self.line, column, raw
                ))
            }),
        }
    }
}

/// Read a catalog table from a file
pub fn read_catalog_table(path: &Path) -> Result<Vec<CatalogRow>> {
    let file = std::fs::File::open(path)?;
    read_catalog_rows(file, &path.display().to_string())
}

/// Read catalog rows from any reader; `table` names the source in errors
pub fn read_catalog_rows<R: Read>(reader: R, table: &str) -> Result<Vec<CatalogRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(false)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();

    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(Error::MissingColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
    }

    let mut rows = Vec::new();
    for (idx, record) in csv_reader.records().enumerate() {
        let record = record?;
        let cells = headers
            .iter()
            .cloned()
            .zip(record.iter().map(|c| c.to_string()));
        rows.push(CatalogRow::from_pairs(idx + 1, cells));
    }

    tracing::debug!(table, rows = rows.len(), "Read catalog table");
    Ok(rows)
}

/// Write a header plus rows as CSV
pub fn write_table<W: Write>(writer: W, headers: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(headers)?;
    for row in rows {
        if row.len() != headers.len() {
            return Err(Error::Internal(format!(
                "row has {} cells, header has {}",
                row.len(),
                headers.len()
            )));
        }
        csv_writer.write_record(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Read any CSV into header-keyed rows without required-column checks
pub fn read_plain_table<R: Read>(reader: R) -> Result<Vec<CatalogRow>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers: Vec<String> = csv_reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut rows = Vec::new();
    for (idx, record) in csv_reader.records().enumerate() {
        let record = record?;
        rows.push(CatalogRow::from_pairs(
            idx + 1,
            headers.iter().cloned().zip(record.iter().map(|c| c.to_string())),
        ));
    }
    Ok(rows)
}
