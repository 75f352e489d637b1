//! Raw tabular input, decoupled from its container format.
//!
//! Marketplace reports arrive as CSV or as workbook sheets; both are
//! loaded into a [`RawTable`] (header row + string cells) before a
//! normalizer ever sees them.

use std::io::Read;
use std::path::Path;

use crate::core::PipelineError;

use super::workbook::Sheet;

/// An untyped table: one header row and zero or more data rows of
/// string cells.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Read a CSV file with a header row.
    pub fn from_csv_path(path: &Path) -> Result<Self, PipelineError> {
        let file = std::fs::File::open(path).map_err(|e| {
            PipelineError::StorageUnavailable(format!(
                "cannot open {}: {e}",
                path.display()
            ))
        })?;
        Self::from_csv_reader(file, &path.display().to_string())
    }

    /// Read CSV from any reader; `source` is used in error messages.
    pub fn from_csv_reader<R: Read>(reader: R, source: &str) -> Result<Self, PipelineError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers = csv_reader
            .headers()
            .map_err(|e| {
                PipelineError::SchemaMismatch(format!("unreadable header in {source}: {e}"))
            })?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(|e| {
                PipelineError::SchemaMismatch(format!("unreadable record in {source}: {e}"))
            })?;
            rows.push(record.iter().map(|c| c.trim().to_string()).collect());
        }

        Ok(Self { headers, rows })
    }

    /// Build a table from a workbook sheet, taking `header_row` (0-based)
    /// as the header and everything below as data.
    pub fn from_sheet(sheet: &Sheet, header_row: usize) -> Result<Self, PipelineError> {
        let headers = sheet
            .rows
            .get(header_row)
            .ok_or_else(|| {
                PipelineError::SchemaMismatch(format!(
                    "sheet '{}' has no header row {header_row}",
                    sheet.name
                ))
            })?
            .iter()
            .map(|c| c.value.as_text())
            .collect();

        let rows = sheet.rows[header_row + 1..]
            .iter()
            .map(|r| r.iter().map(|c| c.value.as_text()).collect())
            .collect();

        Ok(Self { headers, rows })
    }

    /// Column index by name, case-insensitive.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name.trim()))
    }

    /// Resolve all `names`, reporting every missing column at once.
    pub fn require_columns(&self, names: &[&str]) -> Result<Vec<usize>, PipelineError> {
        let mut indices = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.column(name) {
                Some(i) => indices.push(i),
                None => missing.push(*name),
            }
        }
        if missing.is_empty() {
            Ok(indices)
        } else {
            Err(PipelineError::SchemaMismatch(format!(
                "missing required columns: {}",
                missing.join(", ")
            )))
        }
    }

    /// Cell by data-row index and column index; empty string when short.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawTable {
        RawTable::from_csv_reader(
            "Date, SKU ,Qty\n2025-08-01,S1,2\n2025-08-02,S2,1\n".as_bytes(),
            "test",
        )
        .unwrap()
    }

    #[test]
    fn parses_and_trims() {
        let t = sample();
        assert_eq!(t.headers, vec!["Date", "SKU", "Qty"]);
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.cell(0, 1), "S1");
    }

    #[test]
    fn column_lookup_is_case_insensitive() {
        let t = sample();
        assert_eq!(t.column("sku"), Some(1));
        assert_eq!(t.column("QTY"), Some(2));
        assert_eq!(t.column("missing"), None);
    }

    #[test]
    fn reports_all_missing_columns() {
        let t = sample();
        let err = t.require_columns(&["Date", "Tax Rate", "State"]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Tax Rate"));
        assert!(msg.contains("State"));
    }

    #[test]
    fn short_rows_read_as_empty() {
        let t = RawTable::from_csv_reader("A,B\nx\n".as_bytes(), "test").unwrap();
        assert_eq!(t.cell(0, 0), "x");
        assert_eq!(t.cell(0, 1), "");
    }
}
