//! In-memory workbook model.
//!
//! The core never talks to a spreadsheet library directly: templates and
//! voucher workbooks are value objects, and reading/writing actual files
//! is behind [`WorkbookStore`]. Cell styles carry just what the X2Beta
//! layout needs (number format, alignment, bold).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::PipelineError;
use crate::core::money::fmt_amount;

/// A typed cell value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(Decimal),
    Integer(i64),
    Date(NaiveDate),
}

impl CellValue {
    /// Text rendering used when a sheet is read back as a raw table.
    pub fn as_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Number(d) => d.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty) || matches!(self, Self::Text(s) if s.is_empty())
    }
}

/// Horizontal cell alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Align {
    #[default]
    Left,
    Right,
    Center,
}

/// The formatting subset the voucher layout uses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CellStyle {
    /// Spreadsheet number format, e.g. `#,##0.00` or `DD-MM-YYYY`.
    pub number_format: Option<String>,
    pub align: Align,
    pub bold: bool,
}

impl CellStyle {
    /// Right-aligned `#,##0.00` amount.
    pub fn amount() -> Self {
        Self {
            number_format: Some("#,##0.00".into()),
            align: Align::Right,
            bold: false,
        }
    }

    /// Right-aligned integer quantity.
    pub fn quantity() -> Self {
        Self {
            number_format: Some("#,##0".into()),
            align: Align::Right,
            bold: false,
        }
    }

    /// `DD-MM-YYYY` date cell.
    pub fn date() -> Self {
        Self {
            number_format: Some("DD-MM-YYYY".into()),
            align: Align::Right,
            bold: false,
        }
    }
}

/// One cell: value plus style.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    pub value: CellValue,
    pub style: CellStyle,
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: CellValue::Text(value.into()),
            style: CellStyle::default(),
        }
    }

    pub fn amount(value: Decimal) -> Self {
        Self {
            value: CellValue::Number(value),
            style: CellStyle::amount(),
        }
    }

    pub fn quantity(value: i64) -> Self {
        Self {
            value: CellValue::Integer(value),
            style: CellStyle::quantity(),
        }
    }

    pub fn date(value: NaiveDate) -> Self {
        Self {
            value: CellValue::Date(value),
            style: CellStyle::date(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// One sheet: a name and a dense row/column grid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    /// Set a cell, growing the grid as needed (0-based coordinates).
    pub fn set(&mut self, row: usize, col: usize, cell: Cell) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let r = &mut self.rows[row];
        if r.len() <= col {
            r.resize_with(col + 1, Cell::default);
        }
        r[col] = cell;
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Append a full row at the bottom.
    pub fn push_row(&mut self, cells: Vec<Cell>) {
        self.rows.push(cells);
    }

    /// Number of rows with at least one non-empty cell at or below `from`.
    pub fn data_row_count(&self, from: usize) -> usize {
        self.rows[from.min(self.rows.len())..]
            .iter()
            .filter(|r| r.iter().any(|c| !c.value.is_empty()))
            .count()
    }
}

/// A workbook: an ordered list of sheets.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn with_sheet(sheet: Sheet) -> Self {
        Self {
            sheets: vec![sheet],
        }
    }

    pub fn first_sheet(&self) -> Option<&Sheet> {
        self.sheets.first()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Rough serialized size, recorded in tally export records.
    pub fn approximate_size(&self) -> u64 {
        self.sheets
            .iter()
            .flat_map(|s| s.rows.iter())
            .flat_map(|r| r.iter())
            .map(|c| c.value.as_text().len() as u64 + 8)
            .sum()
    }
}

/// Spreadsheet file access, implemented by the external spreadsheet
/// library adapter.
pub trait WorkbookStore: Send + Sync {
    fn load(&self, path: &Path) -> Result<Workbook, PipelineError>;
    fn save(&self, workbook: &Workbook, path: &Path) -> Result<(), PipelineError>;
    fn exists(&self, path: &Path) -> bool;
}

/// In-memory workbook store for tests and local runs.
#[derive(Default)]
pub struct MemoryWorkbookStore {
    books: Mutex<BTreeMap<PathBuf, Workbook>>,
}

impl MemoryWorkbookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a workbook (e.g. a template) at a path.
    pub fn insert(&self, path: impl Into<PathBuf>, workbook: Workbook) {
        if let Ok(mut books) = self.books.lock() {
            books.insert(path.into(), workbook);
        }
    }
}

impl WorkbookStore for MemoryWorkbookStore {
    fn load(&self, path: &Path) -> Result<Workbook, PipelineError> {
        self.books
            .lock()
            .map_err(|_| PipelineError::StorageUnavailable("workbook store poisoned".into()))?
            .get(path)
            .cloned()
            .ok_or_else(|| {
                PipelineError::StorageUnavailable(format!(
                    "no workbook at {}",
                    path.display()
                ))
            })
    }

    fn save(&self, workbook: &Workbook, path: &Path) -> Result<(), PipelineError> {
        self.books
            .lock()
            .map_err(|_| PipelineError::StorageUnavailable("workbook store poisoned".into()))?
            .insert(path.to_path_buf(), workbook.clone());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.books
            .lock()
            .map(|b| b.contains_key(path))
            .unwrap_or(false)
    }
}

/// Render a sheet as CSV text. Used by tests to inspect voucher output
/// without a spreadsheet library.
pub fn sheet_to_csv(sheet: &Sheet) -> String {
    let mut out = String::new();
    for row in &sheet.rows {
        let mut first = true;
        for cell in row {
            if !first {
                out.push(',');
            }
            first = false;
            let text = match &cell.value {
                CellValue::Number(d) => fmt_amount(*d),
                other => other.as_text(),
            };
            if text.contains(',') || text.contains('"') {
                out.push('"');
                out.push_str(&text.replace('"', "\"\""));
                out.push('"');
            } else {
                out.push_str(&text);
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn set_grows_grid() {
        let mut sheet = Sheet::new("S");
        sheet.set(2, 3, Cell::text("x"));
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.get(2, 3).unwrap().value.as_text(), "x");
        assert!(sheet.get(2, 2).unwrap().value.is_empty());
        assert!(sheet.get(0, 0).is_none());
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryWorkbookStore::new();
        let wb = Workbook::with_sheet(Sheet::new("Sales Vouchers"));
        store.save(&wb, Path::new("a.xlsx")).unwrap();
        assert!(store.exists(Path::new("a.xlsx")));
        assert_eq!(store.load(Path::new("a.xlsx")).unwrap(), wb);
        assert!(store.load(Path::new("b.xlsx")).is_err());
    }

    #[test]
    fn csv_rendering_quotes_and_formats() {
        let mut sheet = Sheet::new("S");
        sheet.push_row(vec![
            Cell::text("a,b"),
            Cell::amount(dec!(1234.5)),
            Cell::quantity(7),
        ]);
        assert_eq!(sheet_to_csv(&sheet), "\"a,b\",1234.50,7\n");
    }

    #[test]
    fn data_row_count_skips_blanks() {
        let mut sheet = Sheet::new("S");
        sheet.push_row(vec![Cell::text("header")]);
        sheet.push_row(vec![Cell::empty()]);
        sheet.push_row(vec![Cell::text("data")]);
        assert_eq!(sheet.data_row_count(1), 1);
    }
}
