//! X2Beta template registry.
//!
//! Templates are per-GSTIN workbooks with a fixed header row; the
//! registry loads one, validates the header contract and exposes a
//! column map. Extra columns are preserved, missing ones are fatal.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::core::{Gstin, PipelineError};
use crate::io::{Workbook, WorkbookStore};

/// Header contract of the sales voucher sheet (header on row 4).
pub const SALES_HEADERS: &[&str] = &[
    "Date",
    "Voucher No.",
    "Voucher Type",
    "Party Ledger",
    "Party Name",
    "Item Name",
    "Quantity",
    "Rate",
    "Taxable Amount",
    "Output CGST Ledger",
    "CGST Amount",
    "Output SGST Ledger",
    "SGST Amount",
    "Output IGST Ledger",
    "IGST Amount",
    "Total Amount",
    "Narration",
];

/// Header contract of the expense voucher sheet (header on row 6).
pub const EXPENSE_HEADERS: &[&str] = &[
    "Date",
    "Voucher No.",
    "Voucher Type",
    "Party Ledger",
    "Item Name",
    "Quantity",
    "Rate",
    "Taxable Amount",
    "CGST Amount",
    "SGST Amount",
    "IGST Amount",
    "Total Amount",
    "Narration",
];

/// Which template variant a GSTIN maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Sales,
    Expense,
}

impl TemplateKind {
    /// 0-based header row index in the template sheet.
    pub fn header_row(&self) -> usize {
        match self {
            Self::Sales => 3,
            Self::Expense => 5,
        }
    }

    pub fn required_headers(&self) -> &'static [&'static str] {
        match self {
            Self::Sales => SALES_HEADERS,
            Self::Expense => EXPENSE_HEADERS,
        }
    }

    /// Template file name for a GSTIN.
    pub fn file_name(&self, gstin: &Gstin) -> String {
        match self {
            Self::Sales => format!("X2Beta Sales Template - {}.xlsx", gstin),
            Self::Expense => format!("X2Beta Expense Template - {}.xlsx", gstin),
        }
    }
}

/// Validated header layout of a loaded template.
#[derive(Debug, Clone)]
pub struct TemplateSchema {
    pub header_row: usize,
    /// Headers as present in the file, extras included.
    pub headers: Vec<String>,
    columns: HashMap<String, usize>,
}

impl TemplateSchema {
    fn from_headers(
        header_row: usize,
        headers: Vec<String>,
        required: &[&str],
    ) -> Result<Self, PipelineError> {
        let columns: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_lowercase(), i))
            .collect();
        let missing: Vec<&str> = required
            .iter()
            .filter(|h| !columns.contains_key(&h.to_lowercase()))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::TemplateInvalid(format!(
                "missing headers: {}",
                missing.join(", ")
            )));
        }
        Ok(Self {
            header_row,
            headers,
            columns,
        })
    }

    /// Column index for a header name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.get(&name.trim().to_lowercase()).copied()
    }
}

/// A loaded, validated template.
#[derive(Debug)]
pub struct Template {
    pub name: String,
    pub workbook: Workbook,
    pub schema: TemplateSchema,
}

/// One entry of a registry probe.
#[derive(Debug)]
pub struct TemplateProbe {
    pub gstin: Gstin,
    pub template_name: String,
    pub result: Result<(), PipelineError>,
}

/// Maps a GSTIN to its voucher template on the workbook store.
pub struct TemplateRegistry<'a> {
    store: &'a dyn WorkbookStore,
    root: PathBuf,
}

impl<'a> TemplateRegistry<'a> {
    pub fn new(store: &'a dyn WorkbookStore, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    /// Load and validate the template for a GSTIN.
    pub fn load(&self, kind: TemplateKind, gstin: &Gstin) -> Result<Template, PipelineError> {
        let name = kind.file_name(gstin);
        let path = self.root.join(&name);
        let workbook = self.store.load(&path).map_err(|e| {
            PipelineError::TemplateInvalid(format!("cannot load template {name}: {e}"))
        })?;

        let sheet = workbook.first_sheet().ok_or_else(|| {
            PipelineError::TemplateInvalid(format!("template {name} has no sheets"))
        })?;
        let header_row = kind.header_row();
        let headers: Vec<String> = sheet
            .rows
            .get(header_row)
            .ok_or_else(|| {
                PipelineError::TemplateInvalid(format!(
                    "template {name} has no header row {}",
                    header_row + 1
                ))
            })?
            .iter()
            .map(|c| c.value.as_text())
            .collect();

        let schema =
            TemplateSchema::from_headers(header_row, headers, kind.required_headers())?;
        Ok(Template {
            name,
            workbook,
            schema,
        })
    }

    /// Check which GSTINs have a usable template of the given kind.
    pub fn probe(&self, kind: TemplateKind, gstins: &[Gstin]) -> Vec<TemplateProbe> {
        gstins
            .iter()
            .map(|gstin| TemplateProbe {
                gstin: gstin.clone(),
                template_name: kind.file_name(gstin),
                result: self.load(kind, gstin).map(|_| ()),
            })
            .collect()
    }
}

/// Build a minimal valid template workbook in memory. Production
/// templates come from the registry directory; this is the seed used by
/// tests and first-time setup.
pub fn seed_template(kind: TemplateKind) -> Workbook {
    use crate::io::{Cell, Sheet};

    let mut sheet = Sheet::new(match kind {
        TemplateKind::Sales => "Sales Vouchers",
        TemplateKind::Expense => "Expense Vouchers",
    });
    for (col, header) in kind.required_headers().iter().enumerate() {
        let mut cell = Cell::text(*header);
        cell.style.bold = true;
        sheet.set(kind.header_row(), col, cell);
    }
    Workbook::with_sheet(sheet)
}
