//! Seller fee-invoice parsing.
//!
//! Fee statements arrive either as text-extractable PDFs (parsed from
//! their plain text) or as workbook/CSV tables. Both converge on
//! [`ParsedInvoice`] before mapping.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::core::PipelineError;
use crate::io::RawTable;
use crate::normalize::clean;

use super::rules::classify_expense;

/// One fee line item.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLineItem {
    pub description: String,
    pub expense_type: String,
    pub taxable_value: Decimal,
    pub total_value: Decimal,
}

/// A parsed fee statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedInvoice {
    pub invoice_no: String,
    pub invoice_date: Option<NaiveDate>,
    pub gstin: String,
    pub line_items: Vec<ParsedLineItem>,
}

/// Parse the text layer of a fee-invoice PDF.
///
/// Header fields are `Key: value` lines; line items are rows whose final
/// two tokens are amounts (taxable, total) with the description before
/// them.
pub fn parse_invoice_text(text: &str) -> Result<ParsedInvoice, PipelineError> {
    let mut parsed = ParsedInvoice::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(value) = strip_label(line, "Invoice Number:") {
            parsed.invoice_no = value.to_string();
            continue;
        }
        if let Some(value) = strip_label(line, "Invoice Date:") {
            parsed.invoice_date = clean::parse_date(value).ok();
            continue;
        }
        if let Some(value) = strip_label(line, "GSTIN:") {
            parsed.gstin = value.to_string();
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            continue;
        }
        let (taxable, total) = match (
            tokens[tokens.len() - 2].parse::<Decimal>(),
            tokens[tokens.len() - 1].parse::<Decimal>(),
        ) {
            (Ok(a), Ok(b)) => (a, b),
            _ => continue,
        };
        let description = tokens[..tokens.len() - 2].join(" ");
        parsed.line_items.push(ParsedLineItem {
            expense_type: classify_expense(&description).to_string(),
            description,
            taxable_value: taxable,
            total_value: total,
        });
    }

    if parsed.line_items.is_empty() {
        return Err(PipelineError::EmptyInput(
            "fee statement has no line items".into(),
        ));
    }
    Ok(parsed)
}

/// Parse a workbook/CSV fee statement.
///
/// Columns: `Invoice`, `Date`, `GSTIN`, `Description`, `Taxable Amount`,
/// `Total Amount`; header fields come from the first data row.
pub fn parse_invoice_table(table: &RawTable) -> Result<ParsedInvoice, PipelineError> {
    let cols = table.require_columns(&[
        "Invoice",
        "Date",
        "GSTIN",
        "Description",
        "Taxable Amount",
        "Total Amount",
    ])?;
    let (invoice, date, gstin, description, taxable, total) =
        (cols[0], cols[1], cols[2], cols[3], cols[4], cols[5]);

    if table.rows.is_empty() {
        return Err(PipelineError::EmptyInput(
            "fee statement has no line items".into(),
        ));
    }

    let mut parsed = ParsedInvoice {
        invoice_no: table.cell(0, invoice).to_string(),
        invoice_date: clean::parse_date(table.cell(0, date)).ok(),
        gstin: table.cell(0, gstin).to_string(),
        line_items: Vec::new(),
    };

    for (i, _) in table.rows.iter().enumerate() {
        let description = table.cell(i, description).to_string();
        let taxable_value = clean::parse_money(table.cell(i, taxable))
            .map_err(|e| PipelineError::SchemaMismatch(format!("line {i}: {e}")))?;
        let total_value = clean::parse_money(table.cell(i, total))
            .map_err(|e| PipelineError::SchemaMismatch(format!("line {i}: {e}")))?;
        parsed.line_items.push(ParsedLineItem {
            expense_type: classify_expense(&description).to_string(),
            description,
            taxable_value,
            total_value,
        });
    }
    Ok(parsed)
}

/// Validate a parsed statement before mapping. Returns every problem
/// found, empty when clean.
pub fn validate_parsed(parsed: &ParsedInvoice) -> Vec<String> {
    let mut errors = Vec::new();
    if parsed.invoice_no.trim().is_empty() {
        errors.push("missing invoice number".to_string());
    }
    if parsed.invoice_date.is_none() {
        errors.push("missing or unparseable invoice date".to_string());
    }
    if parsed.line_items.is_empty() {
        errors.push("no line items".to_string());
    }
    for (i, item) in parsed.line_items.iter().enumerate() {
        if item.expense_type.trim().is_empty() {
            errors.push(format!("line {i}: missing expense type"));
        }
        if item.taxable_value < Decimal::ZERO {
            errors.push(format!("line {i}: negative taxable value"));
        }
        if item.total_value < item.taxable_value {
            errors.push(format!("line {i}: total below taxable value"));
        }
    }
    errors
}

fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let lowered = line.to_lowercase();
    if lowered.starts_with(&label.to_lowercase()) {
        Some(line[label.len()..].trim())
    } else {
        None
    }
}
