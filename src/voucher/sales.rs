//! Sales voucher assembly: one X2Beta workbook per GST-rate batch.
//!
//! Each pivot row becomes one voucher row below the template header.
//! Voucher numbers are batch-local (counter from 1) — they identify the
//! aggregated voucher, not the per-transaction invoice numbers.

use rust_decimal::Decimal;

use crate::batch::{BatchFile, rate_pct};
use crate::core::money::round2;
use crate::core::states::state_abbreviation;
use crate::core::{Channel, Gstin, Month, PipelineError};
use crate::io::{Cell, Workbook};

use super::template::Template;

/// Counts and totals of an assembled workbook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoucherStats {
    pub record_count: usize,
    pub total_taxable: Decimal,
    pub total_tax: Decimal,
}

/// Output workbook name for a batch.
pub fn sales_workbook_name(
    channel: &Channel,
    gstin: &Gstin,
    month: Month,
    rate: Decimal,
) -> String {
    format!(
        "{}_{}_{}_{}pct_x2beta.xlsx",
        channel.as_str(),
        gstin.as_str(),
        month,
        rate_pct(rate)
    )
}

/// Map a batch onto the GSTIN's sales template.
pub fn assemble_sales_workbook(
    template: &Template,
    channel: &Channel,
    gstin: &Gstin,
    month: Month,
    batch: &BatchFile,
) -> Result<(Workbook, VoucherStats), PipelineError> {
    let mut workbook = template.workbook.clone();
    let sheet = workbook.sheets.first_mut().ok_or_else(|| {
        PipelineError::TemplateInvalid(format!("template {} has no sheets", template.name))
    })?;

    let schema = &template.schema;
    let header_row = schema.header_row;
    // Replace any sample rows below the header with real vouchers.
    sheet.rows.truncate(header_row + 1);

    let col = |name: &str| {
        schema.column(name).ok_or_else(|| {
            PipelineError::TemplateInvalid(format!("template lost column '{name}'"))
        })
    };

    let mut stats = VoucherStats::default();
    let company_abbr = state_abbreviation(gstin.state_name());

    for (index, row) in batch.rows.iter().enumerate() {
        let voucher_state = row
            .key
            .buyer_state
            .as_deref()
            .map(state_abbreviation)
            .unwrap_or_else(|| company_abbr.clone());
        let voucher_no = format!(
            "{}-{}-{}-{:04}",
            channel.invoice_prefix(),
            voucher_state,
            month.mm(),
            index + 1
        );

        let rate = if row.total_quantity > 0 {
            round2(row.total_taxable / Decimal::from(row.total_quantity))
        } else {
            Decimal::ZERO
        };
        let total_amount =
            row.total_taxable + row.total_cgst + row.total_sgst + row.total_igst;
        let half_pct = (row.key.gst_rate * Decimal::ONE_HUNDRED / Decimal::TWO).normalize();
        let full_pct = (row.key.gst_rate * Decimal::ONE_HUNDRED).normalize();

        let out = header_row + 1 + index;
        sheet.set(out, col("Date")?, Cell::date(month.first_day()));
        sheet.set(out, col("Voucher No.")?, Cell::text(voucher_no));
        sheet.set(out, col("Voucher Type")?, Cell::text("Sales"));
        sheet.set(out, col("Party Ledger")?, Cell::text(&row.key.ledger_name));
        sheet.set(out, col("Party Name")?, Cell::text(&row.key.ledger_name));
        sheet.set(out, col("Item Name")?, Cell::text(&row.key.fg));
        sheet.set(out, col("Quantity")?, Cell::quantity(row.total_quantity));
        sheet.set(out, col("Rate")?, Cell::amount(rate));
        sheet.set(out, col("Taxable Amount")?, Cell::amount(row.total_taxable));

        let tax_ledger = |amount: Decimal, label: String| {
            if amount.is_zero() {
                Cell::empty()
            } else {
                Cell::text(label)
            }
        };
        sheet.set(
            out,
            col("Output CGST Ledger")?,
            tax_ledger(row.total_cgst, format!("Output CGST @ {half_pct}%")),
        );
        sheet.set(out, col("CGST Amount")?, Cell::amount(row.total_cgst));
        sheet.set(
            out,
            col("Output SGST Ledger")?,
            tax_ledger(row.total_sgst, format!("Output SGST @ {half_pct}%")),
        );
        sheet.set(out, col("SGST Amount")?, Cell::amount(row.total_sgst));
        sheet.set(
            out,
            col("Output IGST Ledger")?,
            tax_ledger(row.total_igst, format!("Output IGST @ {full_pct}%")),
        );
        sheet.set(out, col("IGST Amount")?, Cell::amount(row.total_igst));
        sheet.set(out, col("Total Amount")?, Cell::amount(total_amount));
        sheet.set(
            out,
            col("Narration")?,
            Cell::text(format!("Sales - {} - {}", row.key.fg, month)),
        );

        stats.record_count += 1;
        stats.total_taxable += row.total_taxable;
        stats.total_tax += row.total_cgst + row.total_sgst + row.total_igst;
    }

    tracing::info!(
        stage = "voucher",
        batch = %batch.file_name,
        vouchers = stats.record_count,
        "sales workbook assembled"
    );
    Ok((workbook, stats))
}
