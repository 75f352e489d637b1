//! Expense voucher assembly: balanced multi-row purchase vouchers.
//!
//! Each mapped fee line becomes one voucher: a debit row on the expense
//! ledger, a debit row per non-zero input-GST component, and a credit
//! row on the vendor-payable ledger for the negative total. Rows of a
//! voucher sum to zero; the assembler enforces that before returning.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::core::{Channel, Gstin, Month, PipelineError};
use crate::expense::{MappedExpense, input_gst_ledger, payable_ledger};
use crate::io::{Cell, Workbook};

use super::sales::VoucherStats;
use super::template::Template;

/// Output workbook name for a month's expenses.
pub fn expense_workbook_name(channel: &Channel, gstin: &Gstin, month: Month) -> String {
    format!(
        "{}_{}_{}_expense_x2beta.xlsx",
        channel.as_str(),
        gstin.as_str(),
        month
    )
}

/// Map mapped expenses onto the GSTIN's expense template.
pub fn assemble_expense_workbook(
    template: &Template,
    channel: &Channel,
    expenses: &[MappedExpense],
) -> Result<(Workbook, VoucherStats), PipelineError> {
    let mut workbook = template.workbook.clone();
    let sheet = workbook.sheets.first_mut().ok_or_else(|| {
        PipelineError::TemplateInvalid(format!("template {} has no sheets", template.name))
    })?;

    let schema = &template.schema;
    sheet.rows.truncate(schema.header_row + 1);

    let col = |name: &str| {
        schema.column(name).ok_or_else(|| {
            PipelineError::TemplateInvalid(format!("template lost column '{name}'"))
        })
    };

    let date_col = col("Date")?;
    let voucher_col = col("Voucher No.")?;
    let type_col = col("Voucher Type")?;
    let ledger_col = col("Party Ledger")?;
    let item_col = col("Item Name")?;
    let qty_col = col("Quantity")?;
    let rate_col = col("Rate")?;
    let taxable_col = col("Taxable Amount")?;
    let cgst_col = col("CGST Amount")?;
    let sgst_col = col("SGST Amount")?;
    let igst_col = col("IGST Amount")?;
    let total_col = col("Total Amount")?;
    let narration_col = col("Narration")?;

    let mut stats = VoucherStats::default();
    let mut out = schema.header_row + 1;

    for expense in expenses {
        let mut voucher_total = Decimal::ZERO;

        // One voucher = expense debit + input GST debits + payable credit.
        let mut rows: Vec<(String, String, Decimal, [Decimal; 4], String)> = Vec::new();
        rows.push((
            expense.ledger_name.clone(),
            format!("{} - {}", expense.expense_type, expense.vendor_invoice_no),
            expense.taxable_value,
            [expense.taxable_value, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO],
            format!("{} - {}", expense.expense_type, expense.vendor_invoice_no),
        ));
        let half_rate = expense.gst_rate / Decimal::TWO;
        for (component, amount, rate) in [
            ("CGST", expense.cgst, half_rate),
            ("SGST", expense.sgst, half_rate),
            ("IGST", expense.igst, expense.gst_rate),
        ] {
            if amount.is_zero() {
                continue;
            }
            let (taxable, cgst, sgst, igst) = match component {
                "CGST" => (Decimal::ZERO, amount, Decimal::ZERO, Decimal::ZERO),
                "SGST" => (Decimal::ZERO, Decimal::ZERO, amount, Decimal::ZERO),
                _ => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO, amount),
            };
            rows.push((
                input_gst_ledger(component, rate),
                format!("Input {} - {}", component, expense.vendor_invoice_no),
                amount,
                [taxable, cgst, sgst, igst],
                format!("Input {} on {}", component, expense.expense_type.to_lowercase()),
            ));
        }
        rows.push((
            payable_ledger(channel),
            format!("Payable - {}", expense.vendor_invoice_no),
            -expense.total_value,
            [-expense.total_value, Decimal::ZERO, Decimal::ZERO, Decimal::ZERO],
            format!("Amount payable for {}", expense.vendor_invoice_no),
        ));

        for (ledger, item, rate, [taxable, cgst, sgst, igst], narration) in rows {
            let total = taxable + cgst + sgst + igst;
            voucher_total += total;
            sheet.set(out, date_col, Cell::date(expense.invoice_date));
            sheet.set(out, voucher_col, Cell::text(&expense.voucher_no));
            sheet.set(out, type_col, Cell::text("Purchase"));
            sheet.set(out, ledger_col, Cell::text(ledger));
            sheet.set(out, item_col, Cell::text(item));
            sheet.set(out, qty_col, Cell::quantity(1));
            sheet.set(out, rate_col, Cell::amount(rate));
            sheet.set(out, taxable_col, Cell::amount(taxable));
            sheet.set(out, cgst_col, Cell::amount(cgst));
            sheet.set(out, sgst_col, Cell::amount(sgst));
            sheet.set(out, igst_col, Cell::amount(igst));
            sheet.set(out, total_col, Cell::amount(total));
            sheet.set(out, narration_col, Cell::text(narration));
            out += 1;
        }

        if voucher_total.abs() > dec!(0.01) {
            return Err(PipelineError::IntegrityCheckFailed(format!(
                "expense voucher {} does not balance: residue {voucher_total}",
                expense.voucher_no
            )));
        }

        stats.record_count += 1;
        stats.total_taxable += expense.taxable_value;
        stats.total_tax += expense.total_tax();
    }

    tracing::info!(
        stage = "voucher",
        vouchers = stats.record_count,
        "expense workbook assembled"
    );
    Ok((workbook, stats))
}
