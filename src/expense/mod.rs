//! Seller-invoice expense pipeline: parse fee statements, map line items
//! to expense ledgers, split input GST and assign expense voucher
//! numbers.
//!
//! The vendor's state is not present on marketplace fee statements, so
//! the GST split defaults to interstate (IGST).

mod parser;
mod rules;

pub use parser::{ParsedInvoice, ParsedLineItem, parse_invoice_table, parse_invoice_text, validate_parsed};
pub use rules::{
    DEFAULT_EXPENSE_TYPE, ExpenseRule, classify_expense, expense_rule, input_gst_ledger,
    payable_ledger,
};

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{Channel, Gstin, Month, PipelineError};
use crate::io::SequenceKey;
use crate::numbering::{InvoiceAllocator, expense_voucher_number};
use crate::tax::{TaxInput, TaxRules};

/// A fee line item mapped to its ledger with the GST split applied and a
/// voucher number assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedExpense {
    pub vendor_invoice_no: String,
    pub invoice_date: NaiveDate,
    pub expense_type: String,
    pub ledger_name: String,
    pub taxable_value: Decimal,
    pub gst_rate: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub total_value: Decimal,
    pub voucher_no: String,
}

impl MappedExpense {
    pub fn total_tax(&self) -> Decimal {
        self.cgst + self.sgst + self.igst
    }
}

/// Rollup of a mapping pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpenseMappingSummary {
    pub total_expenses: usize,
    pub total_amount: Decimal,
    /// Per expense type: (count, total value).
    pub by_type: BTreeMap<String, (usize, Decimal)>,
}

pub fn summarize_expenses(expenses: &[MappedExpense]) -> ExpenseMappingSummary {
    let mut summary = ExpenseMappingSummary {
        total_expenses: expenses.len(),
        ..Default::default()
    };
    for expense in expenses {
        summary.total_amount += expense.total_value;
        let slot = summary
            .by_type
            .entry(expense.expense_type.clone())
            .or_insert((0, Decimal::ZERO));
        slot.0 += 1;
        slot.1 += expense.total_value;
    }
    summary
}

/// Sequence key for expense vouchers: one counter per (gstin, month).
/// The buyer-state slot stays empty — expenses have no buyer.
pub fn expense_sequence_key(gstin: &Gstin, channel: &Channel, month: Month) -> SequenceKey {
    SequenceKey {
        gstin: gstin.clone(),
        channel: channel.clone(),
        buyer_state: String::new(),
        month,
    }
}

/// Map a parsed fee statement's line items to ledger-ready expenses.
///
/// Rows are processed in statement order so voucher numbers are stable.
pub fn map_line_items(
    parsed: &ParsedInvoice,
    channel: &Channel,
    gstin: &Gstin,
    month: Month,
    tax: &TaxRules,
    allocator: &mut InvoiceAllocator<'_>,
) -> Result<Vec<MappedExpense>, PipelineError> {
    let errors = validate_parsed(parsed);
    if !errors.is_empty() {
        return Err(PipelineError::SchemaMismatch(format!(
            "fee statement {} failed validation: {}",
            parsed.invoice_no,
            errors.join("; ")
        )));
    }
    // Validated above.
    let invoice_date = parsed
        .invoice_date
        .ok_or_else(|| PipelineError::SchemaMismatch("missing invoice date".into()))?;

    let key = expense_sequence_key(gstin, channel, month);
    let mut mapped = Vec::with_capacity(parsed.line_items.len());
    for item in &parsed.line_items {
        let rule = expense_rule(channel, &item.expense_type);

        let mut input = TaxInput::new(item.taxable_value, rule.default_gst_rate, "");
        // Vendor state unknown: interstate by default.
        input.force_igst = true;
        let split = tax.split(&input)?;

        let sequence = allocator.allocate(&key)?;
        mapped.push(MappedExpense {
            vendor_invoice_no: parsed.invoice_no.clone(),
            invoice_date,
            expense_type: item.expense_type.clone(),
            ledger_name: rule.ledger_name,
            taxable_value: split.taxable_value,
            gst_rate: split.gst_rate,
            cgst: split.cgst,
            sgst: split.sgst,
            igst: split.igst,
            total_value: split.total_amount,
            voucher_no: expense_voucher_number(gstin.state_code(), month, sequence),
        });
    }

    tracing::info!(
        stage = "expense_map",
        invoice = %parsed.invoice_no,
        line_items = mapped.len(),
        "fee statement mapped"
    );
    Ok(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Config;
    use crate::io::MemoryDatabase;
    use rust_decimal_macros::dec;

    fn fixture() -> (Gstin, Month, TaxRules) {
        let gstin = Gstin::parse("06ABGCS4796R1ZA").unwrap();
        let month = Month::parse("2025-08").unwrap();
        let tax = TaxRules::new(&gstin, &Config::default());
        (gstin, month, tax)
    }

    fn statement() -> ParsedInvoice {
        parse_invoice_text(
            "Invoice Number: AMZ-FEE-001\n\
             Invoice Date: 20-08-2025\n\
             GSTIN: 06ABGCS4796R1ZA\n\
             Closing Fee 1000.00 1180.00\n\
             Shipping Fee 2000.00 2360.00\n",
        )
        .unwrap()
    }

    #[test]
    fn maps_with_igst_and_sequential_vouchers() {
        let (gstin, month, tax) = fixture();
        let db = MemoryDatabase::new();
        let mut allocator = InvoiceAllocator::new(&db);

        let mapped =
            map_line_items(&statement(), &Channel::AmazonMtr, &gstin, month, &tax, &mut allocator)
                .unwrap();
        assert_eq!(mapped.len(), 2);

        let closing = &mapped[0];
        assert_eq!(closing.ledger_name, "Amazon Closing Fee");
        assert_eq!(closing.igst, dec!(180));
        assert_eq!(closing.cgst, dec!(0));
        assert_eq!(closing.total_value, dec!(1180));
        assert_eq!(closing.voucher_no, "EXP0625080001");

        let shipping = &mapped[1];
        assert_eq!(shipping.ledger_name, "Amazon Shipping Fee");
        assert_eq!(shipping.voucher_no, "EXP0625080002");
    }

    #[test]
    fn unknown_descriptions_fall_back() {
        let (gstin, month, tax) = fixture();
        let db = MemoryDatabase::new();
        let mut allocator = InvoiceAllocator::new(&db);
        let parsed = parse_invoice_text(
            "Invoice Number: UNK-1\n\
             Invoice Date: 20-08-2025\n\
             Mystery levy 500.00 590.00\n",
        )
        .unwrap();
        let mapped =
            map_line_items(&parsed, &Channel::AmazonMtr, &gstin, month, &tax, &mut allocator)
                .unwrap();
        assert_eq!(mapped[0].expense_type, "Other Fee");
        assert_eq!(mapped[0].ledger_name, "Amazon Other Fee");
    }

    #[test]
    fn invalid_statement_is_rejected() {
        let (gstin, month, tax) = fixture();
        let db = MemoryDatabase::new();
        let mut allocator = InvoiceAllocator::new(&db);
        let parsed = ParsedInvoice {
            invoice_no: String::new(),
            invoice_date: None,
            gstin: String::new(),
            line_items: vec![],
        };
        assert!(
            map_line_items(&parsed, &Channel::AmazonMtr, &gstin, month, &tax, &mut allocator)
                .is_err()
        );
    }

    #[test]
    fn summary_breaks_down_by_type() {
        let (gstin, month, tax) = fixture();
        let db = MemoryDatabase::new();
        let mut allocator = InvoiceAllocator::new(&db);
        let mapped =
            map_line_items(&statement(), &Channel::AmazonMtr, &gstin, month, &tax, &mut allocator)
                .unwrap();
        let summary = summarize_expenses(&mapped);
        assert_eq!(summary.total_expenses, 2);
        assert_eq!(summary.total_amount, dec!(3540));
        assert_eq!(summary.by_type.get("Closing Fee").unwrap().0, 1);
    }
}
