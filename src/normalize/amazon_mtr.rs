//! Amazon monthly transaction report (MTR) normalizer.
//!
//! Shipment and Refund rows are the taxable events; refunds are negated.
//! Everything else (cancellations, replacements) is skipped.

use rust_decimal::Decimal;

use crate::core::{CanonicalRow, PipelineError, ReportType, RowException};
use crate::io::RawTable;

use super::clean;
use super::{NormalizeContext, NormalizedReport, Normalizer, reject_empty};

const REQUIRED: &[&str] = &[
    "Date",
    "Transaction Type",
    "Amazon Order Id",
    "SKU",
    "Qty",
    "Item Price",
    "Tax Rate",
    "Ship To State Code",
];

#[derive(Debug, Default)]
pub struct AmazonMtrNormalizer;

impl AmazonMtrNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl Normalizer for AmazonMtrNormalizer {
    fn report_type(&self) -> ReportType {
        ReportType::AmazonMtr
    }

    fn normalize(
        &self,
        table: &RawTable,
        ctx: &NormalizeContext<'_>,
    ) -> Result<NormalizedReport, PipelineError> {
        let cols = table.require_columns(REQUIRED)?;
        let (date, tx_type, order_id, sku, qty, price, rate, state) = (
            cols[0], cols[1], cols[2], cols[3], cols[4], cols[5], cols[6], cols[7],
        );
        let asin = table.column("ASIN");
        let shipping = table.column("Shipping Amount");

        if table.rows.is_empty() {
            return Err(PipelineError::EmptyInput("no data rows after header".into()));
        }

        let mut report = NormalizedReport::default();
        for (i, _) in table.rows.iter().enumerate() {
            let transaction = table.cell(i, tx_type).trim().to_string();
            let sign = match transaction.as_str() {
                t if t.eq_ignore_ascii_case("Shipment") => Decimal::ONE,
                t if t.eq_ignore_ascii_case("Refund") => Decimal::NEGATIVE_ONE,
                _ => continue,
            };

            match parse_row(table, ctx, i, sign, date, order_id, sku, asin, qty, price, rate, state, shipping) {
                Ok(row) => report.rows.push(row),
                Err(message) => {
                    tracing::warn!(stage = "normalize", row = i, %message, "dropping row");
                    report.exceptions.push(RowException::unparseable(i, message));
                }
            }
        }

        reject_empty(report, self.report_type())
    }
}

#[allow(clippy::too_many_arguments)]
fn parse_row(
    table: &RawTable,
    ctx: &NormalizeContext<'_>,
    i: usize,
    sign: Decimal,
    date: usize,
    order_id: usize,
    sku: usize,
    asin: Option<usize>,
    qty: usize,
    price: usize,
    rate: usize,
    state: usize,
    shipping: Option<usize>,
) -> Result<CanonicalRow, String> {
    let quantity = clean::parse_qty(table.cell(i, qty))?;
    let taxable = clean::parse_money(table.cell(i, price))?;
    let shipping_value = match shipping {
        Some(col) => clean::parse_money(table.cell(i, col))?,
        None => Decimal::ZERO,
    };
    Ok(CanonicalRow {
        invoice_date: clean::parse_date(table.cell(i, date))?,
        order_id: table.cell(i, order_id).to_string(),
        sku: table.cell(i, sku).to_string(),
        asin: asin.map(|col| table.cell(i, col).to_string()).unwrap_or_default(),
        quantity: if sign.is_sign_negative() { -quantity } else { quantity },
        taxable_value: taxable * sign,
        gst_rate: clean::parse_rate(table.cell(i, rate), ctx.config.default_gst_rate)?,
        buyer_state: clean::clean_state(table.cell(i, state), ctx.config),
        seller_state: None,
        shipping_value: shipping_value * sign,
        returned_qty: None,
        total_qty: None,
    })
}
