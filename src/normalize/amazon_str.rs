//! Amazon settlement report (STR) normalizer.
//!
//! Posting-date rows; both ship-to and seller state are captured because
//! the settlement channel posts IGST even when they coincide. The report
//! has no SKU column, so SKUs are recovered through an ASIN→SKU side map
//! when one is available.

use std::collections::BTreeMap;

use crate::core::{CanonicalRow, PipelineError, ReportType, RowException};
use crate::io::RawTable;

use super::clean;
use super::{NormalizeContext, NormalizedReport, Normalizer, reject_empty};

const REQUIRED: &[&str] = &[
    "Posting Date",
    "Amazon Order Id",
    "ASIN",
    "Qty",
    "Net Amount",
    "Tax Rate",
    "Ship To State Code",
    "Seller State Code",
];

#[derive(Debug, Default)]
pub struct AmazonStrNormalizer {
    asin_to_sku: BTreeMap<String, String>,
}

impl AmazonStrNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asin_map(asin_to_sku: BTreeMap<String, String>) -> Self {
        Self { asin_to_sku }
    }
}

impl Normalizer for AmazonStrNormalizer {
    fn report_type(&self) -> ReportType {
        ReportType::AmazonStr
    }

    fn normalize(
        &self,
        table: &RawTable,
        ctx: &NormalizeContext<'_>,
    ) -> Result<NormalizedReport, PipelineError> {
        let cols = table.require_columns(REQUIRED)?;
        let (date, order_id, asin, qty, amount, rate, ship_state, seller_state) = (
            cols[0], cols[1], cols[2], cols[3], cols[4], cols[5], cols[6], cols[7],
        );
        let returned_qty = table.column("Returned Qty");
        let total_qty = table.column("Total Qty");

        if table.rows.is_empty() {
            return Err(PipelineError::EmptyInput("no data rows after header".into()));
        }

        let mut report = NormalizedReport::default();
        for (i, _) in table.rows.iter().enumerate() {
            let parsed: Result<CanonicalRow, String> = (|| {
                let asin_value = table.cell(i, asin).to_string();
                let sku = self
                    .asin_to_sku
                    .get(&asin_value)
                    .cloned()
                    .unwrap_or_default();
                let returned = match returned_qty {
                    Some(col) if !table.cell(i, col).is_empty() => {
                        Some(clean::parse_qty(table.cell(i, col))?)
                    }
                    _ => None,
                };
                let total = match total_qty {
                    Some(col) if !table.cell(i, col).is_empty() => {
                        Some(clean::parse_qty(table.cell(i, col))?)
                    }
                    _ => None,
                };
                Ok(CanonicalRow {
                    invoice_date: clean::parse_date(table.cell(i, date))?,
                    order_id: table.cell(i, order_id).to_string(),
                    sku,
                    asin: asin_value,
                    quantity: clean::parse_qty(table.cell(i, qty))?,
                    taxable_value: clean::parse_money(table.cell(i, amount))?,
                    gst_rate: clean::parse_rate(
                        table.cell(i, rate),
                        ctx.config.default_gst_rate,
                    )?,
                    buyer_state: clean::clean_state(table.cell(i, ship_state), ctx.config),
                    seller_state: Some(clean::clean_state(
                        table.cell(i, seller_state),
                        ctx.config,
                    )),
                    shipping_value: rust_decimal::Decimal::ZERO,
                    returned_qty: returned,
                    total_qty: total,
                })
            })();

            match parsed {
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
