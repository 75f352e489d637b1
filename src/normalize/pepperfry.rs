//! Pepperfry normalizer: a sales file plus a sibling returns file.
//!
//! Sales rows pass through as-is. Each returns row is re-emitted against
//! the original order with a negative quantity and value, so downstream
//! aggregation nets out without any special casing. `returned_qty` is
//! recorded on the return row; `total_qty` stays unset so the tax engine
//! does not re-adjust a value that already carries its sign.

use crate::core::{CanonicalRow, PipelineError, ReportType, RowException};
use crate::io::RawTable;

use super::clean;
use super::{NormalizeContext, NormalizedReport, Normalizer, reject_empty};

const REQUIRED: &[&str] = &[
    "Invoice Date",
    "Order Id",
    "Item SKU",
    "Qty",
    "Net Amount",
    "Tax Rate",
    "State Code",
];

#[derive(Debug, Default)]
pub struct PepperfryNormalizer {
    returns: Option<RawTable>,
}

impl PepperfryNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the sibling returns file.
    pub fn with_returns(returns: RawTable) -> Self {
        Self {
            returns: Some(returns),
        }
    }
}

impl Normalizer for PepperfryNormalizer {
    fn report_type(&self) -> ReportType {
        ReportType::Pepperfry
    }

    fn normalize(
        &self,
        table: &RawTable,
        ctx: &NormalizeContext<'_>,
    ) -> Result<NormalizedReport, PipelineError> {
        if table.rows.is_empty() {
            return Err(PipelineError::EmptyInput("no data rows after header".into()));
        }

        let mut report = NormalizedReport::default();
        collect_rows(table, ctx, false, &mut report)?;
        if let Some(returns) = &self.returns {
            collect_rows(returns, ctx, true, &mut report)?;
        }

        reject_empty(report, self.report_type())
    }
}

fn collect_rows(
    table: &RawTable,
    ctx: &NormalizeContext<'_>,
    is_return: bool,
    report: &mut NormalizedReport,
) -> Result<(), PipelineError> {
    let cols = table.require_columns(REQUIRED)?;
    let (date, order_id, sku, qty, amount, rate, state) =
        (cols[0], cols[1], cols[2], cols[3], cols[4], cols[5], cols[6]);

    for (i, _) in table.rows.iter().enumerate() {
        let parsed: Result<CanonicalRow, String> = (|| {
            let quantity = clean::parse_qty(table.cell(i, qty))?;
            let taxable = clean::parse_money(table.cell(i, amount))?;
            let (quantity, taxable, returned) = if is_return {
                (-quantity, -taxable, Some(quantity))
            } else {
                (quantity, taxable, None)
            };
            Ok(CanonicalRow {
                invoice_date: clean::parse_date(table.cell(i, date))?,
                order_id: table.cell(i, order_id).to_string(),
                sku: table.cell(i, sku).to_string(),
                asin: String::new(),
                quantity,
                taxable_value: taxable,
                gst_rate: clean::parse_rate(table.cell(i, rate), ctx.config.default_gst_rate)?,
                buyer_state: clean::clean_state(table.cell(i, state), ctx.config),
                seller_state: None,
                shipping_value: rust_decimal::Decimal::ZERO,
                returned_qty: returned,
                total_qty: None,
            })
        })();

        match parsed {
            Ok(row) => report.rows.push(row),
            Err(message) => {
                tracing::warn!(stage = "normalize", row = i, returns = is_return, %message, "dropping row");
                report.exceptions.push(RowException::unparseable(i, message));
            }
        }
    }
    Ok(())
}
