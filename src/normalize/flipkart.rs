//! Flipkart sales report normalizer. Invoice-date based; the buyer state
//! stays a pivot dimension for this channel, so the state column is the
//! one field that must always be clean.

use crate::core::{CanonicalRow, PipelineError, ReportType, RowException};
use crate::io::RawTable;

use super::clean;
use super::{NormalizeContext, NormalizedReport, Normalizer, reject_empty};

const REQUIRED: &[&str] = &[
    "Invoice Date",
    "Order Id",
    "SKU",
    "Qty",
    "Net Amount",
    "Tax Rate",
    "Ship To State Code",
];

#[derive(Debug, Default)]
pub struct FlipkartNormalizer;

impl FlipkartNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl Normalizer for FlipkartNormalizer {
    fn report_type(&self) -> ReportType {
        ReportType::Flipkart
    }

    fn normalize(
        &self,
        table: &RawTable,
        ctx: &NormalizeContext<'_>,
    ) -> Result<NormalizedReport, PipelineError> {
        let cols = table.require_columns(REQUIRED)?;
        let (date, order_id, sku, qty, amount, rate, state) =
            (cols[0], cols[1], cols[2], cols[3], cols[4], cols[5], cols[6]);

        if table.rows.is_empty() {
            return Err(PipelineError::EmptyInput("no data rows after header".into()));
        }

        let mut report = NormalizedReport::default();
        for (i, _) in table.rows.iter().enumerate() {
            let parsed: Result<CanonicalRow, String> = (|| {
                Ok(CanonicalRow {
                    invoice_date: clean::parse_date(table.cell(i, date))?,
                    order_id: table.cell(i, order_id).to_string(),
                    sku: table.cell(i, sku).to_string(),
                    asin: String::new(),
                    quantity: clean::parse_qty(table.cell(i, qty))?,
                    taxable_value: clean::parse_money(table.cell(i, amount))?,
                    gst_rate: clean::parse_rate(
                        table.cell(i, rate),
                        ctx.config.default_gst_rate,
                    )?,
                    buyer_state: clean::clean_state(table.cell(i, state), ctx.config),
                    seller_state: None,
                    shipping_value: rust_decimal::Decimal::ZERO,
                    returned_qty: None,
                    total_qty: None,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Channel, Config, Gstin, Month};
    use rust_decimal_macros::dec;

    #[test]
    fn normalizes_flipkart_rows() {
        let config = Config::default();
        let ctx = NormalizeContext {
            config: &config,
            channel: Channel::Flipkart,
            gstin: Gstin::parse("06ABGCS4796R1ZA").unwrap(),
            month: Month::parse("2025-08").unwrap(),
        };
        let t = RawTable::from_csv_reader(
            "Invoice Date,Order Id,SKU,Qty,Net Amount,Tax Rate,Ship To State Code\n\
             2025-08-04,F1,FSN1,2,200.00,18,27\n"
                .as_bytes(),
            "test",
        )
        .unwrap();
        let report = FlipkartNormalizer::new().normalize(&t, &ctx).unwrap();
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].buyer_state, "MAHARASHTRA");
        assert_eq!(report.rows[0].taxable_value, dec!(200.00));
        assert_eq!(report.rows[0].asin, "");
    }
}
