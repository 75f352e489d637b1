//! CSV artifact writers and content hashing.
//!
//! All intermediate artifacts are UTF-8 CSV with LF line endings, a
//! header row, ISO-8601 dates, and plain 2-decimal amounts. Every row
//! carries the run id.

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::core::money::fmt_amount;
use crate::core::{
    CanonicalRow, Channel, EnrichedRow, Gstin, Month, PipelineError, PivotRow, PricedRow,
};

/// SHA-256 hex digest of artifact bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Identity columns appended to every row artifact.
pub struct RowStamp<'a> {
    pub channel: &'a Channel,
    pub gstin: &'a Gstin,
    pub month: Month,
    pub run_id: Uuid,
}

impl RowStamp<'_> {
    fn values(&self) -> [String; 4] {
        [
            self.channel.as_str().to_string(),
            self.gstin.as_str().to_string(),
            self.month.to_string(),
            self.run_id.to_string(),
        ]
    }
}

fn opt_qty(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn rate_str(rate: Decimal) -> String {
    rate.normalize().to_string()
}

fn canonical_fields(row: &CanonicalRow) -> Vec<String> {
    vec![
        row.invoice_date.format("%Y-%m-%d").to_string(),
        row.order_id.clone(),
        row.sku.clone(),
        row.asin.clone(),
        row.quantity.to_string(),
        fmt_amount(row.taxable_value),
        rate_str(row.gst_rate),
        row.buyer_state.clone(),
        row.seller_state.clone().unwrap_or_default(),
        fmt_amount(row.shipping_value),
        opt_qty(row.returned_qty),
        opt_qty(row.total_qty),
    ]
}

const CANONICAL_HEADERS: &[&str] = &[
    "invoice_date",
    "order_id",
    "sku",
    "asin",
    "quantity",
    "taxable_value",
    "gst_rate",
    "buyer_state",
    "seller_state",
    "shipping_value",
    "returned_qty",
    "total_qty",
];

const STAMP_HEADERS: &[&str] = &["channel", "gstin", "month", "run_id"];

fn write_csv(
    headers: Vec<&str>,
    rows: impl Iterator<Item = Vec<String>>,
) -> Result<Vec<u8>, PipelineError> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    let io_err =
        |e: csv::Error| PipelineError::StorageUnavailable(format!("csv write: {e}"));
    writer.write_record(&headers).map_err(io_err)?;
    for row in rows {
        writer.write_record(&row).map_err(io_err)?;
    }
    writer
        .into_inner()
        .map_err(|e| PipelineError::StorageUnavailable(format!("csv write: {e}")))
}

/// Normalized artifact.
pub fn canonical_csv(
    rows: &[CanonicalRow],
    stamp: &RowStamp<'_>,
) -> Result<Vec<u8>, PipelineError> {
    let headers = [CANONICAL_HEADERS, STAMP_HEADERS].concat();
    write_csv(
        headers,
        rows.iter().map(|row| {
            let mut fields = canonical_fields(row);
            fields.extend(stamp.values());
            fields
        }),
    )
}

/// Enriched artifact.
pub fn enriched_csv(
    rows: &[EnrichedRow],
    stamp: &RowStamp<'_>,
) -> Result<Vec<u8>, PipelineError> {
    let headers = [
        CANONICAL_HEADERS,
        &["fg", "item_resolved", "ledger_name", "ledger_resolved"],
        STAMP_HEADERS,
    ]
    .concat();
    write_csv(
        headers,
        rows.iter().map(|row| {
            let mut fields = canonical_fields(&row.row);
            fields.push(row.fg.clone());
            fields.push(row.item_resolved.to_string());
            fields.push(row.ledger_name.clone());
            fields.push(row.ledger_resolved.to_string());
            fields.extend(stamp.values());
            fields
        }),
    )
}

/// Priced (with-tax) artifact.
pub fn priced_csv(
    rows: &[PricedRow],
    stamp: &RowStamp<'_>,
) -> Result<Vec<u8>, PipelineError> {
    let headers = [
        CANONICAL_HEADERS,
        &["fg", "item_resolved", "ledger_name", "ledger_resolved"],
        &["cgst", "sgst", "igst", "total_tax", "total_amount", "invoice_no"],
        STAMP_HEADERS,
    ]
    .concat();
    write_csv(
        headers,
        rows.iter().map(|row| {
            let mut fields = canonical_fields(&row.row.row);
            fields.push(row.row.fg.clone());
            fields.push(row.row.item_resolved.to_string());
            fields.push(row.row.ledger_name.clone());
            fields.push(row.row.ledger_resolved.to_string());
            fields.push(fmt_amount(row.cgst));
            fields.push(fmt_amount(row.sgst));
            fields.push(fmt_amount(row.igst));
            fields.push(fmt_amount(row.total_tax));
            fields.push(fmt_amount(row.total_amount));
            fields.push(row.invoice_no.clone());
            fields.extend(stamp.values());
            fields
        }),
    )
}

/// Pivot and batch artifacts share one layout.
pub fn pivot_csv(rows: &[PivotRow], run_id: Uuid) -> Result<Vec<u8>, PipelineError> {
    let headers = vec![
        "gstin",
        "month",
        "gst_rate",
        "ledger_name",
        "fg",
        "buyer_state",
        "total_quantity",
        "total_taxable",
        "total_cgst",
        "total_sgst",
        "total_igst",
        "run_id",
    ];
    write_csv(
        headers,
        rows.iter().map(|row| {
            vec![
                row.gstin.as_str().to_string(),
                row.month.to_string(),
                rate_str(row.key.gst_rate),
                row.key.ledger_name.clone(),
                row.key.fg.clone(),
                row.key.buyer_state.clone().unwrap_or_default(),
                row.total_quantity.to_string(),
                fmt_amount(row.total_taxable),
                fmt_amount(row.total_cgst),
                fmt_amount(row.total_sgst),
                fmt_amount(row.total_igst),
                run_id.to_string(),
            ]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PivotKey;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn stamp_fixture() -> (Channel, Gstin, Month, Uuid) {
        (
            Channel::AmazonMtr,
            Gstin::parse("06ABGCS4796R1ZA").unwrap(),
            Month::parse("2025-08").unwrap(),
            Uuid::nil(),
        )
    }

    fn canonical_row() -> CanonicalRow {
        CanonicalRow {
            invoice_date: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            order_id: "O1".into(),
            sku: "FABCON-5L".into(),
            asin: "B09MZ2LBXB".into(),
            quantity: 2,
            taxable_value: dec!(2118),
            gst_rate: dec!(0.18),
            buyer_state: "HARYANA".into(),
            seller_state: None,
            shipping_value: Decimal::ZERO,
            returned_qty: None,
            total_qty: None,
        }
    }

    #[test]
    fn canonical_csv_layout() {
        let (channel, gstin, month, run_id) = stamp_fixture();
        let stamp = RowStamp {
            channel: &channel,
            gstin: &gstin,
            month,
            run_id,
        };
        let bytes = canonical_csv(&[canonical_row()], &stamp).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "invoice_date,order_id,sku,asin,quantity,taxable_value,gst_rate,buyer_state,\
             seller_state,shipping_value,returned_qty,total_qty,channel,gstin,month,run_id"
        );
        let data = lines.next().unwrap();
        assert!(data.starts_with("2025-08-01,O1,FABCON-5L,B09MZ2LBXB,2,2118.00,0.18,HARYANA,,0.00,,,"));
        assert!(data.ends_with("amazon_mtr,06ABGCS4796R1ZA,2025-08,00000000-0000-0000-0000-000000000000"));
        // LF endings, no CR.
        assert!(!text.contains('\r'));
    }

    #[test]
    fn hashing_is_stable() {
        let (channel, gstin, month, run_id) = stamp_fixture();
        let stamp = RowStamp {
            channel: &channel,
            gstin: &gstin,
            month,
            run_id,
        };
        let a = canonical_csv(&[canonical_row()], &stamp).unwrap();
        let b = canonical_csv(&[canonical_row()], &stamp).unwrap();
        assert_eq!(sha256_hex(&a), sha256_hex(&b));
        assert_eq!(sha256_hex(&a).len(), 64);
    }

    #[test]
    fn pivot_csv_layout() {
        let (_, gstin, month, run_id) = stamp_fixture();
        let row = PivotRow {
            gstin,
            month,
            key: PivotKey {
                gst_rate: dec!(0.18),
                ledger_name: "Amazon Haryana".into(),
                fg: "FG".into(),
                buyer_state: None,
            },
            total_quantity: 2,
            total_taxable: dec!(2118),
            total_cgst: dec!(190.62),
            total_sgst: dec!(190.62),
            total_igst: Decimal::ZERO,
        };
        let text = String::from_utf8(pivot_csv(&[row], run_id).unwrap()).unwrap();
        assert!(text.contains("0.18,Amazon Haryana,FG,,2,2118.00,190.62,190.62,0.00"));
    }
}
