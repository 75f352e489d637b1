//! GST-rate batch partitioning.
//!
//! One batch per distinct rate, deterministically named
//! `{channel}_{gstin}_{month}_{rate_pct}pct_batch.csv`. The split must
//! reconcile against the input pivot set (counts, taxable, tax, key set)
//! to within the 0.01 rounding tolerance or the stage fails.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::core::{Channel, Gstin, Month, PipelineError, PivotKey, PivotRow};

/// One per-rate partition.
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub gst_rate: Decimal,
    pub file_name: String,
    pub rows: Vec<PivotRow>,
}

impl BatchFile {
    pub fn record_count(&self) -> usize {
        self.rows.len()
    }

    pub fn total_taxable(&self) -> Decimal {
        self.rows.iter().map(|r| r.total_taxable).sum()
    }

    pub fn total_tax(&self) -> Decimal {
        self.rows.iter().map(|r| r.total_tax()).sum()
    }
}

/// Display form of a rate for file names: 0.18 → "18".
pub fn rate_pct(rate: Decimal) -> String {
    (rate * Decimal::ONE_HUNDRED).normalize().to_string()
}

/// Deterministic batch file name.
pub fn batch_file_name(
    channel: &Channel,
    gstin: &Gstin,
    month: Month,
    rate: Decimal,
) -> String {
    format!(
        "{}_{}_{}_{}pct_batch.csv",
        channel.as_str(),
        gstin.as_str(),
        month,
        rate_pct(rate)
    )
}

/// Partition pivot rows by GST rate and reconcile the result.
pub fn split_batches(
    channel: &Channel,
    gstin: &Gstin,
    month: Month,
    pivot: &[PivotRow],
) -> Result<Vec<BatchFile>, PipelineError> {
    let mut by_rate: BTreeMap<Decimal, Vec<PivotRow>> = BTreeMap::new();
    for row in pivot {
        by_rate.entry(row.key.gst_rate).or_default().push(row.clone());
    }

    let files: Vec<BatchFile> = by_rate
        .into_iter()
        .map(|(rate, rows)| BatchFile {
            gst_rate: rate,
            file_name: batch_file_name(channel, gstin, month, rate),
            rows,
        })
        .collect();

    reconcile(&files, pivot)?;
    tracing::info!(
        stage = "batch",
        batches = files.len(),
        records = pivot.len(),
        "batch split complete"
    );
    Ok(files)
}

/// Verify the split lost and invented nothing.
fn reconcile(files: &[BatchFile], pivot: &[PivotRow]) -> Result<(), PipelineError> {
    const TOLERANCE: Decimal = dec!(0.01);

    for file in files {
        if file.rows.iter().any(|r| r.key.gst_rate != file.gst_rate) {
            return Err(PipelineError::IntegrityCheckFailed(format!(
                "batch {} mixes GST rates",
                file.file_name
            )));
        }
    }

    let split_count: usize = files.iter().map(BatchFile::record_count).sum();
    if split_count != pivot.len() {
        return Err(PipelineError::IntegrityCheckFailed(format!(
            "batch record count {split_count} != pivot record count {}",
            pivot.len()
        )));
    }

    let split_taxable: Decimal = files.iter().map(BatchFile::total_taxable).sum();
    let pivot_taxable: Decimal = pivot.iter().map(|r| r.total_taxable).sum();
    if (split_taxable - pivot_taxable).abs() > TOLERANCE {
        return Err(PipelineError::IntegrityCheckFailed(format!(
            "batch taxable {split_taxable} != pivot taxable {pivot_taxable}"
        )));
    }

    let split_tax: Decimal = files.iter().map(BatchFile::total_tax).sum();
    let pivot_tax: Decimal = pivot.iter().map(|r| r.total_tax()).sum();
    if (split_tax - pivot_tax).abs() > TOLERANCE {
        return Err(PipelineError::IntegrityCheckFailed(format!(
            "batch tax {split_tax} != pivot tax {pivot_tax}"
        )));
    }

    let mut split_keys: Vec<&PivotKey> =
        files.iter().flat_map(|f| f.rows.iter()).map(|r| &r.key).collect();
    let mut pivot_keys: Vec<&PivotKey> = pivot.iter().map(|r| &r.key).collect();
    split_keys.sort();
    pivot_keys.sort();
    if split_keys != pivot_keys {
        return Err(PipelineError::IntegrityCheckFailed(
            "batch key set differs from pivot key set".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pivot_row(rate: Decimal, ledger: &str, taxable: Decimal, igst: Decimal) -> PivotRow {
        PivotRow {
            gstin: Gstin::parse("06ABGCS4796R1ZA").unwrap(),
            month: Month::parse("2025-08").unwrap(),
            key: PivotKey {
                gst_rate: rate,
                ledger_name: ledger.into(),
                fg: "Product".into(),
                buyer_state: None,
            },
            total_quantity: 1,
            total_taxable: taxable,
            total_cgst: Decimal::ZERO,
            total_sgst: Decimal::ZERO,
            total_igst: igst,
        }
    }

    #[test]
    fn splits_by_rate_with_deterministic_names() {
        let pivot = vec![
            pivot_row(dec!(0.18), "A", dec!(1000), dec!(180)),
            pivot_row(dec!(0.18), "B", dec!(500), dec!(90)),
            pivot_row(dec!(0), "C", dec!(800), dec!(0)),
            pivot_row(dec!(0.12), "D", dec!(300), dec!(36)),
        ];
        let channel = Channel::AmazonMtr;
        let gstin = Gstin::parse("06ABGCS4796R1ZA").unwrap();
        let month = Month::parse("2025-08").unwrap();
        let files = split_batches(&channel, &gstin, month, &pivot).unwrap();

        assert_eq!(files.len(), 3);
        let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "amazon_mtr_06ABGCS4796R1ZA_2025-08_0pct_batch.csv",
                "amazon_mtr_06ABGCS4796R1ZA_2025-08_12pct_batch.csv",
                "amazon_mtr_06ABGCS4796R1ZA_2025-08_18pct_batch.csv",
            ]
        );
        assert_eq!(files[2].record_count(), 2);
        assert_eq!(files[2].total_taxable(), dec!(1500));
        assert_eq!(files[2].total_tax(), dec!(270));
    }

    #[test]
    fn zero_rate_batch_has_no_tax() {
        let pivot = vec![
            pivot_row(dec!(0), "C", dec!(800), dec!(0)),
            pivot_row(dec!(0.18), "A", dec!(100), dec!(18)),
        ];
        let channel = Channel::AmazonMtr;
        let gstin = Gstin::parse("06ABGCS4796R1ZA").unwrap();
        let month = Month::parse("2025-08").unwrap();
        let files = split_batches(&channel, &gstin, month, &pivot).unwrap();
        let zero = files.iter().find(|f| f.gst_rate.is_zero()).unwrap();
        assert_eq!(zero.total_tax(), dec!(0));
        assert_eq!(zero.total_taxable(), dec!(800));
    }

    #[test]
    fn each_batch_is_single_rate() {
        let pivot = vec![
            pivot_row(dec!(0.05), "A", dec!(100), dec!(5)),
            pivot_row(dec!(0.28), "B", dec!(100), dec!(28)),
        ];
        let channel = Channel::Flipkart;
        let gstin = Gstin::parse("06ABGCS4796R1ZA").unwrap();
        let month = Month::parse("2025-08").unwrap();
        let files = split_batches(&channel, &gstin, month, &pivot).unwrap();
        for file in &files {
            assert!(file.rows.iter().all(|r| r.key.gst_rate == file.gst_rate));
        }
    }

    #[test]
    fn empty_pivot_yields_no_batches() {
        let channel = Channel::AmazonMtr;
        let gstin = Gstin::parse("06ABGCS4796R1ZA").unwrap();
        let month = Month::parse("2025-08").unwrap();
        let files = split_batches(&channel, &gstin, month, &[]).unwrap();
        assert!(files.is_empty());
    }
}
