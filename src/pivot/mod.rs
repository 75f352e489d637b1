//! Pivot aggregation.
//!
//! Priced rows are grouped by the channel's pivot dimensions and summed.
//! Channel policies applied before aggregation: the MTR channel drops
//! zero-taxable rows from the pivot (they stay in the priced artifact for
//! audit), the settlement channel re-asserts IGST-only, and Flipkart
//! keeps the buyer state as an extra dimension. Output order is fixed:
//! gst_rate, ledger_name, fg, buyer_state ascending.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{Channel, Gstin, Month, PivotKey, PivotRow, PricedRow};

/// Per-rate slice of the pivot summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateBreakdown {
    pub records: usize,
    pub taxable: Decimal,
    pub tax: Decimal,
}

/// MIS-style rollup of a pivot set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PivotSummary {
    pub total_records: usize,
    pub total_taxable_amount: Decimal,
    pub total_tax_amount: Decimal,
    pub unique_ledgers: usize,
    pub unique_fgs: usize,
    /// Keyed by display rate, e.g. "18%".
    pub rate_breakdown: BTreeMap<String, RateBreakdown>,
}

/// Output of the pivot stage.
#[derive(Debug, Default)]
pub struct PivotReport {
    pub rows: Vec<PivotRow>,
    /// Zero-taxable rows excluded by channel policy.
    pub dropped_zero_taxable: usize,
    pub summary: PivotSummary,
}

/// Aggregate priced rows into pivot rows for one run.
pub fn pivot_rows(
    channel: &Channel,
    gstin: &Gstin,
    month: Month,
    priced: &[PricedRow],
) -> PivotReport {
    let mut groups: BTreeMap<PivotKey, (i64, Decimal, Decimal, Decimal, Decimal)> =
        BTreeMap::new();
    let mut dropped = 0usize;

    for row in priced {
        if channel.drops_zero_taxable_from_pivot() && row.row.row.taxable_value.is_zero() {
            dropped += 1;
            continue;
        }

        // Settlement safety net: everything posts as IGST.
        let (cgst, sgst, igst) = if channel.forces_igst() {
            (Decimal::ZERO, Decimal::ZERO, row.cgst + row.sgst + row.igst)
        } else {
            (row.cgst, row.sgst, row.igst)
        };

        let key = PivotKey {
            gst_rate: row.row.row.gst_rate,
            ledger_name: row.row.ledger_name.clone(),
            fg: row.row.fg.clone(),
            buyer_state: channel
                .state_in_pivot_key()
                .then(|| row.row.row.buyer_state.clone()),
        };

        let entry = groups.entry(key).or_default();
        entry.0 += row.row.row.quantity;
        entry.1 += row.row.row.taxable_value;
        entry.2 += cgst;
        entry.3 += sgst;
        entry.4 += igst;
    }

    let rows: Vec<PivotRow> = groups
        .into_iter()
        .map(
            |(key, (quantity, taxable, cgst, sgst, igst))| PivotRow {
                gstin: gstin.clone(),
                month,
                key,
                total_quantity: quantity,
                total_taxable: taxable,
                total_cgst: cgst,
                total_sgst: sgst,
                total_igst: igst,
            },
        )
        .collect();

    let summary = summarize(&rows);
    tracing::info!(
        stage = "pivot",
        input_rows = priced.len(),
        pivot_rows = rows.len(),
        dropped_zero_taxable = dropped,
        "pivot aggregation complete"
    );

    PivotReport {
        rows,
        dropped_zero_taxable: dropped,
        summary,
    }
}

/// Roll a pivot set up into its MIS summary.
pub fn summarize(rows: &[PivotRow]) -> PivotSummary {
    let mut summary = PivotSummary {
        total_records: rows.len(),
        ..Default::default()
    };
    let mut ledgers = BTreeSet::new();
    let mut fgs = BTreeSet::new();

    for row in rows {
        summary.total_taxable_amount += row.total_taxable;
        summary.total_tax_amount += row.total_tax();
        ledgers.insert(row.key.ledger_name.clone());
        fgs.insert(row.key.fg.clone());

        let label = format!("{}%", (row.key.gst_rate * Decimal::ONE_HUNDRED).normalize());
        let slice = summary.rate_breakdown.entry(label).or_default();
        slice.records += 1;
        slice.taxable += row.total_taxable;
        slice.tax += row.total_tax();
    }

    summary.unique_ledgers = ledgers.len();
    summary.unique_fgs = fgs.len();
    summary
}
