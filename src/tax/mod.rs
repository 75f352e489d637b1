//! GST split rule engine.
//!
//! Pure functions: given a taxable base, a rate and the buyer state, the
//! engine produces the CGST/SGST/IGST split. Intrastate supplies (buyer
//! state equals the state encoded in the company GSTIN) split the tax
//! evenly between CGST and SGST; interstate supplies post IGST; channels
//! that settle centrally (the settlement report) force IGST regardless.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::money::round2;
use crate::core::{Config, Gstin, PipelineError};

/// GST rates recognized in raw reports.
pub const SUPPORTED_RATES: &[Decimal] = &[
    Decimal::ZERO,
    Decimal::from_parts(5, 0, 0, false, 2),  // 0.05
    Decimal::from_parts(12, 0, 0, false, 2), // 0.12
    Decimal::from_parts(18, 0, 0, false, 2), // 0.18
    Decimal::from_parts(28, 0, 0, false, 2), // 0.28
];

/// Whether `rate` is one of the recognized GST slabs.
pub fn is_supported_rate(rate: Decimal) -> bool {
    SUPPORTED_RATES.iter().any(|r| *r == rate)
}

/// Input to a single split computation.
#[derive(Debug, Clone)]
pub struct TaxInput {
    pub taxable_value: Decimal,
    pub shipping_value: Decimal,
    pub gst_rate: Decimal,
    /// Canonical upper-case buyer state name.
    pub buyer_state: String,
    /// Channel policy: settlement reports post IGST even intrastate.
    pub force_igst: bool,
    /// Returns adjustment (settlement / Pepperfry).
    pub returned_qty: Option<i64>,
    pub total_qty: Option<i64>,
}

impl TaxInput {
    pub fn new(
        taxable_value: Decimal,
        gst_rate: Decimal,
        buyer_state: impl Into<String>,
    ) -> Self {
        Self {
            taxable_value,
            shipping_value: Decimal::ZERO,
            gst_rate,
            buyer_state: buyer_state.into(),
            force_igst: false,
            returned_qty: None,
            total_qty: None,
        }
    }
}

/// Result of a split computation. `taxable_value` is the returns-adjusted
/// value actually taxed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxSplit {
    pub taxable_value: Decimal,
    pub shipping_value: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub gst_rate: Decimal,
    pub total_tax: Decimal,
    pub total_amount: Decimal,
    /// Net quantity after returns, when a returns adjustment applied.
    pub net_qty: Option<i64>,
}

/// The split engine for one company GSTIN.
#[derive(Debug, Clone)]
pub struct TaxRules {
    company_state: String,
}

impl TaxRules {
    /// Build the engine for a company GSTIN. The configured state table
    /// overrides are consulted first.
    pub fn new(gstin: &Gstin, config: &Config) -> Self {
        let company_state = config
            .state_for_code(gstin.state_code())
            .unwrap_or_else(|| gstin.state_name().to_string());
        Self { company_state }
    }

    /// Canonical name of the company's state.
    pub fn company_state(&self) -> &str {
        &self.company_state
    }

    /// Whether a supply to `buyer_state` is intrastate.
    pub fn is_intrastate(&self, buyer_state: &str) -> bool {
        buyer_state.trim().to_uppercase() == self.company_state
    }

    /// Compute the GST split for one row.
    ///
    /// Applied twice to the same input this yields identical output; the
    /// engine holds no mutable state.
    pub fn split(&self, input: &TaxInput) -> Result<TaxSplit, PipelineError> {
        if !is_supported_rate(input.gst_rate) {
            return Err(PipelineError::TaxSplitInvariant(format!(
                "unsupported GST rate {}",
                input.gst_rate
            )));
        }

        // Returns adjustment: tax the un-returned fraction only.
        let (taxable, net_qty) = match (input.returned_qty, input.total_qty) {
            (Some(returned), Some(total)) if total > 0 && returned > 0 => {
                let net = total - returned;
                let adjusted = round2(
                    input.taxable_value * Decimal::from(net) / Decimal::from(total),
                );
                (adjusted, Some(net))
            }
            _ => (round2(input.taxable_value), None),
        };

        let base = taxable + input.shipping_value;
        let rate = input.gst_rate;

        let (cgst, sgst, igst) = if rate.is_zero() {
            (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO)
        } else if input.force_igst || !self.is_intrastate(&input.buyer_state) {
            (Decimal::ZERO, Decimal::ZERO, round2(base * rate))
        } else {
            let half = round2(base * rate / Decimal::TWO);
            (half, half, Decimal::ZERO)
        };

        let total_tax = cgst + sgst + igst;
        Ok(TaxSplit {
            taxable_value: taxable,
            shipping_value: input.shipping_value,
            cgst,
            sgst,
            igst,
            gst_rate: rate,
            total_tax,
            total_amount: base + total_tax,
            net_qty,
        })
    }
}

/// Per-run tax rollup surfaced on the run summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaxSummary {
    pub total_records: usize,
    pub total_taxable: Decimal,
    pub total_cgst: Decimal,
    pub total_sgst: Decimal,
    pub total_igst: Decimal,
    pub total_tax: Decimal,
    pub total_amount: Decimal,
    pub intrastate_records: usize,
    pub interstate_records: usize,
}

/// Roll priced rows up into a [`TaxSummary`].
pub fn summarize_tax(rows: &[crate::core::PricedRow]) -> TaxSummary {
    let mut summary = TaxSummary {
        total_records: rows.len(),
        ..Default::default()
    };
    for row in rows {
        summary.total_taxable += row.row.row.taxable_value;
        summary.total_cgst += row.cgst;
        summary.total_sgst += row.sgst;
        summary.total_igst += row.igst;
        summary.total_tax += row.total_tax;
        summary.total_amount += row.total_amount;
        if !row.cgst.is_zero() || !row.sgst.is_zero() {
            summary.intrastate_records += 1;
        } else if !row.igst.is_zero() {
            summary.interstate_records += 1;
        }
    }
    summary
}
