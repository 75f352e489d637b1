//! Property-based tests for the quantified pipeline invariants.

use bahi::batch::split_batches;
use bahi::core::{
    CanonicalRow, Channel, Config, EnrichedRow, Gstin, Month, PricedRow,
};
use bahi::pivot::pivot_rows;
use bahi::tax::{TaxInput, TaxRules, is_supported_rate};
use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn gstin() -> Gstin {
    Gstin::parse("06ABGCS4796R1ZA").unwrap()
}

fn month() -> Month {
    Month::parse("2025-08").unwrap()
}

fn rules() -> TaxRules {
    TaxRules::new(&gstin(), &Config::default())
}

// ── Strategies ──────────────────────────────────────────────────────────

/// Amounts from 0.00 to 99999.99 in paise.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (0u64..10_000_000u64).prop_map(|paise| Decimal::new(paise as i64, 2))
}

fn arb_rate() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        Just(dec!(0)),
        Just(dec!(0.05)),
        Just(dec!(0.12)),
        Just(dec!(0.18)),
        Just(dec!(0.28)),
    ]
}

fn arb_state() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("HARYANA"),
        Just("DELHI"),
        Just("KARNATAKA"),
        Just("ANDHRA PRADESH"),
        Just("MAHARASHTRA"),
    ]
}

fn arb_ledger() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("Amazon Haryana"),
        Just("Amazon Delhi"),
        Just("Amazon South"),
    ]
}

fn priced_row(
    taxable: Decimal,
    rate: Decimal,
    state: &str,
    ledger: &str,
    fg: &str,
    quantity: i64,
) -> PricedRow {
    let split = rules()
        .split(&TaxInput::new(taxable, rate, state))
        .unwrap();
    PricedRow {
        row: EnrichedRow {
            row: CanonicalRow {
                invoice_date: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
                order_id: "O".into(),
                sku: "SKU-1".into(),
                asin: String::new(),
                quantity,
                taxable_value: taxable,
                gst_rate: rate,
                buyer_state: state.to_string(),
                seller_state: None,
                shipping_value: Decimal::ZERO,
                returned_qty: None,
                total_qty: None,
            },
            fg: fg.to_string(),
            item_resolved: true,
            ledger_name: ledger.to_string(),
            ledger_resolved: true,
        },
        cgst: split.cgst,
        sgst: split.sgst,
        igst: split.igst,
        total_tax: split.total_tax,
        total_amount: split.total_amount,
        invoice_no: "X".into(),
    }
}

proptest! {
    /// Exactly one of intrastate / interstate / untaxed holds for every
    /// split the engine produces.
    #[test]
    fn split_exclusivity(
        taxable in arb_amount(),
        shipping in arb_amount(),
        rate in arb_rate(),
        state in arb_state(),
        force_igst in any::<bool>(),
    ) {
        let mut input = TaxInput::new(taxable, rate, state);
        input.shipping_value = shipping;
        input.force_igst = force_igst;
        let split = rules().split(&input).unwrap();

        let zero = Decimal::ZERO;
        let intrastate = split.cgst > zero && split.sgst > zero && split.igst == zero;
        let interstate = split.igst > zero && split.cgst == zero && split.sgst == zero;
        let untaxed = split.cgst == zero && split.sgst == zero && split.igst == zero;
        prop_assert_eq!(
            [intrastate, interstate, untaxed].iter().filter(|b| **b).count(),
            1
        );
    }

    /// The engine is a pure function.
    #[test]
    fn split_purity(
        taxable in arb_amount(),
        rate in arb_rate(),
        state in arb_state(),
    ) {
        let input = TaxInput::new(taxable, rate, state);
        let engine = rules();
        prop_assert_eq!(engine.split(&input).unwrap(), engine.split(&input).unwrap());
    }

    /// total_tax and total_amount stay arithmetically consistent.
    #[test]
    fn split_totals_consistent(
        taxable in arb_amount(),
        shipping in arb_amount(),
        rate in arb_rate(),
        state in arb_state(),
    ) {
        let mut input = TaxInput::new(taxable, rate, state);
        input.shipping_value = shipping;
        let split = rules().split(&input).unwrap();
        prop_assert_eq!(split.total_tax, split.cgst + split.sgst + split.igst);
        prop_assert_eq!(
            split.total_amount,
            split.taxable_value + split.shipping_value + split.total_tax
        );
        prop_assert!(is_supported_rate(split.gst_rate));
    }

    /// Company-state buyers always take the CGST+SGST path unless the
    /// channel forces IGST.
    #[test]
    fn intrastate_never_igst(taxable in arb_amount()) {
        let split = rules()
            .split(&TaxInput::new(taxable, dec!(0.18), "HARYANA"))
            .unwrap();
        prop_assert_eq!(split.igst, Decimal::ZERO);
        prop_assert_eq!(split.cgst, split.sgst);
    }

    /// Pivot aggregation and batch splitting lose no taxable value, and
    /// every batch holds exactly one rate.
    #[test]
    fn pivot_and_batch_conserve_totals(
        rows in prop::collection::vec(
            (arb_amount(), arb_rate(), arb_state(), arb_ledger(), 1i64..20),
            1..40,
        ),
    ) {
        let priced: Vec<PricedRow> = rows
            .iter()
            .map(|(taxable, rate, state, ledger, qty)| {
                priced_row(*taxable, *rate, state, ledger, "FG", *qty)
            })
            .collect();

        // Flipkart keeps the state dimension and drops nothing.
        let channel = Channel::Flipkart;
        let report = pivot_rows(&channel, &gstin(), month(), &priced);

        let priced_taxable: Decimal = priced.iter().map(|r| r.row.row.taxable_value).sum();
        let pivot_taxable: Decimal = report.rows.iter().map(|r| r.total_taxable).sum();
        prop_assert!((priced_taxable - pivot_taxable).abs() <= dec!(0.01));

        let batches = split_batches(&channel, &gstin(), month(), &report.rows).unwrap();
        let batch_taxable: Decimal = batches
            .iter()
            .flat_map(|b| b.rows.iter())
            .map(|r| r.total_taxable)
            .sum();
        prop_assert!((priced_taxable - batch_taxable).abs() <= dec!(0.01));

        for batch in &batches {
            let rates: std::collections::BTreeSet<Decimal> =
                batch.rows.iter().map(|r| r.key.gst_rate).collect();
            prop_assert_eq!(rates.len(), 1);
        }
    }

    /// Pivot output order is deterministic: sorted by rate, ledger, fg,
    /// state.
    #[test]
    fn pivot_order_deterministic(
        rows in prop::collection::vec(
            (arb_amount(), arb_rate(), arb_state(), arb_ledger(), 1i64..5),
            1..25,
        ),
    ) {
        let priced: Vec<PricedRow> = rows
            .iter()
            .map(|(taxable, rate, state, ledger, qty)| {
                priced_row(*taxable, *rate, state, ledger, "FG", *qty)
            })
            .collect();
        let report = pivot_rows(&Channel::Flipkart, &gstin(), month(), &priced);
        for window in report.rows.windows(2) {
            prop_assert!(window[0].key <= window[1].key);
        }
    }
}
