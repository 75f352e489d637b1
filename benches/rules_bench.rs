use chrono::NaiveDate;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use bahi::core::{CanonicalRow, Channel, Config, EnrichedRow, Gstin, Month, PricedRow};
use bahi::pivot::pivot_rows;
use bahi::tax::{TaxInput, TaxRules};

fn gstin() -> Gstin {
    Gstin::parse("06ABGCS4796R1ZA").unwrap()
}

fn build_priced_rows(count: usize) -> Vec<PricedRow> {
    let rules = TaxRules::new(&gstin(), &Config::default());
    let states = ["HARYANA", "DELHI", "KARNATAKA", "ANDHRA PRADESH"];
    (0..count)
        .map(|i| {
            let state = states[i % states.len()];
            let taxable = Decimal::new(100_00 + (i as i64 % 97) * 13, 2);
            let split = rules
                .split(&TaxInput::new(taxable, dec!(0.18), state))
                .unwrap();
            PricedRow {
                row: EnrichedRow {
                    row: CanonicalRow {
                        invoice_date: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
                        order_id: format!("O{i}"),
                        sku: "FABCON-5L".into(),
                        asin: String::new(),
                        quantity: 1 + (i as i64 % 3),
                        taxable_value: taxable,
                        gst_rate: dec!(0.18),
                        buyer_state: state.to_string(),
                        seller_state: None,
                        shipping_value: Decimal::ZERO,
                        returned_qty: None,
                        total_qty: None,
                    },
                    fg: format!("Product {}", i % 7),
                    item_resolved: true,
                    ledger_name: format!("Amazon {state}"),
                    ledger_resolved: true,
                },
                cgst: split.cgst,
                sgst: split.sgst,
                igst: split.igst,
                total_tax: split.total_tax,
                total_amount: split.total_amount,
                invoice_no: format!("AMZ-XX-08-{:04}", i + 1),
            }
        })
        .collect()
}

fn bench_tax_split(c: &mut Criterion) {
    let rules = TaxRules::new(&gstin(), &Config::default());
    c.bench_function("tax_split_intrastate", |b| {
        b.iter(|| {
            let input = TaxInput::new(black_box(dec!(2118.00)), dec!(0.18), "HARYANA");
            rules.split(&input).unwrap()
        })
    });
    c.bench_function("tax_split_interstate", |b| {
        b.iter(|| {
            let input = TaxInput::new(black_box(dec!(1059.00)), dec!(0.18), "DELHI");
            rules.split(&input).unwrap()
        })
    });
}

fn bench_pivot(c: &mut Criterion) {
    let rows = build_priced_rows(1000);
    let month = Month::parse("2025-08").unwrap();
    c.bench_function("pivot_1000_rows", |b| {
        b.iter(|| pivot_rows(&Channel::AmazonMtr, &gstin(), month, black_box(&rows)))
    });
}

criterion_group!(benches, bench_tax_split, bench_pivot);
criterion_main!(benches);
