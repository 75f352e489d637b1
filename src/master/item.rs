//! Item master resolution: SKU/ASIN → finished good.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::io::ItemMasterRecord;

/// Suggested mapping attached to an item approval request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSuggestion {
    pub sku: String,
    pub asin: String,
    pub suggested_fg: String,
    pub suggested_gst_rate: Decimal,
}

/// Derive the default suggestion for an unknown item: the first SKU
/// segment as the finished-good guess and the standard 18% rate.
pub fn suggest_item(sku: &str, asin: &str) -> ItemSuggestion {
    let suggested_fg = sku
        .split('-')
        .next()
        .unwrap_or("")
        .trim()
        .to_string();
    ItemSuggestion {
        sku: sku.to_string(),
        asin: asin.to_string(),
        suggested_fg,
        suggested_gst_rate: dec!(0.18),
    }
}

/// Read-only snapshot of the item master, indexed for the lookup order
/// exact (sku, asin) → exact sku → exact asin.
pub struct ItemResolver {
    by_pair: HashMap<(String, String), ItemMasterRecord>,
    by_sku: HashMap<String, ItemMasterRecord>,
    by_asin: HashMap<String, ItemMasterRecord>,
}

impl ItemResolver {
    pub fn from_snapshot(records: Vec<ItemMasterRecord>) -> Self {
        let mut by_pair = HashMap::new();
        let mut by_sku = HashMap::new();
        let mut by_asin = HashMap::new();
        for record in records {
            if !record.sku.is_empty() {
                by_sku.entry(record.sku.clone()).or_insert_with(|| record.clone());
            }
            if !record.asin.is_empty() {
                by_asin.entry(record.asin.clone()).or_insert_with(|| record.clone());
            }
            by_pair.insert((record.sku.clone(), record.asin.clone()), record);
        }
        Self {
            by_pair,
            by_sku,
            by_asin,
        }
    }

    /// Look up a row's item. Empty keys never match.
    pub fn resolve(&self, sku: &str, asin: &str) -> Option<&ItemMasterRecord> {
        if !sku.is_empty() && !asin.is_empty() {
            if let Some(record) = self.by_pair.get(&(sku.to_string(), asin.to_string())) {
                return Some(record);
            }
        }
        if !sku.is_empty() {
            if let Some(record) = self.by_sku.get(sku) {
                return Some(record);
            }
        }
        if !asin.is_empty() {
            return self.by_asin.get(asin);
        }
        None
    }
}
