//! Expense rule engine: keyword classification of fee descriptions and
//! per-channel ledger/rate defaults.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::core::Channel;

/// Fallback type for descriptions no keyword matches.
pub const DEFAULT_EXPENSE_TYPE: &str = "Other Fee";

/// Keyword → expense type, first match wins.
const KEYWORDS: &[(&str, &str)] = &[
    ("closing", "Closing Fee"),
    ("shipping", "Shipping Fee"),
    ("delivery", "Shipping Fee"),
    ("commission", "Commission"),
    ("fulfillment", "Fulfillment Fee"),
    ("fulfilment", "Fulfillment Fee"),
    ("fba", "Fulfillment Fee"),
    ("storage", "Storage Fee"),
    ("warehouse", "Storage Fee"),
    ("advertising", "Advertising Fee"),
    ("promotion", "Advertising Fee"),
    ("refund admin", "Refund Administration Fee"),
    ("technology", "Technology Fee"),
];

/// Ledger mapping and defaults for one expense type.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseRule {
    pub expense_type: String,
    pub ledger_name: String,
    pub default_gst_rate: Decimal,
    /// Marketplace fees carry input GST the company can claim.
    pub input_gst: bool,
}

/// Classify a fee description into an expense type.
pub fn classify_expense(description: &str) -> &'static str {
    let lowered = description.to_lowercase();
    for (keyword, expense_type) in KEYWORDS {
        if lowered.contains(keyword) {
            return expense_type;
        }
    }
    DEFAULT_EXPENSE_TYPE
}

/// Rule for a channel + expense type. The ledger name composes the
/// channel display name with the expense type, e.g. "Amazon Closing Fee".
pub fn expense_rule(channel: &Channel, expense_type: &str) -> ExpenseRule {
    ExpenseRule {
        expense_type: expense_type.to_string(),
        ledger_name: format!("{} {}", channel.title_case(), expense_type),
        default_gst_rate: dec!(0.18),
        input_gst: true,
    }
}

/// Vendor-payable ledger for a channel, credited with the voucher total.
pub fn payable_ledger(channel: &Channel) -> String {
    format!("{} Payable", channel.title_case())
}

/// Input-GST ledger names for a rate, e.g. "Input IGST @ 18%".
pub fn input_gst_ledger(component: &str, rate: Decimal) -> String {
    format!(
        "Input {} @ {}%",
        component,
        (rate * Decimal::ONE_HUNDRED).normalize()
    )
}
