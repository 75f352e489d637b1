use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::PipelineError;
use super::states;

/// A validated 15-character GSTIN. The first two characters encode the
/// seller's state and drive the intrastate/interstate decision.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Gstin(String);

impl Gstin {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let s = raw.trim().to_uppercase();
        if s.len() != 15 || !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(PipelineError::InvalidRequest(format!(
                "GSTIN '{raw}' must be 15 alphanumeric characters"
            )));
        }
        if states::state_name_for_code(&s[0..2]).is_none() {
            return Err(PipelineError::InvalidRequest(format!(
                "GSTIN '{raw}' has unknown state code '{}'",
                &s[0..2]
            )));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-digit state code prefix.
    pub fn state_code(&self) -> &str {
        &self.0[0..2]
    }

    /// Canonical name of the company's state (guaranteed by `parse`).
    pub fn state_name(&self) -> &'static str {
        states::state_name_for_code(self.state_code()).unwrap_or("UNKNOWN")
    }
}

impl std::fmt::Display for Gstin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Gstin {
    type Error = PipelineError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Gstin> for String {
    fn from(value: Gstin) -> Self {
        value.0
    }
}

/// A calendar month in `YYYY-MM` form. All date bucketing in the pipeline
/// is plain calendar-month arithmetic; no time zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let invalid =
            || PipelineError::InvalidRequest(format!("month '{raw}' must be YYYY-MM"));
        let (y, m) = raw.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) || !(2000..=2100).contains(&year) {
            return Err(invalid());
        }
        Ok(Self { year, month })
    }

    /// First day of the month (voucher dates use this).
    pub fn first_day(&self) -> NaiveDate {
        // Safe: month validated to 1..=12 at parse time.
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or(NaiveDate::MIN)
    }

    /// Two-digit month, e.g. "08".
    pub fn mm(&self) -> String {
        format!("{:02}", self.month)
    }

    /// Two-digit year, e.g. "25".
    pub fn yy(&self) -> String {
        format!("{:02}", self.year % 100)
    }
}

impl std::fmt::Display for Month {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl TryFrom<String> for Month {
    type Error = PipelineError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Month> for String {
    fn from(value: Month) -> Self {
        value.to_string()
    }
}

/// Sales channel, carrying the per-channel policy table.
///
/// The policies here are the channel-specific behaviors of the pivot and
/// tax stages; everything else treats channels uniformly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Channel {
    /// Amazon monthly transaction report.
    AmazonMtr,
    /// Amazon settlement report (always IGST).
    AmazonStr,
    /// Flipkart sales report (keeps buyer state in the pivot key).
    Flipkart,
    /// Pepperfry sales + returns report pair.
    Pepperfry,
    /// Unrecognized channel; processed with default policies.
    Other(String),
}

impl Channel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "amazon_mtr" => Self::AmazonMtr,
            "amazon_str" => Self::AmazonStr,
            "flipkart" => Self::Flipkart,
            "pepperfry" => Self::Pepperfry,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::AmazonMtr => "amazon_mtr",
            Self::AmazonStr => "amazon_str",
            Self::Flipkart => "flipkart",
            Self::Pepperfry => "pepperfry",
            Self::Other(s) => s,
        }
    }

    /// Invoice number prefix. Unknown channels get the first three
    /// letters of the uppercased name.
    pub fn invoice_prefix(&self) -> String {
        match self {
            Self::AmazonMtr => "AMZ".to_string(),
            Self::AmazonStr => "AMZST".to_string(),
            Self::Flipkart => "FLIP".to_string(),
            Self::Pepperfry => "PEPP".to_string(),
            Self::Other(s) => s
                .to_uppercase()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(3)
                .collect(),
        }
    }

    /// Settlement reports post IGST regardless of the buyer state.
    pub fn forces_igst(&self) -> bool {
        matches!(self, Self::AmazonStr)
    }

    /// Whether the buyer state is an additional pivot dimension.
    pub fn state_in_pivot_key(&self) -> bool {
        matches!(self, Self::Flipkart)
    }

    /// Whether zero-taxable rows are dropped from the pivot (kept in the
    /// priced artifact for audit).
    pub fn drops_zero_taxable_from_pivot(&self) -> bool {
        matches!(self, Self::AmazonMtr)
    }

    /// Whether the channel ingests a sibling returns file.
    pub fn ingests_returns(&self) -> bool {
        matches!(self, Self::Pepperfry)
    }

    /// Display name used in suggested ledger names, e.g. "Amazon HR".
    pub fn title_case(&self) -> String {
        match self {
            Self::AmazonMtr | Self::AmazonStr => "Amazon".to_string(),
            Self::Flipkart => "Flipkart".to_string(),
            Self::Pepperfry => "Pepperfry".to_string(),
            Self::Other(s) => {
                let mut chars = s.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Channel {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Channel> for String {
    fn from(value: Channel) -> Self {
        value.as_str().to_string()
    }
}

/// Report type of a raw input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    AmazonMtr,
    AmazonStr,
    Flipkart,
    Pepperfry,
    SellerInvoice,
}

impl ReportType {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        match raw.trim().to_lowercase().as_str() {
            "amazon_mtr" => Ok(Self::AmazonMtr),
            "amazon_str" => Ok(Self::AmazonStr),
            "flipkart" => Ok(Self::Flipkart),
            "pepperfry" => Ok(Self::Pepperfry),
            "seller_invoice" => Ok(Self::SellerInvoice),
            other => Err(PipelineError::InvalidRequest(format!(
                "unknown report type '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AmazonMtr => "amazon_mtr",
            Self::AmazonStr => "amazon_str",
            Self::Flipkart => "flipkart",
            Self::Pepperfry => "pepperfry",
            Self::SellerInvoice => "seller_invoice",
        }
    }

    /// Default channel for this report type.
    pub fn channel(&self) -> Channel {
        match self {
            Self::AmazonMtr => Channel::AmazonMtr,
            Self::AmazonStr => Channel::AmazonStr,
            Self::Flipkart => Channel::Flipkart,
            Self::Pepperfry => Channel::Pepperfry,
            Self::SellerInvoice => Channel::AmazonMtr,
        }
    }
}

/// Lifecycle status of a run. The terminal status is written exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Partial,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Role tag of a report artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    Raw,
    Normalized,
    Enriched,
    WithTax,
    Final,
    Pivot,
    Batch,
    Voucher,
}

impl ArtifactRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Normalized => "normalized",
            Self::Enriched => "enriched",
            Self::WithTax => "with_tax",
            Self::Final => "final",
            Self::Pivot => "pivot",
            Self::Batch => "batch",
            Self::Voucher => "voucher",
        }
    }
}

/// One normalized marketplace transaction in the canonical schema.
///
/// Refund/return rows carry negative quantity and taxable value; the
/// signs flow through tax, pivot and batch stages so aggregates net out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub invoice_date: NaiveDate,
    pub order_id: String,
    pub sku: String,
    /// Empty string when the report has no ASIN column.
    pub asin: String,
    pub quantity: i64,
    pub taxable_value: Decimal,
    /// Decimal fraction in {0, 0.05, 0.12, 0.18, 0.28}.
    pub gst_rate: Decimal,
    /// Canonical upper-case state name.
    pub buyer_state: String,
    /// Captured for settlement reports; unused elsewhere.
    pub seller_state: Option<String>,
    pub shipping_value: Decimal,
    /// Returns handling (settlement / Pepperfry only).
    pub returned_qty: Option<i64>,
    pub total_qty: Option<i64>,
}

/// Canonical row annotated with master-data lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRow {
    #[serde(flatten)]
    pub row: CanonicalRow,
    /// Finished good; empty when unresolved.
    pub fg: String,
    pub item_resolved: bool,
    /// Ledger name; empty when unresolved.
    pub ledger_name: String,
    pub ledger_resolved: bool,
}

/// Enriched row with the GST split applied and an invoice number assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedRow {
    #[serde(flatten)]
    pub row: EnrichedRow,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub total_tax: Decimal,
    pub total_amount: Decimal,
    pub invoice_no: String,
}

impl PricedRow {
    /// The CGST/SGST/IGST exclusivity invariant: exactly one of
    /// intrastate (CGST+SGST), interstate (IGST), or zero-tax holds.
    /// Refund rows satisfy it with the signs flipped.
    pub fn tax_split_is_valid(&self) -> bool {
        let zero = Decimal::ZERO;
        let intrastate = self.cgst != zero && self.sgst != zero && self.igst == zero;
        let interstate = self.igst != zero && self.cgst == zero && self.sgst == zero;
        let untaxed = self.cgst == zero && self.sgst == zero && self.igst == zero;
        intrastate ^ interstate ^ untaxed
    }
}

/// Grouping key for pivot aggregation. The `Ord` derive gives the
/// deterministic emit order: gst_rate, ledger_name, fg, buyer_state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PivotKey {
    pub gst_rate: Decimal,
    pub ledger_name: String,
    pub fg: String,
    /// Present only for channels that keep the state dimension.
    pub buyer_state: Option<String>,
}

/// One aggregated pivot row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotRow {
    pub gstin: Gstin,
    pub month: Month,
    #[serde(flatten)]
    pub key: PivotKey,
    pub total_quantity: i64,
    pub total_taxable: Decimal,
    pub total_cgst: Decimal,
    pub total_sgst: Decimal,
    pub total_igst: Decimal,
}

impl PivotRow {
    pub fn total_tax(&self) -> Decimal {
        self.total_cgst + self.total_sgst + self.total_igst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn gstin_parses_and_exposes_state() {
        let g = Gstin::parse("06ABGCS4796R1ZA").unwrap();
        assert_eq!(g.state_code(), "06");
        assert_eq!(g.state_name(), "HARYANA");
        assert_eq!(g.as_str(), "06ABGCS4796R1ZA");
    }

    #[test]
    fn gstin_rejects_bad_input() {
        assert!(Gstin::parse("short").is_err());
        assert!(Gstin::parse("99ABGCS4796R1ZA").is_err());
        assert!(Gstin::parse("06ABGCS4796R1Z!").is_err());
    }

    #[test]
    fn month_round_trip() {
        let m = Month::parse("2025-08").unwrap();
        assert_eq!(m.to_string(), "2025-08");
        assert_eq!(m.mm(), "08");
        assert_eq!(m.yy(), "25");
        assert_eq!(
            m.first_day(),
            NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()
        );
        assert!(Month::parse("2025-13").is_err());
        assert!(Month::parse("202508").is_err());
    }

    #[test]
    fn channel_policies() {
        assert!(Channel::AmazonStr.forces_igst());
        assert!(!Channel::AmazonMtr.forces_igst());
        assert!(Channel::Flipkart.state_in_pivot_key());
        assert!(Channel::AmazonMtr.drops_zero_taxable_from_pivot());
        assert!(Channel::Pepperfry.ingests_returns());
    }

    #[test]
    fn channel_prefixes() {
        assert_eq!(Channel::AmazonMtr.invoice_prefix(), "AMZ");
        assert_eq!(Channel::AmazonStr.invoice_prefix(), "AMZST");
        assert_eq!(Channel::Flipkart.invoice_prefix(), "FLIP");
        assert_eq!(Channel::Pepperfry.invoice_prefix(), "PEPP");
        assert_eq!(Channel::parse("meesho").invoice_prefix(), "MEE");
    }

    #[test]
    fn channel_parse_round_trip() {
        for raw in ["amazon_mtr", "amazon_str", "flipkart", "pepperfry", "meesho"] {
            assert_eq!(Channel::parse(raw).as_str(), raw);
        }
    }

    #[test]
    fn tax_split_invariant() {
        let mk = |cgst, sgst, igst| PricedRow {
            row: EnrichedRow {
                row: CanonicalRow {
                    invoice_date: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
                    order_id: "O1".into(),
                    sku: "S1".into(),
                    asin: String::new(),
                    quantity: 1,
                    taxable_value: dec!(100),
                    gst_rate: dec!(0.18),
                    buyer_state: "DELHI".into(),
                    seller_state: None,
                    shipping_value: Decimal::ZERO,
                    returned_qty: None,
                    total_qty: None,
                },
                fg: "FG".into(),
                item_resolved: true,
                ledger_name: "L".into(),
                ledger_resolved: true,
            },
            cgst,
            sgst,
            igst,
            total_tax: cgst + sgst + igst,
            total_amount: dec!(100) + cgst + sgst + igst,
            invoice_no: "X".into(),
        };

        assert!(mk(dec!(9), dec!(9), dec!(0)).tax_split_is_valid());
        assert!(mk(dec!(0), dec!(0), dec!(18)).tax_split_is_valid());
        assert!(mk(dec!(0), dec!(0), dec!(0)).tax_split_is_valid());
        assert!(!mk(dec!(9), dec!(9), dec!(18)).tax_split_is_valid());
        assert!(!mk(dec!(9), dec!(0), dec!(0)).tax_split_is_valid());
        // Refund rows: negative amounts still satisfy the invariant.
        assert!(mk(dec!(-9), dec!(-9), dec!(0)).tax_split_is_valid());
    }

    #[test]
    fn pivot_key_order() {
        let a = PivotKey {
            gst_rate: dec!(0.05),
            ledger_name: "B".into(),
            fg: "Z".into(),
            buyer_state: None,
        };
        let b = PivotKey {
            gst_rate: dec!(0.18),
            ledger_name: "A".into(),
            fg: "A".into(),
            buyer_state: None,
        };
        assert!(a < b, "rate sorts before ledger");
    }
}
