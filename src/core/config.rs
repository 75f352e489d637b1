use std::collections::BTreeMap;
use std::path::PathBuf;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Rounding mode for money arithmetic. Only half-away-from-zero is
/// recognized today; the enum reserves room for future modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    #[default]
    HalfUp,
}

/// Pipeline configuration. One structure, passed explicitly through the
/// run coordinator; no globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Storage root under which all artifacts live:
    /// `{bucket_prefix}/{run_id}/{role}/{filename}`.
    pub bucket_prefix: String,
    /// Fail the run when any row is left without fg/ledger mapping.
    pub strict_mapping: bool,
    /// Re-run policy: false short-circuits on a prior successful run with
    /// the same input hash, true always creates a new run.
    pub overwrite: bool,
    /// Used when the raw report is missing a rate.
    pub default_gst_rate: Decimal,
    pub rounding: Rounding,
    /// Directory containing the per-GSTIN X2Beta templates.
    pub template_registry_path: PathBuf,
    /// Per-stage timeout in seconds for external calls.
    pub timeouts: BTreeMap<String, u64>,
    /// Extra two-digit-prefix → state-name entries, consulted before the
    /// built-in table.
    pub company_state_table: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket_prefix: "bahi-artifacts".into(),
            strict_mapping: false,
            overwrite: false,
            default_gst_rate: dec!(0.18),
            rounding: Rounding::HalfUp,
            template_registry_path: PathBuf::from("templates"),
            timeouts: BTreeMap::new(),
            company_state_table: BTreeMap::new(),
        }
    }
}

impl Config {
    /// State name for a GSTIN prefix, consulting the configured overrides
    /// before the built-in table.
    pub fn state_for_code(&self, code: &str) -> Option<String> {
        if let Some(name) = self.company_state_table.get(code) {
            return Some(name.clone());
        }
        super::states::state_name_for_code(code).map(str::to_string)
    }
}

/// Builder for [`Config`].
///
/// # Example
///
/// ```
/// use bahi::core::ConfigBuilder;
///
/// let config = ConfigBuilder::new("gst-artifacts")
///     .strict_mapping(true)
///     .template_registry_path("ingestion/templates")
///     .build();
/// assert!(config.strict_mapping);
/// ```
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new(bucket_prefix: impl Into<String>) -> Self {
        Self {
            config: Config {
                bucket_prefix: bucket_prefix.into(),
                ..Default::default()
            },
        }
    }

    pub fn strict_mapping(mut self, strict: bool) -> Self {
        self.config.strict_mapping = strict;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.config.overwrite = overwrite;
        self
    }

    pub fn default_gst_rate(mut self, rate: Decimal) -> Self {
        self.config.default_gst_rate = rate;
        self
    }

    pub fn template_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.template_registry_path = path.into();
        self
    }

    pub fn timeout(mut self, stage: impl Into<String>, seconds: u64) -> Self {
        self.config.timeouts.insert(stage.into(), seconds);
        self
    }

    pub fn state_override(
        mut self,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        self.config
            .company_state_table
            .insert(code.into(), name.into());
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert!(!c.strict_mapping);
        assert!(!c.overwrite);
        assert_eq!(c.default_gst_rate, dec!(0.18));
        assert_eq!(c.rounding, Rounding::HalfUp);
    }

    #[test]
    fn state_override_wins() {
        let c = ConfigBuilder::new("b")
            .state_override("97", "TESTING TERRITORY")
            .build();
        assert_eq!(c.state_for_code("97").as_deref(), Some("TESTING TERRITORY"));
        assert_eq!(c.state_for_code("06").as_deref(), Some("HARYANA"));
        assert_eq!(c.state_for_code("99"), None);
    }
}
