//! Normalizer agents: one per report type, each reading a raw table and
//! emitting canonical transaction rows.
//!
//! Row-level parse failures are recovered: the row is dropped, an
//! exception is recorded and the stage continues (it may end `partial`).
//! Missing columns and empty inputs are fatal for the stage.

mod amazon_mtr;
mod amazon_str;
pub mod clean;
mod flipkart;
mod pepperfry;

pub use amazon_mtr::AmazonMtrNormalizer;
pub use amazon_str::AmazonStrNormalizer;
pub use flipkart::FlipkartNormalizer;
pub use pepperfry::PepperfryNormalizer;

use crate::core::{
    CanonicalRow, Channel, Config, Gstin, Month, PipelineError, ReportType, RowException,
};
use crate::io::RawTable;

/// Run header values every normalizer needs.
pub struct NormalizeContext<'a> {
    pub config: &'a Config,
    pub channel: Channel,
    pub gstin: Gstin,
    pub month: Month,
}

/// Output of a normalizer: ordered canonical rows plus recovered
/// exceptions.
#[derive(Debug, Default)]
pub struct NormalizedReport {
    pub rows: Vec<CanonicalRow>,
    pub exceptions: Vec<RowException>,
}

/// A channel-specific report reader.
pub trait Normalizer {
    fn report_type(&self) -> ReportType;

    fn normalize(
        &self,
        table: &RawTable,
        ctx: &NormalizeContext<'_>,
    ) -> Result<NormalizedReport, PipelineError>;
}

/// Fail with `EmptyInput` when nothing survived normalization.
pub(crate) fn reject_empty(
    report: NormalizedReport,
    report_type: ReportType,
) -> Result<NormalizedReport, PipelineError> {
    if report.rows.is_empty() {
        Err(PipelineError::EmptyInput(format!(
            "{} report produced no canonical rows",
            report_type.as_str()
        )))
    } else {
        Ok(report)
    }
}
