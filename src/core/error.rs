use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while running the pipeline.
///
/// Each variant corresponds to one kind in the error taxonomy; transient
/// kinds (`StorageUnavailable`, `DatabaseUnavailable`,
/// `InvoiceSequenceConflict`) are retried with backoff before they become
/// fatal for the run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PipelineError {
    /// A required column is missing or the header is unreadable.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// No data rows remained after the header.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// fg or ledger missing after the resolver stage under strict mapping.
    #[error("unresolved master data: {0}")]
    UnresolvedMasterData(String),

    /// A priced row failed the CGST/SGST/IGST exclusivity invariant.
    #[error("tax split invariant violated: {0}")]
    TaxSplitInvariant(String),

    /// The sequence allocator lost a compare-and-swap race.
    #[error("invoice sequence conflict: {0}")]
    InvoiceSequenceConflict(String),

    /// A voucher template is missing or its header row is malformed.
    #[error("template invalid: {0}")]
    TemplateInvalid(String),

    /// Object-store call failed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Database call failed.
    #[error("database unavailable: {0}")]
    DatabaseUnavailable(String),

    /// Batch reconciliation against the pivot totals failed.
    #[error("integrity check failed: {0}")]
    IntegrityCheckFailed(String),

    /// Cooperative cancellation observed at a stage boundary.
    #[error("run cancelled at stage {0}")]
    Cancelled(String),

    /// The run request itself is malformed (bad GSTIN, month, path).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl PipelineError {
    /// Taxonomy kind of this error, for run summaries.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            Self::EmptyInput(_) => ErrorKind::EmptyInput,
            Self::UnresolvedMasterData(_) => ErrorKind::UnresolvedMasterData,
            Self::TaxSplitInvariant(_) => ErrorKind::TaxSplitInvariant,
            Self::InvoiceSequenceConflict(_) => ErrorKind::InvoiceSequenceConflict,
            Self::TemplateInvalid(_) => ErrorKind::TemplateInvalid,
            Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            Self::DatabaseUnavailable(_) => ErrorKind::DatabaseUnavailable,
            Self::IntegrityCheckFailed(_) => ErrorKind::IntegrityCheckFailed,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Whether the error is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_)
                | Self::DatabaseUnavailable(_)
                | Self::InvoiceSequenceConflict(_)
        )
    }
}

/// Error taxonomy kinds, as reported in run summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    SchemaMismatch,
    UnparseableRow,
    EmptyInput,
    UnresolvedMasterData,
    TaxSplitInvariant,
    InvoiceSequenceConflict,
    TemplateInvalid,
    StorageUnavailable,
    DatabaseUnavailable,
    IntegrityCheckFailed,
    Cancelled,
    InvalidRequest,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaMismatch => "schema_mismatch",
            Self::UnparseableRow => "unparseable_row",
            Self::EmptyInput => "empty_input",
            Self::UnresolvedMasterData => "unresolved_master_data",
            Self::TaxSplitInvariant => "tax_split_invariant",
            Self::InvoiceSequenceConflict => "invoice_sequence_conflict",
            Self::TemplateInvalid => "template_invalid",
            Self::StorageUnavailable => "storage_unavailable",
            Self::DatabaseUnavailable => "database_unavailable",
            Self::IntegrityCheckFailed => "integrity_check_failed",
            Self::Cancelled => "cancelled",
            Self::InvalidRequest => "invalid_request",
        }
    }
}

/// A single recovered row-level failure.
///
/// Unparseable rows are dropped from the stage output, recorded as
/// exceptions and surfaced in the run summary; they never abort the stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowException {
    /// Zero-based data row index in the source file (header excluded).
    pub row: usize,
    /// Taxonomy kind (normally `UnparseableRow` or `UnresolvedMasterData`).
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl std::fmt::Display for RowException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}: [{}] {}", self.row, self.kind.as_str(), self.message)
    }
}

impl RowException {
    pub fn unparseable(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            kind: ErrorKind::UnparseableRow,
            message: message.into(),
        }
    }

    pub fn unresolved(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            kind: ErrorKind::UnresolvedMasterData,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds() {
        assert!(PipelineError::StorageUnavailable("x".into()).is_transient());
        assert!(PipelineError::DatabaseUnavailable("x".into()).is_transient());
        assert!(PipelineError::InvoiceSequenceConflict("x".into()).is_transient());
        assert!(!PipelineError::SchemaMismatch("x".into()).is_transient());
        assert!(!PipelineError::TemplateInvalid("x".into()).is_transient());
    }

    #[test]
    fn exception_display() {
        let e = RowException::unparseable(4, "bad date 'foo'");
        assert_eq!(e.to_string(), "row 4: [unparseable_row] bad date 'foo'");
    }
}
