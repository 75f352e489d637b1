//! Database collaborator.
//!
//! The trait mirrors the audit schema: runs, report artifacts, master
//! tables, approvals, invoice sequences and the per-stage domain records.
//! [`MemoryDatabase`] is the in-process implementation used by tests and
//! single-process deployments; a server-backed implementation satisfies
//! the same contract.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{
    ArtifactRole, Channel, Gstin, Month, PipelineError, RunStatus,
};

/// One pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub channel: Channel,
    pub gstin: Gstin,
    pub month: Month,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// SHA-256 of the raw input, for idempotent re-runs.
    pub input_hash: String,
}

/// A file produced by a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub role: ArtifactRole,
    pub file_path: String,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// SKU/ASIN → finished good mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMasterRecord {
    pub sku: String,
    pub asin: String,
    pub item_code: String,
    pub fg: String,
    pub gst_rate: Decimal,
    pub approved_by: String,
}

/// Channel + buyer state → ledger name mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerMasterRecord {
    pub channel: Channel,
    pub buyer_state: String,
    pub ledger_name: String,
    pub approved_by: String,
}

/// Approval request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    Item,
    Ledger,
}

/// Approval request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// A pending (or decided) master-data decision. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: Uuid,
    pub approval_type: ApprovalType,
    pub payload: serde_json::Value,
    pub status: ApprovalStatus,
    pub approver: Option<String>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Key of a durable invoice sequence counter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceKey {
    pub gstin: Gstin,
    pub channel: Channel,
    pub buyer_state: String,
    pub month: Month,
}

/// Persisted per-row tax split, for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxComputationRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub row_ref: String,
    pub taxable_value: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub total_tax: Decimal,
    pub total_amount: Decimal,
}

/// One allocated invoice number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRegistryRecord {
    pub invoice_no: String,
    pub run_id: Uuid,
    pub gstin: Gstin,
    pub channel: Channel,
    pub buyer_state: String,
    pub month: Month,
    pub sequence_number: u64,
    pub row_ref: String,
}

/// One aggregated pivot row, persisted for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PivotSummaryRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub gstin: Gstin,
    pub month: Month,
    pub gst_rate: Decimal,
    pub ledger_name: String,
    pub fg: String,
    pub buyer_state: Option<String>,
    pub total_quantity: i64,
    pub total_taxable: Decimal,
    pub total_cgst: Decimal,
    pub total_sgst: Decimal,
    pub total_igst: Decimal,
}

/// One GST-rate batch file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRegistryRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub channel: Channel,
    pub gstin: Gstin,
    pub month: Month,
    pub gst_rate: Decimal,
    pub file_path: String,
    pub record_count: usize,
}

/// One exported voucher workbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallyExportRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub channel: Channel,
    pub gstin: Gstin,
    pub month: Month,
    pub gst_rate: Decimal,
    pub template_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub record_count: usize,
    pub total_taxable: Decimal,
    pub total_tax: Decimal,
    pub export_status: String,
}

/// One parsed seller fee-invoice line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerInvoiceRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub channel: Channel,
    pub gstin: Gstin,
    pub vendor_invoice_no: String,
    pub invoice_date: chrono::NaiveDate,
    pub expense_type: String,
    pub taxable_value: Decimal,
    pub gst_rate: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub total_value: Decimal,
    pub ledger_name: String,
    pub source_file: String,
    pub processing_status: String,
}

/// One exported expense workbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseExportRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub channel: Channel,
    pub gstin: Gstin,
    pub month: Month,
    pub file_path: String,
    pub record_count: usize,
    pub total_taxable: Decimal,
    pub total_tax: Decimal,
    pub export_status: String,
}

/// Database contract required by the core.
///
/// Writes are atomic per record; uniqueness constraints back the global
/// invariants (invoice numbers, master keys, sequence keys). Reads used
/// by resolvers take a full-table snapshot so approvals landing mid-stage
/// only affect the next run.
pub trait Database: Send + Sync {
    fn insert_run(&self, run: &RunRecord) -> Result<(), PipelineError>;

    /// Write the terminal status. A second terminal write is rejected.
    fn finish_run(&self, run_id: Uuid, status: RunStatus) -> Result<(), PipelineError>;

    fn get_run(&self, run_id: Uuid) -> Result<Option<RunRecord>, PipelineError>;

    /// Most recent successful run with the same identity and input hash.
    fn find_successful_run(
        &self,
        gstin: &Gstin,
        channel: &Channel,
        month: Month,
        input_hash: &str,
    ) -> Result<Option<RunRecord>, PipelineError>;

    fn insert_report(&self, report: &ReportRecord) -> Result<(), PipelineError>;
    fn reports_for_run(&self, run_id: Uuid) -> Result<Vec<ReportRecord>, PipelineError>;

    fn item_master_snapshot(&self) -> Result<Vec<ItemMasterRecord>, PipelineError>;
    fn upsert_item_master(&self, record: &ItemMasterRecord) -> Result<(), PipelineError>;

    fn ledger_master_snapshot(&self) -> Result<Vec<LedgerMasterRecord>, PipelineError>;
    fn upsert_ledger_master(&self, record: &LedgerMasterRecord) -> Result<(), PipelineError>;

    fn insert_approval(&self, record: &ApprovalRecord) -> Result<(), PipelineError>;
    fn approvals(
        &self,
        status: Option<ApprovalStatus>,
        approval_type: Option<ApprovalType>,
    ) -> Result<Vec<ApprovalRecord>, PipelineError>;
    fn update_approval(&self, record: &ApprovalRecord) -> Result<(), PipelineError>;

    /// Next unallocated sequence value for a key (1 when unseen).
    fn sequence_next(&self, key: &SequenceKey) -> Result<u64, PipelineError>;

    /// Compare-and-swap the high-water mark. Returns false when
    /// `expected_next` no longer matches (another run won the race).
    fn sequence_commit(
        &self,
        key: &SequenceKey,
        expected_next: u64,
        new_next: u64,
    ) -> Result<bool, PipelineError>;

    fn insert_tax_computations(
        &self,
        records: &[TaxComputationRecord],
    ) -> Result<(), PipelineError>;

    /// Insert registry entries; duplicate invoice numbers are rejected.
    fn insert_invoice_registry(
        &self,
        records: &[InvoiceRegistryRecord],
    ) -> Result<(), PipelineError>;

    fn insert_pivot_summaries(
        &self,
        records: &[PivotSummaryRecord],
    ) -> Result<(), PipelineError>;

    fn insert_batch_registry(
        &self,
        records: &[BatchRegistryRecord],
    ) -> Result<(), PipelineError>;

    fn insert_tally_export(&self, record: &TallyExportRecord) -> Result<(), PipelineError>;

    fn insert_seller_invoices(
        &self,
        records: &[SellerInvoiceRecord],
    ) -> Result<(), PipelineError>;

    fn insert_expense_export(
        &self,
        record: &ExpenseExportRecord,
    ) -> Result<(), PipelineError>;
}

#[derive(Default)]
struct MemoryTables {
    runs: Vec<RunRecord>,
    reports: Vec<ReportRecord>,
    item_master: BTreeMap<(String, String), ItemMasterRecord>,
    ledger_master: BTreeMap<(String, String), LedgerMasterRecord>,
    approvals: Vec<ApprovalRecord>,
    sequences: BTreeMap<SequenceKey, u64>,
    tax_computations: Vec<TaxComputationRecord>,
    invoice_registry: Vec<InvoiceRegistryRecord>,
    pivot_summaries: Vec<PivotSummaryRecord>,
    batch_registry: Vec<BatchRegistryRecord>,
    tally_exports: Vec<TallyExportRecord>,
    seller_invoices: Vec<SellerInvoiceRecord>,
    expense_exports: Vec<ExpenseExportRecord>,
}

/// In-memory database with the same constraints a server enforces.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: Mutex<MemoryTables>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryTables>, PipelineError> {
        self.tables
            .lock()
            .map_err(|_| PipelineError::DatabaseUnavailable("database poisoned".into()))
    }

    /// Test helper: all tax computation rows.
    pub fn tax_computations(&self) -> Vec<TaxComputationRecord> {
        self.lock().map(|t| t.tax_computations.clone()).unwrap_or_default()
    }

    /// Test helper: all invoice registry rows.
    pub fn invoice_registry(&self) -> Vec<InvoiceRegistryRecord> {
        self.lock().map(|t| t.invoice_registry.clone()).unwrap_or_default()
    }

    /// Test helper: all tally export rows.
    pub fn tally_exports(&self) -> Vec<TallyExportRecord> {
        self.lock().map(|t| t.tally_exports.clone()).unwrap_or_default()
    }

    /// Test helper: all seller invoice rows.
    pub fn seller_invoices(&self) -> Vec<SellerInvoiceRecord> {
        self.lock().map(|t| t.seller_invoices.clone()).unwrap_or_default()
    }
}

impl Database for MemoryDatabase {
    fn insert_run(&self, run: &RunRecord) -> Result<(), PipelineError> {
        self.lock()?.runs.push(run.clone());
        Ok(())
    }

    fn finish_run(&self, run_id: Uuid, status: RunStatus) -> Result<(), PipelineError> {
        let mut tables = self.lock()?;
        let run = tables
            .runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| {
                PipelineError::DatabaseUnavailable(format!("unknown run {run_id}"))
            })?;
        if run.status.is_terminal() {
            return Err(PipelineError::DatabaseUnavailable(format!(
                "run {run_id} already has terminal status {}",
                run.status.as_str()
            )));
        }
        run.status = status;
        run.finished_at = Some(Utc::now());
        Ok(())
    }

    fn get_run(&self, run_id: Uuid) -> Result<Option<RunRecord>, PipelineError> {
        Ok(self.lock()?.runs.iter().find(|r| r.run_id == run_id).cloned())
    }

    fn find_successful_run(
        &self,
        gstin: &Gstin,
        channel: &Channel,
        month: Month,
        input_hash: &str,
    ) -> Result<Option<RunRecord>, PipelineError> {
        Ok(self
            .lock()?
            .runs
            .iter()
            .rev()
            .find(|r| {
                r.status == RunStatus::Success
                    && r.gstin == *gstin
                    && r.channel == *channel
                    && r.month == month
                    && r.input_hash == input_hash
            })
            .cloned())
    }

    fn insert_report(&self, report: &ReportRecord) -> Result<(), PipelineError> {
        self.lock()?.reports.push(report.clone());
        Ok(())
    }

    fn reports_for_run(&self, run_id: Uuid) -> Result<Vec<ReportRecord>, PipelineError> {
        Ok(self
            .lock()?
            .reports
            .iter()
            .filter(|r| r.run_id == run_id)
            .cloned()
            .collect())
    }

    fn item_master_snapshot(&self) -> Result<Vec<ItemMasterRecord>, PipelineError> {
        Ok(self.lock()?.item_master.values().cloned().collect())
    }

    fn upsert_item_master(&self, record: &ItemMasterRecord) -> Result<(), PipelineError> {
        self.lock()?
            .item_master
            .insert((record.sku.clone(), record.asin.clone()), record.clone());
        Ok(())
    }

    fn ledger_master_snapshot(&self) -> Result<Vec<LedgerMasterRecord>, PipelineError> {
        Ok(self.lock()?.ledger_master.values().cloned().collect())
    }

    fn upsert_ledger_master(&self, record: &LedgerMasterRecord) -> Result<(), PipelineError> {
        self.lock()?.ledger_master.insert(
            (
                record.channel.as_str().to_string(),
                record.buyer_state.to_uppercase(),
            ),
            record.clone(),
        );
        Ok(())
    }

    fn insert_approval(&self, record: &ApprovalRecord) -> Result<(), PipelineError> {
        self.lock()?.approvals.push(record.clone());
        Ok(())
    }

    fn approvals(
        &self,
        status: Option<ApprovalStatus>,
        approval_type: Option<ApprovalType>,
    ) -> Result<Vec<ApprovalRecord>, PipelineError> {
        Ok(self
            .lock()?
            .approvals
            .iter()
            .filter(|a| status.is_none_or(|s| a.status == s))
            .filter(|a| approval_type.is_none_or(|t| a.approval_type == t))
            .cloned()
            .collect())
    }

    fn update_approval(&self, record: &ApprovalRecord) -> Result<(), PipelineError> {
        let mut tables = self.lock()?;
        let existing = tables
            .approvals
            .iter_mut()
            .find(|a| a.id == record.id)
            .ok_or_else(|| {
                PipelineError::DatabaseUnavailable(format!("unknown approval {}", record.id))
            })?;
        *existing = record.clone();
        Ok(())
    }

    fn sequence_next(&self, key: &SequenceKey) -> Result<u64, PipelineError> {
        Ok(*self.lock()?.sequences.get(key).unwrap_or(&1))
    }

    fn sequence_commit(
        &self,
        key: &SequenceKey,
        expected_next: u64,
        new_next: u64,
    ) -> Result<bool, PipelineError> {
        let mut tables = self.lock()?;
        let current = *tables.sequences.get(key).unwrap_or(&1);
        if current != expected_next {
            return Ok(false);
        }
        tables.sequences.insert(key.clone(), new_next);
        Ok(true)
    }

    fn insert_tax_computations(
        &self,
        records: &[TaxComputationRecord],
    ) -> Result<(), PipelineError> {
        self.lock()?.tax_computations.extend_from_slice(records);
        Ok(())
    }

    fn insert_invoice_registry(
        &self,
        records: &[InvoiceRegistryRecord],
    ) -> Result<(), PipelineError> {
        let mut tables = self.lock()?;
        for record in records {
            if tables
                .invoice_registry
                .iter()
                .any(|r| r.invoice_no == record.invoice_no)
            {
                return Err(PipelineError::DatabaseUnavailable(format!(
                    "duplicate invoice number {}",
                    record.invoice_no
                )));
            }
            tables.invoice_registry.push(record.clone());
        }
        Ok(())
    }

    fn insert_pivot_summaries(
        &self,
        records: &[PivotSummaryRecord],
    ) -> Result<(), PipelineError> {
        self.lock()?.pivot_summaries.extend_from_slice(records);
        Ok(())
    }

    fn insert_batch_registry(
        &self,
        records: &[BatchRegistryRecord],
    ) -> Result<(), PipelineError> {
        self.lock()?.batch_registry.extend_from_slice(records);
        Ok(())
    }

    fn insert_tally_export(&self, record: &TallyExportRecord) -> Result<(), PipelineError> {
        self.lock()?.tally_exports.push(record.clone());
        Ok(())
    }

    fn insert_seller_invoices(
        &self,
        records: &[SellerInvoiceRecord],
    ) -> Result<(), PipelineError> {
        self.lock()?.seller_invoices.extend_from_slice(records);
        Ok(())
    }

    fn insert_expense_export(
        &self,
        record: &ExpenseExportRecord,
    ) -> Result<(), PipelineError> {
        self.lock()?.expense_exports.push(record.clone());
        Ok(())
    }
}
