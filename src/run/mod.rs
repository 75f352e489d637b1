//! Run coordinator: opens the run, drives the stages in order, records
//! every artifact and domain record, and writes the terminal status
//! exactly once.
//!
//! Stages within a run are strictly sequential; cancellation is observed
//! at stage boundaries only. A failed stage leaves earlier artifacts in
//! place for inspection — no cleanup on failure.

mod artifacts;
mod retry;

pub use artifacts::{RowStamp, canonical_csv, enriched_csv, pivot_csv, priced_csv, sha256_hex};
pub use retry::{DEFAULT_ATTEMPTS, with_retries};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::batch::{BatchFile, split_batches};
use crate::core::{
    ArtifactRole, Channel, Config, ErrorKind, Gstin, Month, PipelineError, PricedRow,
    ReportType, RowException, RunStatus,
};
use crate::expense::{
    ExpenseMappingSummary, MappedExpense, map_line_items, parse_invoice_table,
    parse_invoice_text, summarize_expenses,
};
use crate::io::{
    BatchRegistryRecord, Database, ExpenseExportRecord, InvoiceRegistryRecord, ObjectStore,
    PdfTextExtractor, PivotSummaryRecord, RawTable, ReportRecord, RunRecord, SellerInvoiceRecord,
    SequenceKey, TallyExportRecord, TaxComputationRecord, WorkbookStore, sheet_to_csv,
};
use crate::master::resolve_rows;
use crate::normalize::{
    AmazonMtrNormalizer, AmazonStrNormalizer, FlipkartNormalizer, NormalizeContext,
    NormalizedReport, Normalizer, PepperfryNormalizer,
};
use crate::numbering::{InvoiceAllocator, invoice_number};
use crate::pivot::{PivotSummary, pivot_rows};
use crate::tax::{TaxInput, TaxRules, TaxSummary, summarize_tax};
use crate::voucher::{
    TemplateKind, TemplateRegistry, assemble_expense_workbook, assemble_sales_workbook,
    expense_workbook_name, sales_workbook_name,
};

/// Cooperative cancellation flag, observed between stages.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The external collaborators a run needs.
pub struct Dependencies<'a> {
    pub db: &'a dyn Database,
    pub store: &'a dyn ObjectStore,
    pub workbooks: &'a dyn WorkbookStore,
    pub pdf: &'a dyn PdfTextExtractor,
    pub cancel: Option<CancelToken>,
}

/// One pipeline invocation request.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub channel: Channel,
    pub gstin: Gstin,
    pub month: Month,
    pub report_type: ReportType,
    pub input_path: PathBuf,
    /// Sibling returns file (Pepperfry).
    pub returns_path: Option<PathBuf>,
    /// ASIN→SKU side map (settlement reports).
    pub asin_to_sku: BTreeMap<String, String>,
    /// Opaque approver identity recorded on master-data writes.
    pub approver_identity: Option<String>,
}

impl RunRequest {
    pub fn new(
        report_type: ReportType,
        gstin: Gstin,
        month: Month,
        input_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            channel: report_type.channel(),
            gstin,
            month,
            report_type,
            input_path: input_path.into(),
            returns_path: None,
            asin_to_sku: BTreeMap::new(),
            approver_identity: None,
        }
    }
}

/// Pointer to a stored artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub role: ArtifactRole,
    pub path: String,
    pub content_hash: String,
}

/// Recovered exceptions grouped per (stage, kind) for the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionSummary {
    pub stage: String,
    pub error_kind: ErrorKind,
    pub count: usize,
    pub sample_message: String,
}

/// What the caller gets back from a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub channel: Channel,
    pub gstin: Gstin,
    pub month: Month,
    pub input_hash: String,
    pub artifacts: Vec<ArtifactRef>,
    pub exceptions: Vec<ExceptionSummary>,
    pub tax_summary: Option<TaxSummary>,
    pub pivot_summary: Option<PivotSummary>,
    pub expense_summary: Option<ExpenseMappingSummary>,
    /// True when an identical prior run was returned unchanged.
    pub reused_prior_run: bool,
}

/// Entry point: execute one run end to end.
///
/// Success and partial runs return the summary; a fatal stage error marks
/// the run failed and propagates. With `overwrite=false`, a prior
/// successful run over the same input short-circuits.
pub fn run(
    config: &Config,
    deps: &Dependencies<'_>,
    request: &RunRequest,
) -> Result<RunSummary, PipelineError> {
    let (table, raw_bytes) = load_input(request, deps)?;
    let input_hash = sha256_hex(&raw_bytes);

    if !config.overwrite {
        if let Some(prior) = deps.db.find_successful_run(
            &request.gstin,
            &request.channel,
            request.month,
            &input_hash,
        )? {
            tracing::info!(run_id = %prior.run_id, "returning prior successful run");
            let artifacts = deps
                .db
                .reports_for_run(prior.run_id)?
                .into_iter()
                .map(|r| ArtifactRef {
                    role: r.role,
                    path: r.file_path,
                    content_hash: r.content_hash,
                })
                .collect();
            return Ok(RunSummary {
                run_id: prior.run_id,
                status: RunStatus::Success,
                channel: request.channel.clone(),
                gstin: request.gstin.clone(),
                month: request.month,
                input_hash,
                artifacts,
                exceptions: Vec::new(),
                tax_summary: None,
                pivot_summary: None,
                expense_summary: None,
                reused_prior_run: true,
            });
        }
    }

    let run_id = Uuid::new_v4();
    deps.db.insert_run(&RunRecord {
        run_id,
        channel: request.channel.clone(),
        gstin: request.gstin.clone(),
        month: request.month,
        status: RunStatus::Running,
        started_at: Utc::now(),
        finished_at: None,
        input_hash: input_hash.clone(),
    })?;
    tracing::info!(
        %run_id,
        channel = %request.channel,
        gstin = %request.gstin,
        month = %request.month,
        "run opened"
    );

    let mut coordinator = Coordinator {
        config,
        deps,
        request,
        run_id,
        input_hash,
        artifacts: Vec::new(),
        exceptions: Vec::new(),
    };

    match coordinator.execute(table, &raw_bytes) {
        Ok(summary) => {
            deps.db.finish_run(run_id, summary.status)?;
            tracing::info!(%run_id, status = summary.status.as_str(), "run closed");
            Ok(summary)
        }
        Err(error) => {
            // Terminal failure; artifacts written so far stay in place.
            if let Err(finish_error) = deps.db.finish_run(run_id, RunStatus::Failed) {
                tracing::error!(%run_id, %finish_error, "could not record failed status");
            }
            tracing::error!(%run_id, %error, "run failed");
            Err(error)
        }
    }
}

struct Coordinator<'a> {
    config: &'a Config,
    deps: &'a Dependencies<'a>,
    request: &'a RunRequest,
    run_id: Uuid,
    input_hash: String,
    artifacts: Vec<ArtifactRef>,
    exceptions: Vec<ExceptionSummary>,
}

impl Coordinator<'_> {
    fn execute(
        &mut self,
        table: Option<RawTable>,
        raw_bytes: &[u8],
    ) -> Result<RunSummary, PipelineError> {
        let raw_name = file_name(&self.request.input_path);
        self.upload(ArtifactRole::Raw, &raw_name, raw_bytes)?;

        if self.request.report_type == ReportType::SellerInvoice {
            self.execute_expense(table)
        } else {
            let table = table.ok_or_else(|| {
                PipelineError::InvalidRequest(
                    "sales reports must be CSV or workbook inputs".into(),
                )
            })?;
            self.execute_sales(&table)
        }
    }

    // Sales pipeline: normalize → resolve → tax+number → pivot → batch →
    // vouchers.
    fn execute_sales(&mut self, table: &RawTable) -> Result<RunSummary, PipelineError> {
        self.checkpoint("normalize")?;
        let normalized = self.normalize(table)?;
        self.record_exceptions("normalize", &normalized.exceptions);
        let stamp = self.stamp();
        let bytes = canonical_csv(&normalized.rows, &stamp)?;
        self.upload(ArtifactRole::Normalized, "normalized.csv", &bytes)?;

        self.checkpoint("resolve")?;
        let resolution =
            resolve_rows(self.deps.db, &self.request.channel, normalized.rows)?;
        if self.config.strict_mapping && resolution.unresolved_rows() > 0 {
            return Err(PipelineError::UnresolvedMasterData(format!(
                "{} rows unresolved with strict mapping enabled",
                resolution.unresolved_rows()
            )));
        }
        self.record_exceptions("resolve", &resolution.exceptions);
        let bytes = enriched_csv(&resolution.rows, &self.stamp())?;
        self.upload(ArtifactRole::Enriched, "enriched.csv", &bytes)?;

        self.checkpoint("tax_invoice")?;
        let priced = self.price_and_number(&resolution.rows)?;
        self.persist_tax_records(&priced)?;
        let bytes = priced_csv(&priced, &self.stamp())?;
        self.upload(ArtifactRole::WithTax, "with_tax.csv", &bytes)?;
        let tax_summary = summarize_tax(&priced);

        self.checkpoint("pivot")?;
        let pivot_report = pivot_rows(
            &self.request.channel,
            &self.request.gstin,
            self.request.month,
            &priced,
        );
        self.persist_pivot_records(&pivot_report.rows)?;
        let bytes = pivot_csv(&pivot_report.rows, self.run_id)?;
        self.upload(ArtifactRole::Pivot, "pivot.csv", &bytes)?;

        self.checkpoint("batch")?;
        let batches = split_batches(
            &self.request.channel,
            &self.request.gstin,
            self.request.month,
            &pivot_report.rows,
        )?;
        for batch in &batches {
            let bytes = pivot_csv(&batch.rows, self.run_id)?;
            let file_name = batch.file_name.clone();
            let path = self.upload(ArtifactRole::Batch, &file_name, &bytes)?;
            self.persist_batch_record(batch, path)?;
        }

        self.checkpoint("voucher")?;
        self.export_sales_vouchers(&batches)?;

        let status = if self.exceptions.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        };
        Ok(self.summary(status, Some(tax_summary), Some(pivot_report.summary), None))
    }

    // Expense pipeline: parse fee statement → map to ledgers → expense
    // workbook.
    fn execute_expense(
        &mut self,
        table: Option<RawTable>,
    ) -> Result<RunSummary, PipelineError> {
        self.checkpoint("parse_invoice")?;
        let parsed = match table {
            Some(table) => parse_invoice_table(&table)?,
            None => {
                let text = self.deps.pdf.extract_text(&self.request.input_path)?;
                parse_invoice_text(&text)?
            }
        };

        self.checkpoint("expense_map")?;
        let tax = TaxRules::new(&self.request.gstin, self.config);
        let mapped = self.number_expenses(&parsed, &tax)?;
        self.persist_seller_invoices(&parsed, &mapped)?;

        self.checkpoint("voucher")?;
        let registry =
            TemplateRegistry::new(self.deps.workbooks, &self.config.template_registry_path);
        let template = registry.load(TemplateKind::Expense, &self.request.gstin)?;
        let (workbook, stats) =
            assemble_expense_workbook(&template, &self.request.channel, &mapped)?;

        let name = expense_workbook_name(
            &self.request.channel,
            &self.request.gstin,
            self.request.month,
        );
        let path = self.save_workbook(&workbook, &name)?;
        with_retries("expense export record", DEFAULT_ATTEMPTS, || {
            self.deps.db.insert_expense_export(&ExpenseExportRecord {
                id: Uuid::new_v4(),
                run_id: self.run_id,
                channel: self.request.channel.clone(),
                gstin: self.request.gstin.clone(),
                month: self.request.month,
                file_path: path.clone(),
                record_count: stats.record_count,
                total_taxable: stats.total_taxable,
                total_tax: stats.total_tax,
                export_status: "exported".into(),
            })
        })?;

        Ok(self.summary(
            RunStatus::Success,
            None,
            None,
            Some(summarize_expenses(&mapped)),
        ))
    }

    fn normalize(&self, table: &RawTable) -> Result<NormalizedReport, PipelineError> {
        let ctx = NormalizeContext {
            config: self.config,
            channel: self.request.channel.clone(),
            gstin: self.request.gstin.clone(),
            month: self.request.month,
        };
        let normalizer: Box<dyn Normalizer> = match self.request.report_type {
            ReportType::AmazonMtr => Box::new(AmazonMtrNormalizer::new()),
            ReportType::AmazonStr => Box::new(AmazonStrNormalizer::with_asin_map(
                self.request.asin_to_sku.clone(),
            )),
            ReportType::Flipkart => Box::new(FlipkartNormalizer::new()),
            ReportType::Pepperfry => match &self.request.returns_path {
                Some(path) => {
                    let returns = RawTable::from_csv_path(path)?;
                    Box::new(PepperfryNormalizer::with_returns(returns))
                }
                None => Box::new(PepperfryNormalizer::new()),
            },
            ReportType::SellerInvoice => {
                return Err(PipelineError::InvalidRequest(
                    "seller invoices do not normalize to canonical rows".into(),
                ));
            }
        };
        normalizer.normalize(table, &ctx)
    }

    /// Apply the tax split and assign invoice numbers, re-running the
    /// numbering pass when a sequence commit loses its race.
    fn price_and_number(
        &self,
        rows: &[crate::core::EnrichedRow],
    ) -> Result<Vec<PricedRow>, PipelineError> {
        let tax = TaxRules::new(&self.request.gstin, self.config);
        let mut backoff = Duration::from_millis(100);

        for attempt in 1..=DEFAULT_ATTEMPTS {
            let mut allocator = InvoiceAllocator::new(self.deps.db);
            let mut priced = Vec::with_capacity(rows.len());

            for (index, enriched) in rows.iter().enumerate() {
                let row = &enriched.row;
                let input = TaxInput {
                    taxable_value: row.taxable_value,
                    shipping_value: row.shipping_value,
                    gst_rate: row.gst_rate,
                    buyer_state: row.buyer_state.clone(),
                    force_igst: self.request.channel.forces_igst(),
                    returned_qty: row.returned_qty,
                    total_qty: row.total_qty,
                };
                let split = tax.split(&input)?;

                let key = SequenceKey {
                    gstin: self.request.gstin.clone(),
                    channel: self.request.channel.clone(),
                    buyer_state: row.buyer_state.clone(),
                    month: self.request.month,
                };
                let sequence = allocator.allocate(&key)?;
                let priced_row = PricedRow {
                    row: enriched.clone(),
                    cgst: split.cgst,
                    sgst: split.sgst,
                    igst: split.igst,
                    total_tax: split.total_tax,
                    total_amount: split.total_amount,
                    invoice_no: invoice_number(
                        &self.request.channel,
                        &row.buyer_state,
                        self.request.month,
                        sequence,
                    ),
                };
                if !priced_row.tax_split_is_valid() {
                    return Err(PipelineError::TaxSplitInvariant(format!(
                        "row {index}: cgst={} sgst={} igst={}",
                        priced_row.cgst, priced_row.sgst, priced_row.igst
                    )));
                }
                priced.push(priced_row);
            }

            match allocator.commit() {
                Ok(()) => return Ok(priced),
                Err(error @ PipelineError::InvoiceSequenceConflict(_))
                    if attempt < DEFAULT_ATTEMPTS =>
                {
                    tracing::warn!(attempt, %error, "renumbering after sequence conflict");
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(Duration::from_secs(2));
                }
                Err(error) => return Err(error),
            }
        }
        Err(PipelineError::InvoiceSequenceConflict(
            "sequence allocation retries exhausted".into(),
        ))
    }

    /// Assign expense voucher numbers with the same conflict-retry loop.
    fn number_expenses(
        &self,
        parsed: &crate::expense::ParsedInvoice,
        tax: &TaxRules,
    ) -> Result<Vec<MappedExpense>, PipelineError> {
        let mut backoff = Duration::from_millis(100);
        for attempt in 1..=DEFAULT_ATTEMPTS {
            let mut allocator = InvoiceAllocator::new(self.deps.db);
            let mapped = map_line_items(
                parsed,
                &self.request.channel,
                &self.request.gstin,
                self.request.month,
                tax,
                &mut allocator,
            )?;
            match allocator.commit() {
                Ok(()) => return Ok(mapped),
                Err(error @ PipelineError::InvoiceSequenceConflict(_))
                    if attempt < DEFAULT_ATTEMPTS =>
                {
                    tracing::warn!(attempt, %error, "renumbering after sequence conflict");
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(Duration::from_secs(2));
                }
                Err(error) => return Err(error),
            }
        }
        Err(PipelineError::InvoiceSequenceConflict(
            "sequence allocation retries exhausted".into(),
        ))
    }

    fn export_sales_vouchers(&mut self, batches: &[BatchFile]) -> Result<(), PipelineError> {
        let registry =
            TemplateRegistry::new(self.deps.workbooks, &self.config.template_registry_path);
        let template = registry.load(TemplateKind::Sales, &self.request.gstin)?;

        for batch in batches {
            let (workbook, stats) = assemble_sales_workbook(
                &template,
                &self.request.channel,
                &self.request.gstin,
                self.request.month,
                batch,
            )?;
            let name = sales_workbook_name(
                &self.request.channel,
                &self.request.gstin,
                self.request.month,
                batch.gst_rate,
            );
            let path = self.save_workbook(&workbook, &name)?;
            with_retries("tally export record", DEFAULT_ATTEMPTS, || {
                self.deps.db.insert_tally_export(&TallyExportRecord {
                    id: Uuid::new_v4(),
                    run_id: self.run_id,
                    channel: self.request.channel.clone(),
                    gstin: self.request.gstin.clone(),
                    month: self.request.month,
                    gst_rate: batch.gst_rate,
                    template_name: template.name.clone(),
                    file_path: path.clone(),
                    file_size: workbook.approximate_size(),
                    record_count: stats.record_count,
                    total_taxable: stats.total_taxable,
                    total_tax: stats.total_tax,
                    export_status: "exported".into(),
                })
            })?;
        }
        Ok(())
    }

    fn persist_tax_records(&self, priced: &[PricedRow]) -> Result<(), PipelineError> {
        let computations: Vec<TaxComputationRecord> = priced
            .iter()
            .enumerate()
            .map(|(index, row)| TaxComputationRecord {
                id: Uuid::new_v4(),
                run_id: self.run_id,
                row_ref: index.to_string(),
                taxable_value: row.row.row.taxable_value,
                cgst: row.cgst,
                sgst: row.sgst,
                igst: row.igst,
                total_tax: row.total_tax,
                total_amount: row.total_amount,
            })
            .collect();
        with_retries("tax computations", DEFAULT_ATTEMPTS, || {
            self.deps.db.insert_tax_computations(&computations)
        })?;

        let registry: Vec<InvoiceRegistryRecord> = priced
            .iter()
            .enumerate()
            .map(|(index, row)| InvoiceRegistryRecord {
                invoice_no: row.invoice_no.clone(),
                run_id: self.run_id,
                gstin: self.request.gstin.clone(),
                channel: self.request.channel.clone(),
                buyer_state: row.row.row.buyer_state.clone(),
                month: self.request.month,
                sequence_number: invoice_sequence_number(&row.invoice_no),
                row_ref: index.to_string(),
            })
            .collect();
        with_retries("invoice registry", DEFAULT_ATTEMPTS, || {
            self.deps.db.insert_invoice_registry(&registry)
        })
    }

    fn persist_pivot_records(
        &self,
        rows: &[crate::core::PivotRow],
    ) -> Result<(), PipelineError> {
        let records: Vec<PivotSummaryRecord> = rows
            .iter()
            .map(|row| PivotSummaryRecord {
                id: Uuid::new_v4(),
                run_id: self.run_id,
                gstin: row.gstin.clone(),
                month: row.month,
                gst_rate: row.key.gst_rate,
                ledger_name: row.key.ledger_name.clone(),
                fg: row.key.fg.clone(),
                buyer_state: row.key.buyer_state.clone(),
                total_quantity: row.total_quantity,
                total_taxable: row.total_taxable,
                total_cgst: row.total_cgst,
                total_sgst: row.total_sgst,
                total_igst: row.total_igst,
            })
            .collect();
        with_retries("pivot summaries", DEFAULT_ATTEMPTS, || {
            self.deps.db.insert_pivot_summaries(&records)
        })
    }

    fn persist_batch_record(
        &self,
        batch: &BatchFile,
        path: String,
    ) -> Result<(), PipelineError> {
        with_retries("batch registry", DEFAULT_ATTEMPTS, || {
            self.deps.db.insert_batch_registry(&[BatchRegistryRecord {
                id: Uuid::new_v4(),
                run_id: self.run_id,
                channel: self.request.channel.clone(),
                gstin: self.request.gstin.clone(),
                month: self.request.month,
                gst_rate: batch.gst_rate,
                file_path: path.clone(),
                record_count: batch.record_count(),
            }])
        })
    }

    fn persist_seller_invoices(
        &self,
        parsed: &crate::expense::ParsedInvoice,
        mapped: &[MappedExpense],
    ) -> Result<(), PipelineError> {
        let source_file = file_name(&self.request.input_path);
        let records: Vec<SellerInvoiceRecord> = mapped
            .iter()
            .map(|expense| SellerInvoiceRecord {
                id: Uuid::new_v4(),
                run_id: self.run_id,
                channel: self.request.channel.clone(),
                gstin: self.request.gstin.clone(),
                vendor_invoice_no: parsed.invoice_no.clone(),
                invoice_date: expense.invoice_date,
                expense_type: expense.expense_type.clone(),
                taxable_value: expense.taxable_value,
                gst_rate: expense.gst_rate,
                cgst: expense.cgst,
                sgst: expense.sgst,
                igst: expense.igst,
                total_value: expense.total_value,
                ledger_name: expense.ledger_name.clone(),
                source_file: source_file.clone(),
                processing_status: "processed".into(),
            })
            .collect();
        with_retries("seller invoices", DEFAULT_ATTEMPTS, || {
            self.deps.db.insert_seller_invoices(&records)
        })
    }

    /// Upload artifact bytes and record them; returns the logical path.
    fn upload(
        &mut self,
        role: ArtifactRole,
        name: &str,
        bytes: &[u8],
    ) -> Result<String, PipelineError> {
        let logical = format!(
            "{}/{}/{}/{}",
            self.config.bucket_prefix,
            self.run_id,
            role.as_str(),
            name
        );
        with_retries("artifact upload", DEFAULT_ATTEMPTS, || {
            self.deps.store.put_bytes(bytes, &logical)
        })?;
        let content_hash = sha256_hex(bytes);
        with_retries("report record", DEFAULT_ATTEMPTS, || {
            self.deps.db.insert_report(&ReportRecord {
                id: Uuid::new_v4(),
                run_id: self.run_id,
                role,
                file_path: logical.clone(),
                content_hash: content_hash.clone(),
                created_at: Utc::now(),
            })
        })?;
        self.artifacts.push(ArtifactRef {
            role,
            path: logical.clone(),
            content_hash,
        });
        Ok(logical)
    }

    /// Save a voucher workbook and record it; returns the logical path.
    fn save_workbook(
        &mut self,
        workbook: &crate::io::Workbook,
        name: &str,
    ) -> Result<String, PipelineError> {
        let logical = format!(
            "{}/{}/{}/{}",
            self.config.bucket_prefix,
            self.run_id,
            ArtifactRole::Voucher.as_str(),
            name
        );
        with_retries("workbook save", DEFAULT_ATTEMPTS, || {
            self.deps.workbooks.save(workbook, Path::new(&logical))
        })?;
        let content_hash = sha256_hex(
            workbook
                .first_sheet()
                .map(sheet_to_csv)
                .unwrap_or_default()
                .as_bytes(),
        );
        with_retries("report record", DEFAULT_ATTEMPTS, || {
            self.deps.db.insert_report(&ReportRecord {
                id: Uuid::new_v4(),
                run_id: self.run_id,
                role: ArtifactRole::Voucher,
                file_path: logical.clone(),
                content_hash: content_hash.clone(),
                created_at: Utc::now(),
            })
        })?;
        self.artifacts.push(ArtifactRef {
            role: ArtifactRole::Voucher,
            path: logical.clone(),
            content_hash,
        });
        Ok(logical)
    }

    fn record_exceptions(&mut self, stage: &str, exceptions: &[RowException]) {
        let mut grouped: BTreeMap<ErrorKind, (usize, String)> = BTreeMap::new();
        for exception in exceptions {
            let entry = grouped
                .entry(exception.kind)
                .or_insert_with(|| (0, exception.message.clone()));
            entry.0 += 1;
        }
        for (kind, (count, sample)) in grouped {
            self.exceptions.push(ExceptionSummary {
                stage: stage.to_string(),
                error_kind: kind,
                count,
                sample_message: sample,
            });
        }
    }

    fn checkpoint(&self, stage: &str) -> Result<(), PipelineError> {
        if let Some(cancel) = &self.deps.cancel {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled(stage.to_string()));
            }
        }
        tracing::info!(run_id = %self.run_id, stage, "stage starting");
        Ok(())
    }

    fn stamp(&self) -> RowStamp<'_> {
        RowStamp {
            channel: &self.request.channel,
            gstin: &self.request.gstin,
            month: self.request.month,
            run_id: self.run_id,
        }
    }

    fn summary(
        &self,
        status: RunStatus,
        tax_summary: Option<TaxSummary>,
        pivot_summary: Option<PivotSummary>,
        expense_summary: Option<ExpenseMappingSummary>,
    ) -> RunSummary {
        RunSummary {
            run_id: self.run_id,
            status,
            channel: self.request.channel.clone(),
            gstin: self.request.gstin.clone(),
            month: self.request.month,
            input_hash: self.input_hash.clone(),
            artifacts: self.artifacts.clone(),
            exceptions: self.exceptions.clone(),
            tax_summary,
            pivot_summary,
            expense_summary,
            reused_prior_run: false,
        }
    }
}

/// Load the raw input. CSV and workbook inputs become tables; PDFs stay
/// opaque (the expense parser reads their extracted text).
fn load_input(
    request: &RunRequest,
    deps: &Dependencies<'_>,
) -> Result<(Option<RawTable>, Vec<u8>), PipelineError> {
    let path = &request.input_path;
    match extension(path).as_str() {
        "pdf" => {
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                // No local file: hash the extracted text instead.
                Err(_) => deps.pdf.extract_text(path)?.into_bytes(),
            };
            Ok((None, bytes))
        }
        "xlsx" | "xls" => {
            let workbook = deps.workbooks.load(path)?;
            let sheet = workbook.first_sheet().ok_or_else(|| {
                PipelineError::EmptyInput(format!("{} has no sheets", path.display()))
            })?;
            let rendered = sheet_to_csv(sheet);
            let table = RawTable::from_sheet(sheet, 0)?;
            Ok((Some(table), rendered.into_bytes()))
        }
        _ => {
            let bytes = std::fs::read(path).map_err(|e| {
                PipelineError::StorageUnavailable(format!(
                    "cannot read {}: {e}",
                    path.display()
                ))
            })?;
            let table = RawTable::from_csv_reader(bytes.as_slice(), &path.display().to_string())?;
            Ok((Some(table), bytes))
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input")
        .to_string()
}

/// Recover the numeric sequence from a formatted invoice number
/// (`AMZ-AP-08-0001` → 1).
fn invoice_sequence_number(invoice_no: &str) -> u64 {
    invoice_no
        .rsplit('-')
        .next()
        .and_then(|tail| tail.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_number_recovery() {
        assert_eq!(invoice_sequence_number("AMZ-AP-08-0001"), 1);
        assert_eq!(invoice_sequence_number("AMZST-HR-08-0042"), 42);
        assert_eq!(invoice_sequence_number("garbage"), 0);
    }

    #[test]
    fn cancel_token_flips_once() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
        let clone = token.clone();
        assert!(clone.is_cancelled());
    }
}
