//! Master-data resolution stage: item and ledger lookups with an
//! approval queue for misses.
//!
//! The stage takes one snapshot of each master table at entry, so a
//! concurrent approval cannot enrich half a dataset. Misses produce
//! deduplicated approval requests and leave the row flagged unresolved.

mod approvals;
mod item;
mod ledger;

pub use approvals::ApprovalQueue;
pub use item::{ItemResolver, ItemSuggestion, suggest_item};
pub use ledger::{LedgerResolver, LedgerSuggestion, suggest_ledger};

use std::collections::BTreeSet;

use crate::core::{CanonicalRow, Channel, EnrichedRow, PipelineError, RowException};
use crate::io::Database;

/// Output of the resolver stage.
#[derive(Debug, Default)]
pub struct ResolutionReport {
    pub rows: Vec<EnrichedRow>,
    pub exceptions: Vec<RowException>,
    /// Approval requests newly enqueued by this stage.
    pub item_requests: usize,
    pub ledger_requests: usize,
}

impl ResolutionReport {
    pub fn unresolved_rows(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| !r.item_resolved || !r.ledger_resolved)
            .count()
    }
}

/// Annotate canonical rows with finished goods and ledger names.
pub fn resolve_rows(
    db: &dyn Database,
    channel: &Channel,
    rows: Vec<CanonicalRow>,
) -> Result<ResolutionReport, PipelineError> {
    let items = ItemResolver::from_snapshot(db.item_master_snapshot()?);
    let ledgers = LedgerResolver::from_snapshot(db.ledger_master_snapshot()?);
    let queue = ApprovalQueue::new(db);

    let mut report = ResolutionReport::default();
    let mut missed_items: BTreeSet<(String, String)> = BTreeSet::new();
    let mut missed_ledgers: BTreeSet<String> = BTreeSet::new();

    for (i, row) in rows.into_iter().enumerate() {
        let (fg, item_resolved) = match items.resolve(&row.sku, &row.asin) {
            Some(record) => (record.fg.clone(), true),
            None => {
                if missed_items.insert((row.sku.clone(), row.asin.clone())) {
                    if queue
                        .enqueue_item(&suggest_item(&row.sku, &row.asin))?
                        .is_some()
                    {
                        report.item_requests += 1;
                    }
                }
                report.exceptions.push(RowException::unresolved(
                    i,
                    format!("no item mapping for sku '{}' asin '{}'", row.sku, row.asin),
                ));
                (String::new(), false)
            }
        };

        let (ledger_name, ledger_resolved) = match ledgers.resolve(channel, &row.buyer_state)
        {
            Some(record) => (record.ledger_name.clone(), true),
            None => {
                if missed_ledgers.insert(row.buyer_state.clone()) {
                    if queue
                        .enqueue_ledger(&suggest_ledger(channel, &row.buyer_state))?
                        .is_some()
                    {
                        report.ledger_requests += 1;
                    }
                }
                report.exceptions.push(RowException::unresolved(
                    i,
                    format!(
                        "no ledger mapping for channel '{}' state '{}'",
                        channel, row.buyer_state
                    ),
                ));
                (String::new(), false)
            }
        };

        report.rows.push(EnrichedRow {
            row,
            fg,
            item_resolved,
            ledger_name,
            ledger_resolved,
        });
    }

    tracing::info!(
        stage = "resolve",
        rows = report.rows.len(),
        unresolved = report.unresolved_rows(),
        item_requests = report.item_requests,
        ledger_requests = report.ledger_requests,
        "master resolution complete"
    );
    Ok(report)
}
