//! Approval queue: pending master-data decisions.
//!
//! Requests are append-only and never deleted. Deciding a request
//! idempotently upserts the (possibly overridden) mapping into the
//! corresponding master table; approvals landing while a run's resolver
//! stage is in flight only take effect on the next run.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::core::PipelineError;
use crate::io::{
    ApprovalRecord, ApprovalStatus, ApprovalType, Database, ItemMasterRecord,
    LedgerMasterRecord,
};

use super::item::ItemSuggestion;
use super::ledger::LedgerSuggestion;

pub struct ApprovalQueue<'a> {
    db: &'a dyn Database,
}

impl<'a> ApprovalQueue<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }

    /// Enqueue an item request. Returns `None` when an identical request
    /// is already pending.
    pub fn enqueue_item(
        &self,
        suggestion: &ItemSuggestion,
    ) -> Result<Option<Uuid>, PipelineError> {
        let payload = serde_json::to_value(suggestion)
            .map_err(|e| PipelineError::DatabaseUnavailable(format!("payload: {e}")))?;
        self.enqueue(ApprovalType::Item, payload)
    }

    /// Enqueue a ledger request. Returns `None` when an identical request
    /// is already pending.
    pub fn enqueue_ledger(
        &self,
        suggestion: &LedgerSuggestion,
    ) -> Result<Option<Uuid>, PipelineError> {
        let payload = serde_json::to_value(suggestion)
            .map_err(|e| PipelineError::DatabaseUnavailable(format!("payload: {e}")))?;
        self.enqueue(ApprovalType::Ledger, payload)
    }

    fn enqueue(
        &self,
        approval_type: ApprovalType,
        payload: Value,
    ) -> Result<Option<Uuid>, PipelineError> {
        let pending = self
            .db
            .approvals(Some(ApprovalStatus::Pending), Some(approval_type))?;
        if pending.iter().any(|a| a.payload == payload) {
            return Ok(None);
        }
        let record = ApprovalRecord {
            id: Uuid::new_v4(),
            approval_type,
            payload,
            status: ApprovalStatus::Pending,
            approver: None,
            created_at: Utc::now(),
            decided_at: None,
        };
        self.db.insert_approval(&record)?;
        tracing::info!(
            approval_id = %record.id,
            kind = ?approval_type,
            "approval request enqueued"
        );
        Ok(Some(record.id))
    }

    /// Pending requests, optionally filtered by type.
    pub fn pending(
        &self,
        approval_type: Option<ApprovalType>,
    ) -> Result<Vec<ApprovalRecord>, PipelineError> {
        self.db.approvals(Some(ApprovalStatus::Pending), approval_type)
    }

    /// Decide one request. Approval upserts the mapping into the master
    /// table, with `overrides` (a JSON object) merged over the suggested
    /// payload field-by-field.
    pub fn decide(
        &self,
        id: Uuid,
        approve: bool,
        approver: &str,
        overrides: Option<Value>,
    ) -> Result<ApprovalRecord, PipelineError> {
        let mut record = self
            .db
            .approvals(None, None)?
            .into_iter()
            .find(|a| a.id == id)
            .ok_or_else(|| {
                PipelineError::DatabaseUnavailable(format!("unknown approval {id}"))
            })?;
        if record.status != ApprovalStatus::Pending {
            return Err(PipelineError::DatabaseUnavailable(format!(
                "approval {id} already decided"
            )));
        }

        let mut payload = record.payload.clone();
        if let (Value::Object(base), Some(Value::Object(extra))) =
            (&mut payload, overrides.as_ref())
        {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }

        if approve {
            match record.approval_type {
                ApprovalType::Item => self.apply_item(&payload, approver)?,
                ApprovalType::Ledger => self.apply_ledger(&payload, approver)?,
            }
            record.status = ApprovalStatus::Approved;
        } else {
            record.status = ApprovalStatus::Rejected;
        }
        record.payload = payload;
        record.approver = Some(approver.to_string());
        record.decided_at = Some(Utc::now());
        self.db.update_approval(&record)?;
        Ok(record)
    }

    /// Decide a batch of requests with one approver. Returns how many
    /// were applied.
    pub fn bulk_decide(
        &self,
        ids: &[Uuid],
        approve: bool,
        approver: &str,
    ) -> Result<usize, PipelineError> {
        let mut applied = 0;
        for id in ids {
            self.decide(*id, approve, approver, None)?;
            applied += 1;
        }
        Ok(applied)
    }

    fn apply_item(&self, payload: &Value, approver: &str) -> Result<(), PipelineError> {
        let suggestion: ItemSuggestion = serde_json::from_value(payload.clone())
            .map_err(|e| PipelineError::DatabaseUnavailable(format!("item payload: {e}")))?;
        let fg = payload
            .get("fg")
            .and_then(Value::as_str)
            .unwrap_or(&suggestion.suggested_fg)
            .to_string();
        let item_code = payload
            .get("item_code")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| default_item_code(&suggestion.sku));
        self.db.upsert_item_master(&ItemMasterRecord {
            sku: suggestion.sku,
            asin: suggestion.asin,
            item_code,
            fg,
            gst_rate: suggestion.suggested_gst_rate,
            approved_by: approver.to_string(),
        })
    }

    fn apply_ledger(&self, payload: &Value, approver: &str) -> Result<(), PipelineError> {
        let suggestion: LedgerSuggestion = serde_json::from_value(payload.clone())
            .map_err(|e| PipelineError::DatabaseUnavailable(format!("ledger payload: {e}")))?;
        let ledger_name = payload
            .get("ledger_name")
            .and_then(Value::as_str)
            .unwrap_or(&suggestion.suggested_ledger_name)
            .to_string();
        self.db.upsert_ledger_master(&LedgerMasterRecord {
            channel: suggestion.channel,
            buyer_state: suggestion.buyer_state,
            ledger_name,
            approved_by: approver.to_string(),
        })
    }
}

/// Default item code: first SKU segment plus a fixed suffix,
/// e.g. "LLQ-LAV-3L-FBA" → "LLQ001".
fn default_item_code(sku: &str) -> String {
    format!("{}001", sku.split('-').next().unwrap_or("ITEM"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Channel;
    use crate::io::MemoryDatabase;
    use crate::master::item::suggest_item;
    use crate::master::ledger::suggest_ledger;
    use serde_json::json;

    #[test]
    fn enqueue_dedupes_pending() {
        let db = MemoryDatabase::new();
        let queue = ApprovalQueue::new(&db);
        let s = suggest_item("NEW-SKU-1", "B0NEW");
        assert!(queue.enqueue_item(&s).unwrap().is_some());
        assert!(queue.enqueue_item(&s).unwrap().is_none());
        assert_eq!(queue.pending(Some(ApprovalType::Item)).unwrap().len(), 1);
    }

    #[test]
    fn approval_upserts_item_master() {
        let db = MemoryDatabase::new();
        let queue = ApprovalQueue::new(&db);
        let id = queue
            .enqueue_item(&suggest_item("LLQ-LAV-3L-FBA", "B0CZXQMSR5"))
            .unwrap()
            .unwrap();

        let record = queue
            .decide(id, true, "ops@example.com", Some(json!({"fg": "Liquid Lavender 3L"})))
            .unwrap();
        assert_eq!(record.status, ApprovalStatus::Approved);
        assert_eq!(record.approver.as_deref(), Some("ops@example.com"));

        let master = db.item_master_snapshot().unwrap();
        assert_eq!(master.len(), 1);
        assert_eq!(master[0].fg, "Liquid Lavender 3L");
        assert_eq!(master[0].item_code, "LLQ001");
        assert_eq!(master[0].approved_by, "ops@example.com");
    }

    #[test]
    fn rejection_leaves_master_untouched() {
        let db = MemoryDatabase::new();
        let queue = ApprovalQueue::new(&db);
        let id = queue
            .enqueue_ledger(&suggest_ledger(&Channel::AmazonMtr, "GOA"))
            .unwrap()
            .unwrap();
        queue.decide(id, false, "ops@example.com", None).unwrap();
        assert!(db.ledger_master_snapshot().unwrap().is_empty());
        // Decided requests cannot be re-decided.
        assert!(queue.decide(id, true, "ops@example.com", None).is_err());
    }

    #[test]
    fn ledger_approval_uses_suggested_name() {
        let db = MemoryDatabase::new();
        let queue = ApprovalQueue::new(&db);
        let id = queue
            .enqueue_ledger(&suggest_ledger(&Channel::Flipkart, "KARNATAKA"))
            .unwrap()
            .unwrap();
        queue.decide(id, true, "ops@example.com", None).unwrap();
        let master = db.ledger_master_snapshot().unwrap();
        assert_eq!(master[0].ledger_name, "Flipkart KA");
    }

    #[test]
    fn bulk_decide_applies_all() {
        let db = MemoryDatabase::new();
        let queue = ApprovalQueue::new(&db);
        let a = queue.enqueue_item(&suggest_item("A-1", "")).unwrap().unwrap();
        let b = queue.enqueue_item(&suggest_item("B-1", "")).unwrap().unwrap();
        assert_eq!(queue.bulk_decide(&[a, b], true, "ops").unwrap(), 2);
        assert_eq!(db.item_master_snapshot().unwrap().len(), 2);
        assert!(queue.pending(None).unwrap().is_empty());
    }
}
