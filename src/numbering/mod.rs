//! Invoice numbering.
//!
//! Numbers follow `{prefix}-{ST}-{MM}-{NNNN}`: channel prefix, two-letter
//! buyer-state abbreviation, two-digit month, four-digit sequence.
//! Sequences are durable per (gstin, channel, buyer state, month):
//! the allocator reserves a contiguous block in memory during the stage
//! and commits the new high-water mark atomically at stage end, so a
//! failed run never burns numbers.

use std::collections::BTreeMap;

use crate::core::states::state_abbreviation;
use crate::core::{Channel, Month, PipelineError};
use crate::io::{Database, SequenceKey};

/// Format a sales invoice number, e.g. `AMZ-AP-08-0001`.
pub fn invoice_number(channel: &Channel, buyer_state: &str, month: Month, seq: u64) -> String {
    format!(
        "{}-{}-{}-{:04}",
        channel.invoice_prefix(),
        state_abbreviation(buyer_state),
        month.mm(),
        seq
    )
}

/// Format an expense voucher number, e.g. `EXP0625080001`.
pub fn expense_voucher_number(state_code: &str, month: Month, seq: u64) -> String {
    format!("EXP{}{}{}{:04}", state_code, month.yy(), month.mm(), seq)
}

#[derive(Debug, Clone, Copy)]
struct Reservation {
    /// Value the durable counter held when the block was reserved.
    base: u64,
    /// Next value to hand out.
    next: u64,
}

/// Stage-scoped sequence allocator.
///
/// `allocate` hands out consecutive integers per key in input order;
/// nothing is durable until `commit`. On a commit conflict (another run
/// advanced the counter first) every already-committed key is rolled
/// back and the caller retries the whole numbering pass.
pub struct InvoiceAllocator<'a> {
    db: &'a dyn Database,
    reserved: BTreeMap<SequenceKey, Reservation>,
}

impl<'a> InvoiceAllocator<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self {
            db,
            reserved: BTreeMap::new(),
        }
    }

    /// Reserve the next sequence value for a key.
    pub fn allocate(&mut self, key: &SequenceKey) -> Result<u64, PipelineError> {
        if !self.reserved.contains_key(key) {
            let base = self.db.sequence_next(key)?;
            self.reserved
                .insert(key.clone(), Reservation { base, next: base });
        }
        // Safe: inserted above.
        let reservation = self
            .reserved
            .get_mut(key)
            .ok_or_else(|| PipelineError::InvoiceSequenceConflict("reservation lost".into()))?;
        let value = reservation.next;
        reservation.next += 1;
        Ok(value)
    }

    /// Commit all reserved blocks. Clears the reservations on success.
    pub fn commit(&mut self) -> Result<(), PipelineError> {
        let entries: Vec<(SequenceKey, Reservation)> = self
            .reserved
            .iter()
            .map(|(key, reservation)| (key.clone(), *reservation))
            .collect();
        self.reserved.clear();

        let mut committed: Vec<&(SequenceKey, Reservation)> = Vec::new();
        for entry in &entries {
            let (key, reservation) = entry;
            if reservation.next == reservation.base {
                continue;
            }
            let won = self
                .db
                .sequence_commit(key, reservation.base, reservation.next)?;
            if !won {
                // Roll back what already landed; best effort — a failed
                // reverse swap means a third run advanced past us.
                for (done_key, done) in committed {
                    let _ = self.db.sequence_commit(done_key, done.next, done.base);
                }
                return Err(PipelineError::InvoiceSequenceConflict(format!(
                    "sequence for {}/{}/{} advanced concurrently",
                    key.gstin, key.channel, key.buyer_state
                )));
            }
            committed.push(entry);
        }
        Ok(())
    }

    /// Drop all reservations without committing (cancellation path).
    pub fn release(&mut self) {
        self.reserved.clear();
    }

    /// Number of keys with an open reservation.
    pub fn open_reservations(&self) -> usize {
        self.reserved.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Gstin;
    use crate::io::MemoryDatabase;

    fn key(state: &str) -> SequenceKey {
        SequenceKey {
            gstin: Gstin::parse("06ABGCS4796R1ZA").unwrap(),
            channel: Channel::AmazonMtr,
            buyer_state: state.to_string(),
            month: Month::parse("2025-08").unwrap(),
        }
    }

    #[test]
    fn invoice_number_format() {
        let m = Month::parse("2025-08").unwrap();
        assert_eq!(
            invoice_number(&Channel::AmazonMtr, "ANDHRA PRADESH", m, 1),
            "AMZ-AP-08-0001"
        );
        assert_eq!(
            invoice_number(&Channel::AmazonMtr, "ANDHRA PRADESH", m, 2),
            "AMZ-AP-08-0002"
        );
        assert_eq!(
            invoice_number(&Channel::AmazonStr, "HARYANA", m, 12),
            "AMZST-HR-08-0012"
        );
        assert_eq!(
            invoice_number(&Channel::Flipkart, "DELHI", m, 3),
            "FLIP-DL-08-0003"
        );
        assert_eq!(
            invoice_number(&Channel::Pepperfry, "KARNATAKA", m, 9999),
            "PEPP-KA-08-9999"
        );
        assert_eq!(
            invoice_number(&Channel::parse("meesho"), "GOA", m, 5),
            "MEE-GA-08-0005"
        );
    }

    #[test]
    fn expense_voucher_format() {
        let m = Month::parse("2025-08").unwrap();
        assert_eq!(expense_voucher_number("06", m, 1), "EXP0625080001");
        assert_eq!(expense_voucher_number("06", m, 42), "EXP0625080042");
    }

    #[test]
    fn allocates_contiguously_per_key() {
        let db = MemoryDatabase::new();
        let mut alloc = InvoiceAllocator::new(&db);
        assert_eq!(alloc.allocate(&key("HARYANA")).unwrap(), 1);
        assert_eq!(alloc.allocate(&key("HARYANA")).unwrap(), 2);
        assert_eq!(alloc.allocate(&key("DELHI")).unwrap(), 1);
        assert_eq!(alloc.allocate(&key("HARYANA")).unwrap(), 3);
        alloc.commit().unwrap();
        assert_eq!(db.sequence_next(&key("HARYANA")).unwrap(), 4);
        assert_eq!(db.sequence_next(&key("DELHI")).unwrap(), 2);
    }

    #[test]
    fn uncommitted_reservations_leave_counter_alone() {
        let db = MemoryDatabase::new();
        let mut alloc = InvoiceAllocator::new(&db);
        alloc.allocate(&key("HARYANA")).unwrap();
        alloc.allocate(&key("HARYANA")).unwrap();
        alloc.release();
        assert_eq!(db.sequence_next(&key("HARYANA")).unwrap(), 1);
        // A fresh allocator starts from 1 again.
        let mut again = InvoiceAllocator::new(&db);
        assert_eq!(again.allocate(&key("HARYANA")).unwrap(), 1);
    }

    #[test]
    fn commit_conflict_is_reported() {
        let db = MemoryDatabase::new();
        let mut alloc = InvoiceAllocator::new(&db);
        alloc.allocate(&key("HARYANA")).unwrap();
        // Concurrent run commits first.
        db.sequence_commit(&key("HARYANA"), 1, 5).unwrap();
        let err = alloc.commit().unwrap_err();
        assert!(matches!(err, PipelineError::InvoiceSequenceConflict(_)));
        // Retry picks up the advanced counter.
        let mut retry = InvoiceAllocator::new(&db);
        assert_eq!(retry.allocate(&key("HARYANA")).unwrap(), 5);
        retry.commit().unwrap();
        assert_eq!(db.sequence_next(&key("HARYANA")).unwrap(), 6);
    }

    #[test]
    fn conflict_rolls_back_earlier_keys() {
        let db = MemoryDatabase::new();
        let mut alloc = InvoiceAllocator::new(&db);
        alloc.allocate(&key("DELHI")).unwrap();
        alloc.allocate(&key("HARYANA")).unwrap();
        // HARYANA (committed after DELHI in key order) is contended.
        db.sequence_commit(&key("HARYANA"), 1, 3).unwrap();
        assert!(alloc.commit().is_err());
        // DELHI was rolled back.
        assert_eq!(db.sequence_next(&key("DELHI")).unwrap(), 1);
    }
}
