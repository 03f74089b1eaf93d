//! Ownership history chain
//!
//! Each item carries an append-only chain of [`OwnershipRecord`]s ordered by
//! `start_date`. Every record but the last is closed; the last one is open and
//! names the current owner.

use crate::error::{Error, Result};
use crate::pricing::{CheckoutLine, CheckoutPlan};
use chrono::{DateTime, Duration, Utc};
use ledger_store::{
    ItemId, OwnershipRecord, OwnershipRecordId, ReadView, TransactionId, UserId, WriteSet,
};
use serde::Serialize;

/// Records touched by one sale
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainUpdate {
    /// Previously open record, now closed
    pub closed: Option<OwnershipRecordId>,

    /// Record opened for the buyer (`None` if this sale was already recorded)
    pub opened: Option<OwnershipRecord>,
}

/// Currently open record of an item
///
/// Looks at the latest start first, so a chain that was left with several
/// open records still yields the most recent one.
pub fn open_record<V: ReadView>(view: &V, item_id: ItemId) -> Result<Option<OwnershipRecord>> {
    Ok(view
        .item_history(item_id)?
        .into_iter()
        .rev()
        .find(OwnershipRecord::is_open))
}

/// Close the item's open record and open one for the buyer
pub fn advance(
    writes: &mut WriteSet<'_>,
    transaction_id: TransactionId,
    plan: &CheckoutPlan,
    line: &CheckoutLine,
    now: DateTime<Utc>,
) -> Result<ChainUpdate> {
    let history = writes.item_history(line.item_id)?;
    if history
        .iter()
        .any(|record| record.transaction_id == transaction_id)
    {
        tracing::debug!(
            item_id = %line.item_id,
            transaction_id = %transaction_id,
            "Sale already recorded"
        );
        return Ok(ChainUpdate::default());
    }

    let previous = history.into_iter().rev().find(OwnershipRecord::is_open);

    // Keep start dates strictly increasing along the chain
    let start_date = match &previous {
        Some(open) if open.start_date >= now => open.start_date + Duration::nanoseconds(1),
        _ => now,
    };

    let mut update = ChainUpdate::default();
    if let Some(mut open) = previous {
        open.end_date = Some(start_date);
        writes.put_ownership_record(&open)?;
        update.closed = Some(open.record_id);
    }

    let record = OwnershipRecord {
        record_id: OwnershipRecordId::new(),
        item_id: line.item_id,
        transaction_id,
        buyer_id: plan.buyer_id,
        seller_id: line.seller_id,
        buyer_name: plan.buyer_name.clone(),
        seller_name: line.seller_name.clone(),
        item_name: line.item_name.clone(),
        sale_price: line.list_price,
        start_date,
        end_date: None,
    };
    writes.put_ownership_record(&record)?;
    update.opened = Some(record);

    Ok(update)
}

/// A broken link in an item's chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum ChainViolation {
    /// A record other than the last is still open
    OpenBeforeLast {
        /// Offending record
        record_id: OwnershipRecordId,
    },

    /// The last record is closed
    LastClosed {
        /// Offending record
        record_id: OwnershipRecordId,
    },

    /// A record ends before it starts
    EndsBeforeStart {
        /// Offending record
        record_id: OwnershipRecordId,
    },

    /// The open record does not name the current owner
    OwnerMismatch {
        /// Buyer on the open record
        recorded: UserId,
        /// Item's current owner
        current: Option<UserId>,
    },
}

/// Result of checking one item's chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    /// Item checked
    pub item_id: ItemId,

    /// Records in the chain
    pub records: usize,

    /// Problems found
    pub violations: Vec<ChainViolation>,
}

impl ChainReport {
    /// No violations
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check one item's chain
pub fn verify_chain<V: ReadView>(view: &V, item_id: ItemId) -> Result<ChainReport> {
    let item = view
        .item(item_id)?
        .ok_or_else(|| Error::NotFound("Item not found".to_string()))?;
    let records = view.item_history(item_id)?;

    let mut violations = Vec::new();
    for (index, record) in records.iter().enumerate() {
        let is_last = index + 1 == records.len();
        match record.end_date {
            None if !is_last => violations.push(ChainViolation::OpenBeforeLast {
                record_id: record.record_id,
            }),
            Some(_) if is_last => violations.push(ChainViolation::LastClosed {
                record_id: record.record_id,
            }),
            Some(end) if end < record.start_date => {
                violations.push(ChainViolation::EndsBeforeStart {
                    record_id: record.record_id,
                })
            }
            _ => {}
        }
    }

    if let Some(last) = records.last() {
        if last.is_open() && item.owner_id != Some(last.buyer_id) {
            violations.push(ChainViolation::OwnerMismatch {
                recorded: last.buyer_id,
                current: item.owner_id,
            });
        }
    }

    Ok(ChainReport {
        item_id,
        records: records.len(),
        violations,
    })
}

/// Check every item's chain
pub fn verify_all<V: ReadView>(view: &V) -> Result<Vec<ChainReport>> {
    view.all_items()?
        .into_iter()
        .map(|item| verify_chain(view, item.item_id))
        .collect()
}
