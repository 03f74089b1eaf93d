//! Checkout engine
//!
//! Converts a buyer's cart into a completed purchase.
//!
//! # Flow
//!
//! ```text
//! get_cart ──▶ FundsValidator ──▶ CheckoutPlan
//!                                      │
//!                                      │ LedgerStore::transact (single writer)
//!                                      ▼
//!   re-verify lines ─▶ Transaction ─▶ history ─▶ debit ─▶ owners
//!        ─▶ listings + carts ─▶ seller credits ─▶ one WriteBatch
//! ```
//!
//! Validation runs against committed state and costs nothing on failure.
//! Everything after it happens in one unit on the store writer: a competing
//! checkout that commits first makes this one fail re-verification, and a
//! failure at any step discards every staged write.

use crate::{
    cart::get_cart,
    error::{Error, Result},
    history,
    metrics::Metrics,
    pricing::{CheckoutPlan, FundsValidator},
};
use chrono::{DateTime, Utc};
use ledger_store::{
    Credits, Item, LedgerStore, Listing, ReadView, Transaction, TransactionId, UserId, WriteSet,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Message returned with every successful checkout
pub const CHECKOUT_SUCCESS_MESSAGE: &str = "Successfully purchased items";

/// Result of a successful checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    /// Human-readable confirmation
    pub message: String,

    /// Transaction created by the checkout
    pub transaction_id: TransactionId,
}

impl CheckoutReceipt {
    fn new(transaction_id: TransactionId) -> Self {
        Self {
            message: CHECKOUT_SUCCESS_MESSAGE.to_string(),
            transaction_id,
        }
    }

    /// JSON payload for the caller
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::InvariantViolation(format!("receipt encoding: {}", e)))
    }
}

/// What a committed checkout unit did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSummary {
    /// Transaction row written
    pub transaction: Transaction,

    /// Items transferred
    pub items: usize,

    /// Sellers credited
    pub sellers_credited: usize,

    /// Cart entries deleted across all buyers
    pub cart_entries_removed: usize,
}

/// Outcome of the writer unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// New purchase committed
    Committed(CheckoutSummary),

    /// Idempotency key already used; nothing written
    Replayed(TransactionId),
}

impl CheckoutOutcome {
    /// Transaction the caller should see
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            CheckoutOutcome::Committed(summary) => summary.transaction.transaction_id,
            CheckoutOutcome::Replayed(transaction_id) => *transaction_id,
        }
    }
}

/// Checkout engine
#[derive(Debug, Clone)]
pub struct CheckoutEngine {
    store: Arc<LedgerStore>,
    validator: FundsValidator,
    metrics: Metrics,
}

impl CheckoutEngine {
    /// Create new engine
    pub fn new(store: Arc<LedgerStore>, validator: FundsValidator, metrics: Metrics) -> Self {
        Self {
            store,
            validator,
            metrics,
        }
    }

    /// Buy everything in the buyer's cart
    pub async fn checkout(&self, buyer_id: UserId) -> Result<CheckoutReceipt> {
        self.run(buyer_id, None).await
    }

    /// Buy the cart at most once per `request_key`
    ///
    /// A repeated key returns the transaction created the first time without
    /// charging again.
    pub async fn checkout_with_key(
        &self,
        buyer_id: UserId,
        request_key: &str,
    ) -> Result<CheckoutReceipt> {
        if request_key.trim().is_empty() {
            return Err(Error::BadRequest("Request key must not be empty".to_string()));
        }
        self.run(buyer_id, Some(request_key.to_string())).await
    }

    async fn run(&self, buyer_id: UserId, request_key: Option<String>) -> Result<CheckoutReceipt> {
        let started = Instant::now();

        match self.execute(buyer_id, request_key).await {
            Ok(CheckoutOutcome::Committed(summary)) => {
                let transaction = &summary.transaction;
                self.metrics.record_checkout(
                    summary.items,
                    transaction.transaction_total,
                    started.elapsed().as_secs_f64(),
                );
                tracing::info!(
                    buyer_id = %buyer_id,
                    transaction_id = %transaction.transaction_id,
                    total = transaction.transaction_total,
                    items = summary.items,
                    sellers = summary.sellers_credited,
                    cart_entries_removed = summary.cart_entries_removed,
                    "Checkout committed"
                );
                Ok(CheckoutReceipt::new(transaction.transaction_id))
            }
            Ok(CheckoutOutcome::Replayed(transaction_id)) => {
                tracing::info!(
                    buyer_id = %buyer_id,
                    transaction_id = %transaction_id,
                    "Checkout replayed for repeated request key"
                );
                Ok(CheckoutReceipt::new(transaction_id))
            }
            Err(err) => {
                self.metrics.record_failure(err.kind());
                if err.is_internal() {
                    tracing::error!(buyer_id = %buyer_id, error = %err, "Checkout failed");
                } else {
                    tracing::warn!(
                        buyer_id = %buyer_id,
                        kind = %err.kind(),
                        reason = %err,
                        "Checkout rejected"
                    );
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        buyer_id: UserId,
        request_key: Option<String>,
    ) -> Result<CheckoutOutcome> {
        let reader = self.store.reader();
        let buyer = reader.user(buyer_id)?.ok_or_else(Error::unknown_user)?;

        if let Some(key) = request_key.as_deref() {
            if let Some(transaction_id) = reader.transaction_for_request(buyer_id, key)? {
                return Ok(CheckoutOutcome::Replayed(transaction_id));
            }
        }

        self.validator.check_guest(&buyer)?;
        let cart = get_cart(reader, buyer_id)?;
        let plan = self.validator.validate(&buyer, &cart)?;

        self.store
            .transact(move |writes| {
                apply_checkout(writes, &plan, request_key.as_deref(), Utc::now())
            })
            .await
    }
}

/// Apply a validated plan inside one writer unit
///
/// Re-checks every line against the state the writer sees, then stages the
/// full purchase. Returning an error discards everything staged.
pub fn apply_checkout(
    writes: &mut WriteSet<'_>,
    plan: &CheckoutPlan,
    request_key: Option<&str>,
    now: DateTime<Utc>,
) -> Result<CheckoutOutcome> {
    if let Some(key) = request_key {
        if let Some(transaction_id) = writes.transaction_for_request(plan.buyer_id, key)? {
            return Ok(CheckoutOutcome::Replayed(transaction_id));
        }
    }

    let mut buyer = writes
        .user(plan.buyer_id)?
        .ok_or_else(Error::unknown_user)?;

    let mut purchases: Vec<(Listing, Item)> = Vec::with_capacity(plan.lines.len());
    let mut total: Credits = 0;
    for line in &plan.lines {
        let listing = writes
            .listing(line.listing_id)?
            .ok_or_else(|| Error::NotFound("Listing is no longer available".to_string()))?;

        if writes.cart_entry(plan.buyer_id, line.listing_id)?.is_none() {
            return Err(Error::Conflict("Cart changed during checkout".to_string()));
        }
        if listing.list_price != line.list_price || listing.item_id != line.item_id {
            return Err(Error::Conflict("Listing changed during checkout".to_string()));
        }

        let item = writes
            .item(line.item_id)?
            .ok_or_else(|| Error::NotFound("Item not found".to_string()))?;
        if item.owner_id == Some(plan.buyer_id) {
            return Err(Error::SelfPurchase);
        }
        if item.owner_id != line.seller_id {
            return Err(Error::Conflict("Item changed owner during checkout".to_string()));
        }

        total = total
            .checked_add(listing.list_price)
            .ok_or(Error::InsufficientFunds)?;
        purchases.push((listing, item));
    }

    if total != plan.cart_total {
        return Err(Error::InvariantViolation(format!(
            "cart total {} differs from line sum {}",
            plan.cart_total, total
        )));
    }
    if buyer.balance < total {
        return Err(Error::InsufficientFunds);
    }

    let transaction = Transaction {
        transaction_id: TransactionId::new(),
        buyer_id: plan.buyer_id,
        transaction_total: total,
        request_key: request_key.map(str::to_string),
        created_at: now,
    };
    writes.put_transaction(&transaction)?;

    for line in &plan.lines {
        history::advance(writes, transaction.transaction_id, plan, line, now)?;
    }

    buyer.balance -= total;
    writes.put_user(&buyer)?;

    let mut credits: BTreeMap<UserId, Credits> = BTreeMap::new();
    let mut cart_entries_removed = 0;
    for (listing, mut item) in purchases {
        if let Some(seller_id) = item.owner_id {
            let owed = credits.entry(seller_id).or_insert(0);
            *owed = owed.checked_add(listing.list_price).ok_or_else(|| {
                Error::InvariantViolation(format!("credit overflow for seller {}", seller_id))
            })?;
        }

        item.owner_id = Some(plan.buyer_id);
        writes.put_item(&item)?;
        cart_entries_removed += writes.remove_listing(&listing)?;
    }

    for (seller_id, amount) in &credits {
        let mut seller = writes.user(*seller_id)?.ok_or_else(|| {
            Error::InvariantViolation(format!("seller {} does not exist", seller_id))
        })?;
        seller.balance = seller.balance.checked_add(*amount).ok_or_else(|| {
            Error::InvariantViolation(format!("balance overflow for seller {}", seller_id))
        })?;
        writes.put_user(&seller)?;
    }

    Ok(CheckoutOutcome::Committed(CheckoutSummary {
        transaction,
        items: plan.lines.len(),
        sellers_credited: credits.len(),
        cart_entries_removed,
    }))
}
