//! Marketplace facade
//!
//! Caller-facing entry points. Reads go straight to committed state; every
//! mutation is one unit on the store writer. Internal failures are logged
//! here with their cause and surface to callers as [`ErrorKind::Internal`].
//!
//! [`ErrorKind::Internal`]: crate::ErrorKind::Internal

use crate::{
    cart::{self, ResolvedCartEntry},
    config::Config,
    engine::{CheckoutEngine, CheckoutReceipt},
    history::{self, ChainReport},
    listings::{self, NewItem, NewUser},
    metrics::Metrics,
    pricing::FundsValidator,
    Error, Result,
};
use chrono::Utc;
use ledger_store::{
    CartEntry, Credits, Item, ItemId, LedgerStore, Listing, ListingId, OwnershipRecord, ReadView,
    StorageStats, Transaction, TransactionId, User, UserId,
};
use std::sync::Arc;

/// Planet marketplace
#[derive(Debug, Clone)]
pub struct Marketplace {
    store: Arc<LedgerStore>,
    engine: CheckoutEngine,
    metrics: Metrics,
    config: Arc<Config>,
}

impl Marketplace {
    /// Open the store and build the engine
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store = Arc::new(LedgerStore::open(config.store.clone()).await?);
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;
        let engine = CheckoutEngine::new(
            store.clone(),
            FundsValidator::new(config.checkout.clone()),
            metrics.clone(),
        );

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            max_cart_items = config.checkout.max_cart_items,
            allow_guest_checkout = config.checkout.allow_guest_checkout,
            "Marketplace opened"
        );

        Ok(Self {
            store,
            engine,
            metrics,
            config: Arc::new(config),
        })
    }

    // Checkout

    /// Buy everything in the caller's cart
    pub async fn checkout_cart(&self, caller: UserId) -> Result<CheckoutReceipt> {
        self.engine.checkout(caller).await
    }

    /// Buy the caller's cart at most once per `request_key`
    pub async fn checkout_cart_with_key(
        &self,
        caller: UserId,
        request_key: &str,
    ) -> Result<CheckoutReceipt> {
        self.engine.checkout_with_key(caller, request_key).await
    }

    // Cart

    /// Put a listing into the caller's cart
    pub async fn add_item_to_cart(&self, caller: UserId, listing_id: ListingId) -> Result<CartEntry> {
        let policy = self.config.checkout.clone();
        let result = self
            .store
            .transact(move |writes| cart::add_entry(writes, &policy, caller, listing_id, Utc::now()))
            .await;
        self.observe("add_item_to_cart", result)
    }

    /// Take a listing out of the caller's cart
    pub async fn remove_item_from_cart(&self, caller: UserId, listing_id: ListingId) -> Result<()> {
        let result = self
            .store
            .transact(move |writes| cart::remove_entry(writes, caller, listing_id))
            .await;
        self.observe("remove_item_from_cart", result)
    }

    /// Caller's cart, resolved against current listings
    pub fn get_cart_items(&self, caller: UserId) -> Result<Vec<ResolvedCartEntry>> {
        self.observe("get_cart_items", cart::get_cart(self.store.reader(), caller))
    }

    // Collaborator operations

    /// Register a user
    pub async fn create_user(&self, new: NewUser) -> Result<User> {
        let result = self
            .store
            .transact(move |writes| listings::create_user(writes, new, Utc::now()))
            .await;
        self.observe("create_user", result)
    }

    /// Add funds to a user's balance
    pub async fn top_up(&self, user_id: UserId, amount: Credits) -> Result<User> {
        let result = self
            .store
            .transact(move |writes| listings::top_up(writes, user_id, amount))
            .await;
        self.observe("top_up", result)
    }

    /// Create an item
    pub async fn mint_item(&self, new: NewItem) -> Result<Item> {
        let result = self
            .store
            .transact(move |writes| listings::mint_item(writes, new, Utc::now()))
            .await;
        self.observe("mint_item", result)
    }

    /// List an item the caller owns
    pub async fn create_listing(
        &self,
        caller: UserId,
        item_id: ItemId,
        price: Credits,
    ) -> Result<Listing> {
        self.list(Some(caller), item_id, price).await
    }

    /// List a system-owned item
    pub async fn create_house_listing(&self, item_id: ItemId, price: Credits) -> Result<Listing> {
        self.list(None, item_id, price).await
    }

    async fn list(&self, seller: Option<UserId>, item_id: ItemId, price: Credits) -> Result<Listing> {
        let policy = self.config.listings.clone();
        let result = self
            .store
            .transact(move |writes| {
                listings::create_listing(writes, &policy, seller, item_id, price, Utc::now())
            })
            .await;
        self.observe("create_listing", result)
    }

    /// Withdraw one of the caller's listings
    pub async fn cancel_listing(&self, caller: UserId, listing_id: ListingId) -> Result<usize> {
        let result = self
            .store
            .transact(move |writes| listings::cancel_listing(writes, Some(caller), listing_id))
            .await;
        self.observe("cancel_listing", result)
    }

    // Reads

    /// User by id
    pub fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(self.store.reader().user(user_id)?)
    }

    /// Item by id
    pub fn get_item(&self, item_id: ItemId) -> Result<Option<Item>> {
        Ok(self.store.reader().item(item_id)?)
    }

    /// Listing by id
    pub fn get_listing(&self, listing_id: ListingId) -> Result<Option<Listing>> {
        Ok(self.store.reader().listing(listing_id)?)
    }

    /// Active listing of an item, if any
    pub fn active_listing(&self, item_id: ItemId) -> Result<Option<Listing>> {
        let reader = self.store.reader();
        match reader.listing_for_item(item_id)? {
            Some(listing_id) => Ok(reader.listing(listing_id)?),
            None => Ok(None),
        }
    }

    /// Transaction by id
    pub fn get_transaction(&self, transaction_id: TransactionId) -> Result<Option<Transaction>> {
        Ok(self.store.reader().transaction(transaction_id)?)
    }

    /// Items a user currently owns
    pub fn owned_items(&self, user_id: UserId) -> Result<Vec<Item>> {
        Ok(self.store.reader().items_owned_by(user_id)?)
    }

    /// Ownership records of an item, oldest first
    pub fn ownership_history(&self, item_id: ItemId) -> Result<Vec<OwnershipRecord>> {
        Ok(self.store.reader().item_history(item_id)?)
    }

    /// Check one item's ownership chain
    pub fn verify_history_chain(&self, item_id: ItemId) -> Result<ChainReport> {
        history::verify_chain(self.store.reader(), item_id)
    }

    /// Check every item's ownership chain
    pub fn verify_all_chains(&self) -> Result<Vec<ChainReport>> {
        let reports = history::verify_all(self.store.reader())?;
        for report in reports.iter().filter(|report| !report.is_valid()) {
            tracing::error!(
                item_id = %report.item_id,
                violations = ?report.violations,
                "Ownership chain broken"
            );
        }
        Ok(reports)
    }

    // Operations

    /// Checkout metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Approximate row counts
    pub fn store_stats(&self) -> Result<StorageStats> {
        Ok(self.store.stats()?)
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop the store writer after queued units finish
    pub async fn shutdown(&self) -> Result<()> {
        self.store.shutdown().await?;
        tracing::info!("Marketplace shut down");
        Ok(())
    }

    fn observe<T>(&self, operation: &'static str, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_internal() {
                tracing::error!(operation, error = %err, "Operation failed");
            } else {
                tracing::debug!(operation, kind = %err.kind(), reason = %err, "Operation rejected");
            }
        }
        result
    }
}
