//! Marketplace Ledger Store
//!
//! Persistence for users, items, listings, carts, checkout transactions and
//! ownership history, with all-or-nothing multi-row writes.
//!
//! # Architecture
//!
//! - **Column families**: one per relation plus a secondary-index family
//! - **Write sets**: a unit of work stages puts/deletes and commits them as
//!   one RocksDB `WriteBatch`
//! - **Single Writer**: one actor task runs units one at a time, so a unit's
//!   checks and writes are never interleaved with another unit's
//!
//! # Invariants
//!
//! - At most one active listing per item (listing-by-item index)
//! - Deleting a listing deletes every cart entry referencing it
//! - Ownership records are only ever inserted or updated, never deleted

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod config;
pub mod error;
pub mod storage;
pub mod store;
pub mod types;

// Re-exports
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use storage::{ReadView, Storage, StorageStats, WriteSet};
pub use store::LedgerStore;
pub use types::{
    CartEntry, Credits, Item, ItemId, Listing, ListingId, OwnershipRecord, OwnershipRecordId,
    Transaction, TransactionId, User, UserId,
};
