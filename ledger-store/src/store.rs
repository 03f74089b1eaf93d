//! Store orchestration layer
//!
//! Ties storage and the single-writer actor together: reads go straight to
//! RocksDB, writes go through the actor.
//!
//! # Example
//!
//! ```no_run
//! use ledger_store::{LedgerStore, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> ledger_store::Result<()> {
//!     let store = LedgerStore::open(StoreConfig::default()).await?;
//!
//!     // let user = ...;
//!     // store.transact(move |writes| writes.put_user(&user)).await?;
//!
//!     store.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_store_actor, StoreHandle},
    storage::{Storage, StorageStats, WriteSet},
    Error, Result, StoreConfig,
};
use std::sync::Arc;

/// Main store interface
#[derive(Debug)]
pub struct LedgerStore {
    /// Writer handle
    handle: StoreHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Configuration
    config: StoreConfig,
}

impl LedgerStore {
    /// Open store with configuration
    pub async fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let storage = Arc::new(Storage::open(&config)?);
        let handle = spawn_store_actor(storage.clone(), config.writer.mailbox_capacity);

        Ok(Self {
            handle,
            storage,
            config,
        })
    }

    /// Committed state, for reads
    pub fn reader(&self) -> &Storage {
        &self.storage
    }

    /// Run a unit of work on the single writer and commit it atomically
    pub async fn transact<T, E, F>(&self, unit: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut WriteSet<'_>) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<Error> + Send + 'static,
    {
        self.handle.transact(unit).await
    }

    /// Approximate row counts
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    /// Configuration in use
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Shutdown store, letting queued units finish first
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}
