//! Single-writer actor for the store
//!
//! Every mutating unit of work is executed by one Tokio task, one unit at a
//! time. A unit reads current state, decides, stages writes and commits them
//! as one `WriteBatch` before the next unit starts, so check-then-write
//! sequences never interleave.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          Marketplace requests (many tasks)           │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ StoreHandle::transact(unit)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               StoreHandle (Clone)                    │
//! │         Sends boxed units to the mailbox             │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              StoreActor (Single Task)                │
//! │   unit(&mut WriteSet) → WriteBatch → RocksDB         │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::storage::{Storage, WriteSet};
use crate::Error;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

type Job = Box<dyn FnOnce(&Storage) + Send + 'static>;

/// Message sent to the store actor
pub enum StoreMessage {
    /// Run one unit of work against the store
    Execute {
        /// Unit of work; it reports its own result
        job: Job,
    },

    /// Stop after every previously queued unit has run
    Shutdown {
        /// Acknowledged once the actor has stopped
        response: oneshot::Sender<()>,
    },
}

impl fmt::Debug for StoreMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreMessage::Execute { .. } => f.write_str("Execute"),
            StoreMessage::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}

/// Actor that owns every write to the store
#[derive(Debug)]
pub struct StoreActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<StoreMessage>,

    /// Units executed so far
    units_executed: u64,
}

impl StoreActor {
    /// Create new actor
    pub fn new(storage: Arc<Storage>, mailbox: mpsc::Receiver<StoreMessage>) -> Self {
        Self {
            storage,
            mailbox,
            units_executed: 0,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                StoreMessage::Execute { job } => {
                    job(&self.storage);
                    self.units_executed += 1;
                }
                StoreMessage::Shutdown { response } => {
                    tracing::info!(units = self.units_executed, "Store writer stopped");
                    // Release the writer's storage handle before acknowledging
                    drop(self);
                    let _ = response.send(());
                    return;
                }
            }
        }

        tracing::info!(
            units = self.units_executed,
            "Store writer mailbox closed"
        );
    }
}

/// Handle for submitting units of work to the actor
#[derive(Clone, Debug)]
pub struct StoreHandle {
    sender: mpsc::Sender<StoreMessage>,
}

impl StoreHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<StoreMessage>) -> Self {
        Self { sender }
    }

    /// Run `unit` on the writer and commit its writes atomically
    ///
    /// The unit's own error type is returned unchanged; store failures are
    /// converted through `From<Error>`.
    pub async fn transact<T, E, F>(&self, unit: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut WriteSet<'_>) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<Error> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |storage: &Storage| {
            let _ = tx.send(storage.transact(unit));
        });

        self.sender
            .send(StoreMessage::Execute { job })
            .await
            .map_err(|_| E::from(Error::Concurrency("Writer mailbox closed".to_string())))?;

        rx.await
            .map_err(|_| E::from(Error::Concurrency("Response channel closed".to_string())))?
    }

    /// Shutdown actor, waiting for queued units to finish
    pub async fn shutdown(&self) -> crate::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StoreMessage::Shutdown { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Writer mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }
}

/// Spawn the store actor
pub fn spawn_store_actor(storage: Arc<Storage>, mailbox_capacity: usize) -> StoreHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity); // Bounded channel for backpressure
    let actor = StoreActor::new(storage, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    StoreHandle::new(tx)
}
