//! Persistence adapters
//!
//! The remote store is the consistency target and the only one that can be
//! watched live; the local store is a JSON copy in the session store and the
//! durability floor when the remote cannot be reached.

mod local;
mod memory;
mod remote;

pub use local::LocalStore;
pub use memory::MemoryRemoteStore;
pub use remote::PostgrestRemoteStore;

use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::expense::ExpenseRecord;

/// リモートストア
///
/// One instance is bound to one collection when it is constructed.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Persists a new record and returns the id the store assigned.
    async fn write(&self, record: &ExpenseRecord) -> Result<String, Error>;

    /// Replaces the record stored under `id`.
    async fn update(&self, id: &str, record: &ExpenseRecord) -> Result<(), Error>;

    async fn delete(&self, id: &str) -> Result<(), Error>;

    /// Every record in the collection, unfiltered.
    async fn list(&self) -> Result<Vec<ExpenseRecord>, Error>;

    /// Opens a live feed of whole-collection snapshots.
    async fn subscribe(&self) -> Result<RemoteSubscription, Error>;
}

/// ライブ購読から届くイベント
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// The full collection as of this moment.
    Snapshot(Vec<ExpenseRecord>),
    /// The feed failed; nothing follows.
    Error(String),
}

/// A cancellable feed of [`RemoteEvent`]s.
///
/// Closing or dropping the subscription stops the producer; no event is
/// delivered afterwards.
pub struct RemoteSubscription {
    receiver: mpsc::Receiver<RemoteEvent>,
    task: Option<JoinHandle<()>>,
}

impl RemoteSubscription {
    /// Wraps a channel fed by a background task owned by the subscription.
    pub fn new(receiver: mpsc::Receiver<RemoteEvent>, task: JoinHandle<()>) -> Self {
        Self {
            receiver,
            task: Some(task),
        }
    }

    /// Wraps a channel whose sender lives elsewhere.
    pub fn from_receiver(receiver: mpsc::Receiver<RemoteEvent>) -> Self {
        Self {
            receiver,
            task: None,
        }
    }

    /// `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<RemoteEvent> {
        self.receiver.recv().await
    }

    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.receiver.close();
        debug!("Remote subscription closed");
    }
}

impl Drop for RemoteSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
