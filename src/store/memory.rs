use async_trait::async_trait;
use log::{debug, info};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::{RemoteEvent, RemoteStore, RemoteSubscription};
use crate::error::Error;
use crate::expense::ExpenseRecord;

/// In-process remote store with an availability switch.
///
/// Every mutation pushes the full collection to all open subscriptions.
pub struct MemoryRemoteStore {
    records: Mutex<Vec<ExpenseRecord>>,
    subscribers: Mutex<Vec<mpsc::Sender<RemoteEvent>>>,
    online: AtomicBool,
    next_id: AtomicU64,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            online: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        }
    }

    /// Seeds the collection, e.g. with records written by another device.
    pub fn with_records(records: Vec<ExpenseRecord>) -> Self {
        let store = Self::new();
        if let Ok(mut guard) = store.records.lock() {
            *guard = records;
        }
        store
    }

    /// オンライン状態を切り替える
    pub fn set_online(&self, online: bool) {
        info!("Memory remote store is now {}", if online { "online" } else { "offline" });
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Current contents, for inspection.
    pub fn records(&self) -> Vec<ExpenseRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Ends every open subscription with an error event.
    pub fn fail_subscriptions(&self, message: &str) {
        let subscribers = match self.subscribers.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return,
        };
        debug!("Failing {} subscription(s): {}", subscribers.len(), message);
        for tx in subscribers {
            let _ = tx.try_send(RemoteEvent::Error(message.to_string()));
        }
    }

    fn ensure_online(&self) -> Result<(), Error> {
        if self.is_online() {
            Ok(())
        } else {
            Err(Error::remote("memory remote store is offline"))
        }
    }

    fn lock_records(&self) -> Result<std::sync::MutexGuard<'_, Vec<ExpenseRecord>>, Error> {
        self.records
            .lock()
            .map_err(|_| Error::general("memory remote store lock poisoned"))
    }

    fn broadcast(&self) {
        let snapshot = self.records();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| !tx.is_closed());
            for tx in subscribers.iter() {
                if tx.try_send(RemoteEvent::Snapshot(snapshot.clone())).is_err() {
                    debug!("Subscriber lagging; snapshot dropped");
                }
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn write(&self, record: &ExpenseRecord) -> Result<String, Error> {
        self.ensure_online()?;
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut stored = record.clone();
        stored.id = Some(id.clone());
        self.lock_records()?.push(stored);
        self.broadcast();
        Ok(id)
    }

    async fn update(&self, id: &str, record: &ExpenseRecord) -> Result<(), Error> {
        self.ensure_online()?;
        {
            let mut records = self.lock_records()?;
            let existing = records
                .iter_mut()
                .find(|r| r.id.as_deref() == Some(id))
                .ok_or_else(|| Error::remote(format!("no remote record {}", id)))?;
            let mut replacement = record.clone();
            replacement.id = Some(id.to_string());
            *existing = replacement;
        }
        self.broadcast();
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        self.ensure_online()?;
        self.lock_records()?.retain(|r| r.id.as_deref() != Some(id));
        self.broadcast();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ExpenseRecord>, Error> {
        self.ensure_online()?;
        Ok(self.records())
    }

    async fn subscribe(&self) -> Result<RemoteSubscription, Error> {
        self.ensure_online()?;
        let (tx, rx) = mpsc::channel(64);
        let _ = tx.try_send(RemoteEvent::Snapshot(self.records()));
        self.subscribers
            .lock()
            .map_err(|_| Error::general("memory remote store lock poisoned"))?
            .push(tx);
        Ok(RemoteSubscription::from_receiver(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(title: &str) -> ExpenseRecord {
        ExpenseRecord {
            title: title.to_string(),
            amount: 2.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_write_assigns_id_and_broadcasts() {
        let store = MemoryRemoteStore::new();
        let mut sub = store.subscribe().await.unwrap();
        assert_eq!(sub.next().await, Some(RemoteEvent::Snapshot(Vec::new())));

        let id = store.write(&draft("Coffee")).await.unwrap();
        match sub.next().await {
            Some(RemoteEvent::Snapshot(records)) => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].id.as_deref(), Some(id.as_str()));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_offline_rejects_everything() {
        let store = MemoryRemoteStore::new();
        store.set_online(false);
        assert!(matches!(
            store.write(&draft("x")).await,
            Err(Error::RemoteUnavailable(_))
        ));
        assert!(store.list().await.is_err());
        assert!(store.subscribe().await.is_err());
    }

    #[tokio::test]
    async fn test_update_unknown_id_fails() {
        let store = MemoryRemoteStore::new();
        assert!(store.update("mem-9", &draft("x")).await.is_err());
    }

    #[tokio::test]
    async fn test_fail_subscriptions() {
        let store = MemoryRemoteStore::new();
        let mut sub = store.subscribe().await.unwrap();
        let _initial = sub.next().await;
        store.fail_subscriptions("socket dropped");
        assert_eq!(
            sub.next().await,
            Some(RemoteEvent::Error("socket dropped".to_string()))
        );
        assert_eq!(sub.next().await, None);
    }
}
