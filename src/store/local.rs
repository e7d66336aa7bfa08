use log::{debug, warn};
use piggy_ledger_auth::SessionStore;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::Error;
use crate::expense::ExpenseRecord;

/// Local record list kept as one JSON array in the session store.
///
/// Clones share one write lock, so read-modify-write sequences from any
/// clone are serialised.
#[derive(Clone)]
pub struct LocalStore {
    session: Arc<dyn SessionStore>,
    key: String,
    write_lock: Arc<Mutex<()>>,
}

impl LocalStore {
    pub fn new(session: Arc<dyn SessionStore>, key: &str) -> Self {
        Self {
            session,
            key: key.to_string(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// 保存されている全レコード
    pub async fn list(&self) -> Result<Vec<ExpenseRecord>, Error> {
        self.read().await
    }

    /// Inserts the record or replaces the one with the same id.
    pub async fn put(&self, record: ExpenseRecord) -> Result<(), Error> {
        let id = record
            .id
            .clone()
            .ok_or_else(|| Error::local("cannot store a record without an id"))?;

        let _guard = self.write_lock.lock().await;
        let mut records = self.read().await?;
        match records.iter_mut().find(|r| r.id.as_deref() == Some(id.as_str())) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.write(&records).await?;
        debug!("Stored expense {} locally ({} records)", id, records.len());
        Ok(())
    }

    /// Removes the record; a missing id is not an error.
    pub async fn remove(&self, id: &str) -> Result<(), Error> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read().await?;
        let before = records.len();
        records.retain(|r| r.id.as_deref() != Some(id));
        if records.len() != before {
            self.write(&records).await?;
            debug!("Removed expense {} from local store", id);
        }
        Ok(())
    }

    async fn read(&self) -> Result<Vec<ExpenseRecord>, Error> {
        let raw = self
            .session
            .get(&self.key)
            .await
            .map_err(|e| Error::local(format!("failed to read '{}': {}", self.key, e)))?;
        match raw {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw).map_err(|e| {
                warn!("Local expense list under '{}' is corrupt: {}", self.key, e);
                Error::local(format!("corrupt local expense list: {}", e))
            }),
            _ => Ok(Vec::new()),
        }
    }

    async fn write(&self, records: &[ExpenseRecord]) -> Result<(), Error> {
        let raw = serde_json::to_string(records)?;
        self.session
            .set(&self.key, &raw)
            .await
            .map_err(|e| Error::local(format!("failed to write '{}': {}", self.key, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use piggy_ledger_auth::MemorySessionStore;

    fn record(id: &str, title: &str) -> ExpenseRecord {
        ExpenseRecord {
            id: Some(id.to_string()),
            title: title.to_string(),
            amount: 1.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_empty() {
        let local = LocalStore::new(Arc::new(MemorySessionStore::new()), "expenses");
        assert!(local.list().await.unwrap().is_empty());
        local.remove("nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_upserts_by_id() {
        let local = LocalStore::new(Arc::new(MemorySessionStore::new()), "expenses");
        local.put(record("a", "Coffee")).await.unwrap();
        local.put(record("b", "Lunch")).await.unwrap();
        local.put(record("a", "Tea")).await.unwrap();

        let records = local.list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Tea");
        assert_eq!(records[1].title, "Lunch");

        local.remove("a").await.unwrap();
        assert_eq!(local.list().await.unwrap(), vec![record("b", "Lunch")]);
    }

    #[tokio::test]
    async fn test_corrupt_list_is_local_persistence_error() {
        let session = Arc::new(MemorySessionStore::new());
        session.set("expenses", "[{broken").await.unwrap();
        let local = LocalStore::new(session, "expenses");

        assert!(matches!(local.list().await, Err(Error::LocalPersistence(_))));
        assert!(matches!(
            local.put(record("a", "x")).await,
            Err(Error::LocalPersistence(_))
        ));
    }

    #[tokio::test]
    async fn test_reads_legacy_array() {
        let session = Arc::new(MemorySessionStore::new());
        session
            .set(
                "expenses",
                r#"[{"id":"1699999999999","title":"Snack","amount":3,"type":"Cash"}]"#,
            )
            .await
            .unwrap();
        let local = LocalStore::new(session, "expenses");
        let records = local.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].legacy_type.as_deref(), Some("Cash"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_clones_serialise_writes() {
        let local = LocalStore::new(Arc::new(MemorySessionStore::new()), "expenses");
        let mut handles = Vec::new();
        for i in 0..40 {
            let store = local.clone();
            handles.push(tokio::spawn(async move {
                store.put(record(&format!("r{}", i), "x")).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(local.list().await.unwrap().len(), 40);
    }
}
