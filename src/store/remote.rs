use async_trait::async_trait;
use log::{debug, info, warn};
use piggy_ledger_postgrest::PostgrestClient;
use piggy_ledger_realtime::{ChangeStream, DatabaseChanges, RealtimeClient};
use reqwest::Client;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{RemoteEvent, RemoteStore, RemoteSubscription};
use crate::config::LedgerOptions;
use crate::error::Error;
use crate::expense::ExpenseRecord;

const SNAPSHOT_BUFFER: usize = 16;

/// Remote store backed by PostgREST for reads and writes and by the realtime
/// channel of the same table for live updates.
#[derive(Clone)]
pub struct PostgrestRemoteStore {
    postgrest: PostgrestClient,
    realtime: RealtimeClient,
    collection: String,
    schema: String,
}

impl PostgrestRemoteStore {
    /// 新しいリモートストアを作成
    pub fn new(url: &str, key: &str, http_client: Client, options: &LedgerOptions) -> Result<Self, Error> {
        let mut postgrest =
            PostgrestClient::new(url, key, &options.collection, http_client).with_auth(key)?;
        if options.db_schema != "public" {
            postgrest = postgrest.schema(&options.db_schema)?;
        }
        let realtime = RealtimeClient::new_with_options(url, key, options.realtime.clone());
        Ok(Self::from_clients(postgrest, realtime, &options.db_schema))
    }

    /// Assembles the store from preconfigured clients. The collection is the
    /// PostgREST client's table.
    pub fn from_clients(postgrest: PostgrestClient, realtime: RealtimeClient, schema: &str) -> Self {
        Self {
            collection: postgrest.table().to_string(),
            postgrest,
            realtime,
            schema: schema.to_string(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Uses a signed-in user's token for subsequent requests and subscriptions.
    pub async fn set_auth(&mut self, token: &str) -> Result<(), Error> {
        self.postgrest = self.postgrest.clone().with_auth(token)?;
        self.realtime.set_auth(Some(token.to_string())).await;
        Ok(())
    }
}

async fn fetch_all(postgrest: &PostgrestClient) -> Result<Vec<ExpenseRecord>, Error> {
    Ok(postgrest.clone().select("*").execute::<ExpenseRecord>().await?)
}

fn returned_id(body: &Value) -> Option<String> {
    let row = match body {
        Value::Array(rows) => rows.first()?,
        Value::Object(_) => body,
        _ => return None,
    };
    match row.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

// Re-lists the table into one snapshot event; false when the feed should stop.
async fn push_snapshot(postgrest: &PostgrestClient, tx: &mpsc::Sender<RemoteEvent>) -> bool {
    match fetch_all(postgrest).await {
        Ok(records) => {
            debug!("Delivering snapshot of {} record(s)", records.len());
            tx.send(RemoteEvent::Snapshot(records)).await.is_ok()
        }
        Err(e) => {
            warn!("Snapshot refresh failed: {}", e);
            let _ = tx.send(RemoteEvent::Error(e.to_string())).await;
            false
        }
    }
}

async fn run_feed(
    postgrest: PostgrestClient,
    mut changes: ChangeStream,
    tx: mpsc::Sender<RemoteEvent>,
) {
    if push_snapshot(&postgrest, &tx).await {
        loop {
            match changes.next().await {
                Some(Ok(change)) => {
                    debug!("Change {:?} on {}", change.kind, changes.topic());
                    if !push_snapshot(&postgrest, &tx).await {
                        break;
                    }
                }
                Some(Err(e)) => {
                    let _ = tx.send(RemoteEvent::Error(e.to_string())).await;
                    break;
                }
                None => {
                    let _ = tx
                        .send(RemoteEvent::Error("realtime stream ended".to_string()))
                        .await;
                    break;
                }
            }
        }
    }
    changes.close();
}

#[async_trait]
impl RemoteStore for PostgrestRemoteStore {
    async fn write(&self, record: &ExpenseRecord) -> Result<String, Error> {
        let body = self.postgrest.insert(record).await?;
        let id = returned_id(&body)
            .ok_or_else(|| Error::remote("insert response did not include an id"))?;
        debug!("Inserted expense {} into {}", id, self.collection);
        Ok(id)
    }

    async fn update(&self, id: &str, record: &ExpenseRecord) -> Result<(), Error> {
        self.postgrest.clone().eq("id", id).update(record).await?;
        debug!("Updated expense {} in {}", id, self.collection);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), Error> {
        self.postgrest.clone().eq("id", id).delete().await?;
        debug!("Deleted expense {} from {}", id, self.collection);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ExpenseRecord>, Error> {
        fetch_all(&self.postgrest).await
    }

    async fn subscribe(&self) -> Result<RemoteSubscription, Error> {
        let changes = self
            .realtime
            .subscribe(DatabaseChanges::new(&self.collection).schema(&self.schema))
            .await?;
        info!("Live feed open for {}.{}", self.schema, self.collection);

        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let task = tokio::spawn(run_feed(self.postgrest.clone(), changes, tx));
        Ok(RemoteSubscription::new(rx, task))
    }
}
