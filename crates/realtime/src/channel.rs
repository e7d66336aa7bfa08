use crate::error::RealtimeError;
use crate::message::ChangeEvent;
use log::debug;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// データベース変更監視設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseChanges {
    schema: String,
    table: String,
}

impl DatabaseChanges {
    /// 新しいデータベース変更監視設定を作成
    pub fn new(table: &str) -> Self {
        Self {
            schema: "public".to_string(),
            table: table.to_string(),
        }
    }

    /// スキーマを設定
    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = schema.to_string();
        self
    }

    pub(crate) fn topic(&self) -> String {
        format!("realtime:{}:{}", self.schema, self.table)
    }

    // Every event on the table, unfiltered.
    pub(crate) fn join_payload(&self) -> Value {
        let change = json!({
            "event": "*",
            "schema": self.schema,
            "table": self.table,
        });
        json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [change]
            }
        })
    }
}

/// Row changes for one joined channel.
///
/// The stream yields `Err` once when the socket fails or the server closes
/// the channel, then ends. Dropping it closes the socket.
pub struct ChangeStream {
    topic: String,
    receiver: mpsc::Receiver<Result<ChangeEvent, RealtimeError>>,
    task: Option<JoinHandle<()>>,
}

impl ChangeStream {
    pub(crate) fn new(
        topic: String,
        receiver: mpsc::Receiver<Result<ChangeEvent, RealtimeError>>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            topic,
            receiver,
            task: Some(task),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// 次の変更を待つ。`None` はストリーム終了。
    pub async fn next(&mut self) -> Option<Result<ChangeEvent, RealtimeError>> {
        self.receiver.recv().await
    }

    /// ソケットを閉じる
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("Closing change stream for {}", self.topic);
            task.abort();
        }
        self.receiver.close();
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
