//! Live sync from the remote store into the ledger's working set

use log::{error, info, warn};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::Error;
use crate::expense::{normalize_records, sort_newest_first, Expense, ExpenseRecord};
use crate::ledger::LedgerStore;
use crate::store::{RemoteEvent, RemoteStore, RemoteSubscription};

/// 同期状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Subscribing,
    Live,
    Error,
    /// Serving the local store after the live feed failed.
    Degraded,
    Stopped,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// Shared by the subscriber and its feed task. Every publish and every state
// change after `start` happens under `gate`; `stop` closes it.
struct SyncContext {
    ledger: LedgerStore,
    gate: Arc<Mutex<bool>>,
    state: Arc<watch::Sender<SyncState>>,
}

impl SyncContext {
    fn set_state(&self, next: SyncState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!("Sync state {} -> {}", previous, next);
        }
    }

    async fn scoped(&self, records: Vec<ExpenseRecord>) -> Vec<Expense> {
        let scope = self.ledger.scope().await;
        let mut expenses = normalize_records(records, self.ledger.anonymous_user_id());
        expenses.retain(|e| e.user_id == scope);
        sort_newest_first(&mut expenses);
        expenses
    }

    /// False once the subscriber has been stopped.
    async fn publish_live(&self, records: Vec<ExpenseRecord>) -> bool {
        let expenses = self.scoped(records).await;
        let active = self.gate.lock().await;
        if !*active {
            return false;
        }
        self.ledger.replace_working_set(expenses).await;
        self.set_state(SyncState::Live);
        true
    }

    async fn degrade(&self, reason: &str) {
        let active = self.gate.lock().await;
        if !*active {
            return;
        }
        self.set_state(SyncState::Error);
        warn!("Live sync failed ({}); falling back to the local store", reason);

        match self.ledger.local().list().await {
            Ok(records) => {
                let expenses = self.scoped(records).await;
                self.ledger.replace_working_set(expenses).await;
            }
            Err(e) => error!("Local fallback unavailable, keeping current working set: {}", e),
        }
        self.set_state(SyncState::Degraded);
    }
}

async fn run_feed(ctx: SyncContext, mut subscription: RemoteSubscription) {
    loop {
        match subscription.next().await {
            Some(RemoteEvent::Snapshot(records)) => {
                if !ctx.publish_live(records).await {
                    break;
                }
            }
            Some(RemoteEvent::Error(reason)) => {
                ctx.degrade(&reason).await;
                break;
            }
            None => {
                ctx.degrade("remote feed ended").await;
                break;
            }
        }
    }
    subscription.close();
}

/// Keeps the ledger's working set in step with the remote collection.
///
/// A failed feed is not retried; call [`SyncSubscriber::start`] again to
/// re-subscribe.
pub struct SyncSubscriber {
    ledger: LedgerStore,
    state: Arc<watch::Sender<SyncState>>,
    gate: Option<Arc<Mutex<bool>>>,
    task: Option<JoinHandle<()>>,
}

impl SyncSubscriber {
    pub fn new(ledger: LedgerStore) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            ledger,
            state: Arc::new(state),
            gate: None,
            task: None,
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// 状態変化の通知を受け取る
    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Opens the live subscription.
    ///
    /// Rejected while a subscription is opening or live. A remote that cannot
    /// be subscribed to is not an error here: the subscriber degrades to the
    /// local store and reports it through its state.
    pub async fn start(&mut self) -> Result<(), Error> {
        let current = self.state();
        if matches!(current, SyncState::Subscribing | SyncState::Live) {
            return Err(Error::subscription(format!(
                "a live subscription is already {}",
                current
            )));
        }
        self.close_gate().await;

        let ctx = SyncContext {
            ledger: self.ledger.clone(),
            gate: Arc::new(Mutex::new(true)),
            state: self.state.clone(),
        };
        self.gate = Some(ctx.gate.clone());
        ctx.set_state(SyncState::Subscribing);

        match self.ledger.remote().subscribe().await {
            Ok(subscription) => {
                self.task = Some(tokio::spawn(run_feed(ctx, subscription)));
            }
            Err(e) => ctx.degrade(&e.to_string()).await,
        }
        Ok(())
    }

    /// Cancels the subscription. Nothing is published after this returns.
    pub async fn stop(&mut self) {
        self.close_gate().await;
        self.state.send_replace(SyncState::Stopped);
        info!("Sync stopped");
    }

    async fn close_gate(&mut self) {
        if let Some(gate) = self.gate.take() {
            *gate.lock().await = false;
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SyncSubscriber {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
