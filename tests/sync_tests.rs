use piggy_ledger::expense::ExpenseRecord;
use piggy_ledger::prelude::*;
use piggy_ledger::{MemorySessionStore, SessionStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn record(value: serde_json::Value) -> ExpenseRecord {
    serde_json::from_value(value).unwrap()
}

async fn wait_for(rx: &mut watch::Receiver<SyncState>, wanted: SyncState) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while *rx.borrow_and_update() != wanted {
            if rx.changed().await.is_err() {
                break;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("sync never reached {:?}", wanted));
}

async fn wait_until<F>(ledger: &LedgerStore, mut done: F)
where
    F: FnMut(&[Expense]) -> bool,
{
    for _ in 0..100 {
        if done(&ledger.snapshot().await) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("snapshot condition not met");
}

fn setup(
    seed: Vec<ExpenseRecord>,
) -> (Arc<MemoryRemoteStore>, Arc<MemorySessionStore>, LedgerStore) {
    let remote = Arc::new(MemoryRemoteStore::with_records(seed));
    let session = Arc::new(MemorySessionStore::new());
    let ledger = PiggyLedger::new("http://localhost:54321", "anon-key", session.clone())
        .ledger_with(remote.clone());
    (remote, session, ledger)
}

#[tokio::test]
async fn test_live_snapshot_is_filtered_and_sorted() {
    let (_remote, session, ledger) = setup(vec![
        record(json!({ "id": "1", "title": "Old", "amount": 1, "userId": "alice",
                       "createdAt": "2024-03-01T08:00:00Z" })),
        record(json!({ "id": "2", "title": "Someone else", "amount": 2, "userId": "bob",
                       "createdAt": "2024-03-02T08:00:00Z" })),
        record(json!({ "id": "3", "title": "Undated", "amount": 3, "userId": "alice" })),
        record(json!({ "id": "4", "title": "New", "amount": 4, "userId": "alice",
                       "timestamp": 1709884800000i64 })),
    ]);
    session.set("currentUser", r#"{"id":"alice"}"#).await.unwrap();

    let mut sync = SyncSubscriber::new(ledger.clone());
    let mut rx = sync.watch_state();
    sync.start().await.unwrap();
    wait_for(&mut rx, SyncState::Live).await;

    let titles: Vec<String> = ledger.snapshot().await.into_iter().map(|e| e.title).collect();
    assert_eq!(titles, vec!["New", "Old", "Undated"]);
}

#[tokio::test]
async fn test_remote_changes_replace_working_set() {
    let (remote, _session, ledger) = setup(Vec::new());
    let mut sync = SyncSubscriber::new(ledger.clone());
    let mut rx = sync.watch_state();
    sync.start().await.unwrap();
    wait_for(&mut rx, SyncState::Live).await;

    // Another device adds a record.
    let id = remote
        .write(&record(json!({ "title": "From phone", "amount": 9, "userId": "anonymous",
                               "createdAt": "2024-03-05T10:00:00Z" })))
        .await
        .unwrap();
    wait_until(&ledger, |s| s.len() == 1).await;

    // And removes it again.
    remote.delete(&id).await.unwrap();
    wait_until(&ledger, |s| s.is_empty()).await;
}

#[tokio::test]
async fn test_feed_failure_degrades_to_local_without_retry() {
    let (remote, _session, ledger) = setup(Vec::new());
    let mut sync = SyncSubscriber::new(ledger.clone());
    let mut rx = sync.watch_state();
    sync.start().await.unwrap();
    wait_for(&mut rx, SyncState::Live).await;

    ledger
        .create(ExpenseDraft::new("Lunch", 11.0).with_category(Category::Food))
        .await
        .unwrap();
    wait_until(&ledger, |s| s.len() == 1).await;

    remote.fail_subscriptions("socket reset");
    wait_for(&mut rx, SyncState::Degraded).await;

    // Local mirror still serves the record.
    let snapshot = ledger.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].title, "Lunch");

    // No automatic resubscription: remote changes are not seen.
    remote
        .write(&record(json!({ "title": "Unseen", "amount": 1, "userId": "anonymous" })))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ledger.snapshot().await.len(), 1);
    assert_eq!(sync.state(), SyncState::Degraded);

    // An explicit restart goes live again.
    sync.start().await.unwrap();
    wait_for(&mut rx, SyncState::Live).await;
    wait_until(&ledger, |s| s.len() == 2).await;
}

#[tokio::test]
async fn test_stop_then_restart() {
    let (remote, _session, ledger) = setup(Vec::new());
    let mut sync = SyncSubscriber::new(ledger.clone());
    let mut rx = sync.watch_state();
    sync.start().await.unwrap();
    wait_for(&mut rx, SyncState::Live).await;

    sync.stop().await;
    assert_eq!(sync.state(), SyncState::Stopped);
    remote
        .write(&record(json!({ "title": "While stopped", "amount": 1, "userId": "anonymous" })))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(ledger.snapshot().await.is_empty());
    assert_eq!(sync.state(), SyncState::Stopped);

    sync.start().await.unwrap();
    wait_for(&mut rx, SyncState::Live).await;
    wait_until(&ledger, |s| s.len() == 1).await;
}

#[tokio::test]
async fn test_legacy_local_records_are_normalised_on_degrade() {
    let (remote, session, ledger) = setup(Vec::new());
    remote.set_online(false);
    session
        .set(
            "expenses",
            r#"[{"id":"1699999999999","title":"Snack","amount":"3.5","type":"Credit Card"}]"#,
        )
        .await
        .unwrap();

    let mut sync = SyncSubscriber::new(ledger.clone());
    sync.start().await.unwrap();
    assert_eq!(sync.state(), SyncState::Degraded);

    let snapshot = ledger.snapshot().await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].payment_method, PaymentMethod::CreditCard);
    assert_eq!(snapshot[0].category, Category::Other);
    assert_eq!(snapshot[0].amount, 3.5);
    assert_eq!(snapshot[0].created_at, None);
}
