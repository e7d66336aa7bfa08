//! Ledger store
//!
//! Writes go to the remote store first and are mirrored into the local
//! store; when the remote cannot be reached the local store takes the write
//! alone. The in-memory working set is what [`LedgerStore::snapshot`] reads
//! and what the sync subscriber replaces wholesale.

use chrono::Utc;
use log::{debug, info, warn};
use piggy_ledger_auth::{IdentityResolver, SessionStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::LedgerOptions;
use crate::error::Error;
use crate::expense::{
    sort_newest_first, Expense, ExpenseDraft, ExpensePatch, ExpenseRecord, PaymentMethod,
    RecordOrigin,
};
use crate::store::{LocalStore, RemoteStore};

/// 家計簿ストア
#[derive(Clone)]
pub struct LedgerStore {
    remote: Arc<dyn RemoteStore>,
    local: LocalStore,
    identity: IdentityResolver,
    anonymous_user_id: String,
    working_set: Arc<RwLock<Vec<Expense>>>,
}

impl LedgerStore {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        session: Arc<dyn SessionStore>,
        options: &LedgerOptions,
    ) -> Self {
        let local = LocalStore::new(session.clone(), &options.local_key);
        Self::with_local(remote, local, session, options)
    }

    /// Builds a ledger over an existing local store, sharing its write lock
    /// with every other ledger that holds a clone of it.
    pub fn with_local(
        remote: Arc<dyn RemoteStore>,
        local: LocalStore,
        session: Arc<dyn SessionStore>,
        options: &LedgerOptions,
    ) -> Self {
        Self {
            remote,
            local,
            identity: IdentityResolver::new(session, &options.auth),
            anonymous_user_id: options.anonymous_user_id.clone(),
            working_set: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub(crate) fn remote(&self) -> Arc<dyn RemoteStore> {
        self.remote.clone()
    }

    pub fn anonymous_user_id(&self) -> &str {
        &self.anonymous_user_id
    }

    /// Owner tag queries are scoped to: the signed-in user, else the anonymous tag.
    pub async fn scope(&self) -> String {
        self.identity
            .current_user_id()
            .await
            .unwrap_or_else(|| self.anonymous_user_id.clone())
    }

    /// 支出を追加
    ///
    /// Only validation and local storage failures reach the caller; a remote
    /// failure leaves the record in the local store tagged as local.
    pub async fn create(&self, draft: ExpenseDraft) -> Result<Expense, Error> {
        let (title, amount, category) = draft.validate()?;
        let mut expense = Expense {
            id: String::new(),
            title,
            amount,
            payment_method: draft.payment_method,
            category,
            user_id: self.scope().await,
            created_at: Some(Utc::now()),
            origin: RecordOrigin::Remote,
        };

        match self.remote.write(&ExpenseRecord::from_expense(&expense)).await {
            Ok(id) => {
                expense.id = id;
                info!("Created expense {} for {}", expense.id, expense.user_id);
                if let Err(e) = self.local.put(ExpenseRecord::from_expense(&expense)).await {
                    warn!("Local mirror of expense {} failed: {}", expense.id, e);
                }
            }
            Err(e) => {
                expense.id = format!("local-{}", Uuid::new_v4());
                expense.origin = RecordOrigin::Local;
                warn!(
                    "Remote write failed ({}); keeping expense {} locally",
                    e, expense.id
                );
                self.local.put(ExpenseRecord::from_expense(&expense)).await?;
            }
        }

        self.upsert(expense.clone()).await;
        Ok(expense)
    }

    /// 支出を更新
    ///
    /// Records that only exist locally are updated in the local store only.
    pub async fn update(&self, id: &str, patch: ExpensePatch) -> Result<Expense, Error> {
        let current = self.get(id).await.ok_or_else(|| Error::not_found(id))?;
        let updated = patch.apply(&current)?;
        let record = ExpenseRecord::from_expense(&updated);

        match updated.origin {
            RecordOrigin::Remote => match self.remote.update(id, &record).await {
                Ok(()) => {
                    info!("Updated expense {}", id);
                    if let Err(e) = self.local.put(record).await {
                        warn!("Local mirror of expense {} failed: {}", id, e);
                    }
                }
                Err(e) => {
                    warn!("Remote update of {} failed ({}); updated locally only", id, e);
                    self.local.put(record).await?;
                }
            },
            RecordOrigin::Local => {
                debug!("Expense {} is local-only; skipping remote update", id);
                self.local.put(record).await?;
            }
        }

        self.upsert(updated.clone()).await;
        Ok(updated)
    }

    /// 支出を削除
    ///
    /// The local copy is removed whatever the remote outcome. If the remote
    /// delete fails the record can come back with the next full sync.
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        let current = self.get(id).await.ok_or_else(|| Error::not_found(id))?;

        if current.origin == RecordOrigin::Remote {
            if let Err(e) = self.remote.delete(id).await {
                warn!(
                    "Remote delete of {} failed ({}); it may reappear on the next sync",
                    id, e
                );
            }
        } else {
            debug!("Expense {} is local-only; skipping remote delete", id);
        }

        self.local.remove(id).await?;
        self.working_set.write().await.retain(|e| e.id != id);
        info!("Deleted expense {}", id);
        Ok(())
    }

    /// The active user's records, newest first.
    pub async fn snapshot(&self) -> Vec<Expense> {
        let scope = self.scope().await;
        let mut expenses: Vec<Expense> = self
            .working_set
            .read()
            .await
            .iter()
            .filter(|e| e.user_id == scope)
            .cloned()
            .collect();
        sort_newest_first(&mut expenses);
        expenses
    }

    /// A record of the active user by id.
    pub async fn get(&self, id: &str) -> Option<Expense> {
        let scope = self.scope().await;
        self.working_set
            .read()
            .await
            .iter()
            .find(|e| e.id == id && e.user_id == scope)
            .cloned()
    }

    /// Swaps the whole working set.
    pub(crate) async fn replace_working_set(&self, expenses: Vec<Expense>) {
        let mut working_set = self.working_set.write().await;
        debug!(
            "Working set replaced ({} -> {} records)",
            working_set.len(),
            expenses.len()
        );
        *working_set = expenses;
    }

    async fn upsert(&self, expense: Expense) {
        let mut working_set = self.working_set.write().await;
        match working_set.iter_mut().find(|e| e.id == expense.id) {
            Some(existing) => *existing = expense,
            None => working_set.push(expense),
        }
    }
}

/// 支払い方法別の一覧
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentBreakdown {
    pub cash: Vec<Expense>,
    pub credit_card: Vec<Expense>,
    pub debit_card: Vec<Expense>,
}

impl PaymentBreakdown {
    pub fn get(&self, method: PaymentMethod) -> &[Expense] {
        match method {
            PaymentMethod::Cash => &self.cash,
            PaymentMethod::CreditCard => &self.credit_card,
            PaymentMethod::DebitCard => &self.debit_card,
        }
    }

    pub fn total(&self, method: PaymentMethod) -> f64 {
        self.get(method).iter().map(|e| e.amount).sum()
    }
}

/// Groups a snapshot per payment method, each group newest first.
pub fn partition_by_payment_method(snapshot: &[Expense]) -> PaymentBreakdown {
    let mut breakdown = PaymentBreakdown::default();
    for expense in snapshot {
        let group = match expense.payment_method {
            PaymentMethod::Cash => &mut breakdown.cash,
            PaymentMethod::CreditCard => &mut breakdown.credit_card,
            PaymentMethod::DebitCard => &mut breakdown.debit_card,
        };
        group.push(expense.clone());
    }
    sort_newest_first(&mut breakdown.cash);
    sort_newest_first(&mut breakdown.credit_card);
    sort_newest_first(&mut breakdown.debit_card);
    breakdown
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expense::Category;
    use crate::store::MemoryRemoteStore;
    use chrono::{TimeZone, Utc};
    use piggy_ledger_auth::MemorySessionStore;

    fn setup() -> (Arc<MemoryRemoteStore>, Arc<MemorySessionStore>, LedgerStore) {
        let remote = Arc::new(MemoryRemoteStore::new());
        let session = Arc::new(MemorySessionStore::new());
        let ledger = LedgerStore::new(remote.clone(), session.clone(), &LedgerOptions::default());
        (remote, session, ledger)
    }

    fn coffee() -> ExpenseDraft {
        ExpenseDraft::new("Coffee", 4.5).with_category(Category::Food)
    }

    #[tokio::test]
    async fn test_create_writes_remote_and_mirrors_locally() {
        let (remote, _session, ledger) = setup();
        let expense = ledger.create(coffee()).await.unwrap();

        assert!(expense.id.starts_with("mem-"));
        assert_eq!(expense.user_id, "anonymous");
        assert_eq!(expense.origin, RecordOrigin::Remote);
        assert_eq!(remote.records().len(), 1);

        let local = ledger.local().list().await.unwrap();
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].id.as_deref(), Some(expense.id.as_str()));
        assert_eq!(local[0].origin, None);
    }

    #[tokio::test]
    async fn test_validation_happens_before_io() {
        let (remote, _session, ledger) = setup();
        remote.set_online(false);
        let result = ledger.create(ExpenseDraft::new("", 1.0)).await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(ledger.local().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_create_falls_back_to_local() {
        let (remote, _session, ledger) = setup();
        remote.set_online(false);

        let expense = ledger.create(coffee()).await.unwrap();
        assert!(expense.id.starts_with("local-"));
        assert!(expense.is_local());
        assert!(remote.records().is_empty());

        let local = ledger.local().list().await.unwrap();
        assert_eq!(local[0].origin.as_deref(), Some("local"));
        assert_eq!(ledger.snapshot().await, vec![expense]);
    }

    #[tokio::test]
    async fn test_local_failure_on_fallback_is_surfaced() {
        let (remote, session, ledger) = setup();
        remote.set_online(false);
        session.set("expenses", "{corrupt").await.unwrap();

        let result = ledger.create(coffee()).await;
        assert!(matches!(result, Err(Error::LocalPersistence(_))));
        assert!(ledger.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_mirror_failure_is_not_surfaced() {
        let (remote, session, ledger) = setup();
        session.set("expenses", "{corrupt").await.unwrap();

        let expense = ledger.create(coffee()).await.unwrap();
        assert_eq!(remote.records().len(), 1);
        assert_eq!(ledger.snapshot().await, vec![expense]);
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_id() {
        let (_remote, _session, ledger) = setup();
        assert!(matches!(
            ledger.update("missing", ExpensePatch::new().with_amount(1.0)).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(ledger.delete("missing").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_remote_update_failure_keeps_local_copy() {
        let (remote, _session, ledger) = setup();
        let expense = ledger.create(coffee()).await.unwrap();
        remote.set_online(false);

        let updated = ledger
            .update(&expense.id, ExpensePatch::new().with_amount(6.0))
            .await
            .unwrap();
        assert_eq!(updated.amount, 6.0);
        assert_eq!(updated.origin, RecordOrigin::Remote);
        assert_eq!(remote.records()[0].amount, 4.5);
        assert_eq!(ledger.local().list().await.unwrap()[0].amount, 6.0);
    }

    #[tokio::test]
    async fn test_delete_local_only_record_skips_remote() {
        let (remote, _session, ledger) = setup();
        remote.set_online(false);
        let expense = ledger.create(coffee()).await.unwrap();
        remote.set_online(true);

        ledger.delete(&expense.id).await.unwrap();
        assert!(ledger.snapshot().await.is_empty());
        assert!(ledger.local().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_delete_failure_still_removes_locally() {
        let (remote, _session, ledger) = setup();
        let expense = ledger.create(coffee()).await.unwrap();
        remote.set_online(false);

        ledger.delete(&expense.id).await.unwrap();
        assert!(ledger.snapshot().await.is_empty());
        assert!(ledger.local().list().await.unwrap().is_empty());
        // Still on the remote; the next full sync brings it back.
        assert_eq!(remote.records().len(), 1);
    }

    #[tokio::test]
    async fn test_scope_follows_session() {
        let (_remote, session, ledger) = setup();
        session.set("currentUser", r#"{"id":"alice"}"#).await.unwrap();
        let expense = ledger.create(coffee()).await.unwrap();
        assert_eq!(expense.user_id, "alice");
        assert!(ledger.get(&expense.id).await.is_some());

        session.set("currentUser", r#"{"id":"bob"}"#).await.unwrap();
        assert!(ledger.snapshot().await.is_empty());
        assert!(ledger.get(&expense.id).await.is_none());
        assert!(matches!(
            ledger.delete(&expense.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_partition_by_payment_method() {
        let at = |h| Some(Utc.with_ymd_and_hms(2024, 3, 10, h, 0, 0).unwrap());
        let make = |id: &str, method, h| Expense {
            id: id.to_string(),
            title: id.to_string(),
            amount: 2.0,
            payment_method: method,
            category: Category::Other,
            user_id: "u".to_string(),
            created_at: at(h),
            origin: RecordOrigin::Remote,
        };
        let snapshot = vec![
            make("c1", PaymentMethod::Cash, 8),
            make("d1", PaymentMethod::DebitCard, 9),
            make("c2", PaymentMethod::Cash, 10),
        ];
        let breakdown = partition_by_payment_method(&snapshot);
        let cash: Vec<&str> = breakdown.cash.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(cash, vec!["c2", "c1"]);
        assert!(breakdown.credit_card.is_empty());
        assert_eq!(breakdown.get(PaymentMethod::DebitCard).len(), 1);
        assert_eq!(breakdown.total(PaymentMethod::Cash), 4.0);
    }
}
