//! Piggy Budget expense ledger
//!
//! The ledger layer of a personal expense tracker: expense records persisted
//! to a remote PostgREST table with a local JSON fallback, a live sync of the
//! remote collection into an in-memory working set, and windowed spending
//! reports.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod expense;
pub mod ledger;
pub mod store;
pub mod sync;

use log::warn;
use reqwest::Client;
use std::sync::Arc;

pub use piggy_ledger_auth::{
    AuthError, AuthOptions, FileSessionStore, IdentityResolver, LocalAccounts, MemorySessionStore,
    SessionStore, User,
};

use crate::config::LedgerOptions;
use crate::error::Error;
use crate::ledger::LedgerStore;
use crate::store::{LocalStore, PostgrestRemoteStore, RemoteStore};
use crate::sync::SyncSubscriber;

/// The main entry point for the ledger client
pub struct PiggyLedger {
    /// The base URL of the backend project
    pub url: String,
    /// The anonymous API key of the backend project
    pub key: String,
    /// HTTP client used for requests
    pub http_client: Client,
    /// Client options
    pub options: LedgerOptions,
    session: Arc<dyn SessionStore>,
    local: LocalStore,
}

impl PiggyLedger {
    /// Create a new ledger client
    ///
    /// # Example
    ///
    /// ```
    /// use piggy_ledger::{MemorySessionStore, PiggyLedger};
    /// use std::sync::Arc;
    ///
    /// let piggy = PiggyLedger::new(
    ///     "https://your-project-url.supabase.co",
    ///     "your-anon-key",
    ///     Arc::new(MemorySessionStore::new()),
    /// );
    /// ```
    pub fn new(url: &str, key: &str, session: Arc<dyn SessionStore>) -> Self {
        Self::new_with_options(url, key, session, LedgerOptions::default())
    }

    /// Create a new ledger client with custom options
    pub fn new_with_options(
        url: &str,
        key: &str,
        session: Arc<dyn SessionStore>,
        options: LedgerOptions,
    ) -> Self {
        let mut builder = Client::builder();
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().unwrap_or_else(|e| {
            warn!("Falling back to default HTTP client: {}", e);
            Client::new()
        });

        let local = LocalStore::new(session.clone(), &options.local_key);

        Self {
            url: url.to_string(),
            key: key.to_string(),
            http_client,
            options,
            session,
            local,
        }
    }

    pub fn session(&self) -> Arc<dyn SessionStore> {
        self.session.clone()
    }

    /// The local store shared by every ledger this client hands out
    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    /// The remote store for the configured collection
    pub fn remote(&self) -> Result<PostgrestRemoteStore, Error> {
        PostgrestRemoteStore::new(&self.url, &self.key, self.http_client.clone(), &self.options)
    }

    /// Sign-up, sign-in and sign-out against the session store
    pub fn accounts(&self) -> LocalAccounts {
        LocalAccounts::new(self.session.clone(), self.options.auth.clone())
    }

    pub fn identity(&self) -> IdentityResolver {
        IdentityResolver::new(self.session.clone(), &self.options.auth)
    }

    /// A ledger backed by the remote store
    pub fn ledger(&self) -> Result<LedgerStore, Error> {
        Ok(self.ledger_with(Arc::new(self.remote()?)))
    }

    /// A ledger backed by any remote store implementation
    pub fn ledger_with(&self, remote: Arc<dyn RemoteStore>) -> LedgerStore {
        LedgerStore::with_local(remote, self.local.clone(), self.session.clone(), &self.options)
    }

    /// A sync subscriber feeding `ledger`
    pub fn subscriber(&self, ledger: &LedgerStore) -> SyncSubscriber {
        SyncSubscriber::new(ledger.clone())
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::aggregate::{aggregate, Report, Window};
    pub use crate::config::LedgerOptions;
    pub use crate::error::Error;
    pub use crate::expense::{Category, Expense, ExpenseDraft, ExpensePatch, PaymentMethod};
    pub use crate::ledger::{partition_by_payment_method, LedgerStore};
    pub use crate::store::{MemoryRemoteStore, RemoteStore};
    pub use crate::sync::{SyncState, SyncSubscriber};
    pub use crate::PiggyLedger;
}
