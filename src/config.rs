//! Configuration options for the ledger client

use piggy_ledger_auth::AuthOptions;
use piggy_ledger_realtime::RealtimeClientOptions;
use std::time::Duration;

/// Configuration options for the ledger client
#[derive(Debug, Clone)]
pub struct LedgerOptions {
    /// Remote collection (table) holding expense records
    pub collection: String,

    /// The database schema
    pub db_schema: String,

    /// Session store key of the locally cached record list
    pub local_key: String,

    /// Owner tag used when no user is signed in
    pub anonymous_user_id: String,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    pub auth: AuthOptions,

    pub realtime: RealtimeClientOptions,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            collection: "expenses".to_string(),
            db_schema: "public".to_string(),
            local_key: "expenses".to_string(),
            anonymous_user_id: "anonymous".to_string(),
            request_timeout: Some(Duration::from_secs(30)),
            auth: AuthOptions::default(),
            realtime: RealtimeClientOptions::default(),
        }
    }
}

impl LedgerOptions {
    /// Set the remote collection name
    pub fn with_collection(mut self, value: &str) -> Self {
        self.collection = value.to_string();
        self
    }

    /// Set the database schema
    pub fn with_db_schema(mut self, value: &str) -> Self {
        self.db_schema = value.to_string();
        self
    }

    /// Set the local record list key
    pub fn with_local_key(mut self, value: &str) -> Self {
        self.local_key = value.to_string();
        self
    }

    /// Set the anonymous owner tag
    pub fn with_anonymous_user_id(mut self, value: &str) -> Self {
        self.anonymous_user_id = value.to_string();
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    pub fn with_auth_options(mut self, value: AuthOptions) -> Self {
        self.auth = value;
        self
    }

    pub fn with_realtime_options(mut self, value: RealtimeClientOptions) -> Self {
        self.realtime = value;
        self
    }
}
