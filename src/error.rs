//! Error handling for the expense ledger

use piggy_ledger_auth::AuthError;
use piggy_ledger_postgrest::PostgrestError;
use piggy_ledger_realtime::RealtimeError;
use std::fmt;
use thiserror::Error;

/// Unified error type for the ledger core
#[derive(Error, Debug)]
pub enum Error {
    /// A required field is missing; raised before any I/O
    #[error("Validation error: {0}")]
    Validation(String),

    /// No record with this id in the current snapshot
    #[error("Expense not found: {0}")]
    NotFound(String),

    /// The remote store could not be reached or refused the request
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// The local store could not be read or written
    #[error("Local persistence error: {0}")]
    LocalPersistence(String),

    /// Live subscription misuse or failure
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session and account errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    pub fn validation<T: fmt::Display>(msg: T) -> Self {
        Error::Validation(msg.to_string())
    }

    pub fn not_found<T: fmt::Display>(id: T) -> Self {
        Error::NotFound(id.to_string())
    }

    pub fn remote<T: fmt::Display>(msg: T) -> Self {
        Error::RemoteUnavailable(msg.to_string())
    }

    pub fn local<T: fmt::Display>(msg: T) -> Self {
        Error::LocalPersistence(msg.to_string())
    }

    pub fn subscription<T: fmt::Display>(msg: T) -> Self {
        Error::Subscription(msg.to_string())
    }

    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }
}

impl From<PostgrestError> for Error {
    fn from(err: PostgrestError) -> Self {
        Error::RemoteUnavailable(err.to_string())
    }
}

impl From<RealtimeError> for Error {
    fn from(err: RealtimeError) -> Self {
        Error::RemoteUnavailable(err.to_string())
    }
}
