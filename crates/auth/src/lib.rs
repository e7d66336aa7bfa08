//! Session and identity layer for the Piggy Budget ledger
//!
//! This crate provides the key/value session store the app persists into,
//! the identity resolver that turns the stored session into an owner id,
//! and the local account registry that writes that session on sign-in.

mod accounts;
mod identity;
mod session;

use thiserror::Error;

pub use accounts::{LocalAccounts, User};
pub use identity::IdentityResolver;
pub use session::{FileSessionStore, MemorySessionStore, SessionStore};

/// エラー型
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Missing session")]
    MissingSession,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AuthError {
    pub fn validation<T: std::fmt::Display>(msg: T) -> Self {
        AuthError::Validation(msg.to_string())
    }

    pub fn storage<T: std::fmt::Display>(msg: T) -> Self {
        AuthError::Storage(msg.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        AuthError::Storage(err.to_string())
    }
}

/// 認証オプション
#[derive(Debug, Clone)]
pub struct AuthOptions {
    /// Session key holding the signed-in user
    pub current_user_key: String,
    /// Session key holding the registered users
    pub users_key: String,
    /// Minimum accepted password length on sign-up
    pub min_password_length: usize,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            current_user_key: "currentUser".to_string(),
            users_key: "users".to_string(),
            min_password_length: 6,
        }
    }
}

impl AuthOptions {
    pub fn with_current_user_key(mut self, key: &str) -> Self {
        self.current_user_key = key.to_string();
        self
    }

    pub fn with_users_key(mut self, key: &str) -> Self {
        self.users_key = key.to_string();
        self
    }

    pub fn with_min_password_length(mut self, len: usize) -> Self {
        self.min_password_length = len;
        self
    }
}
