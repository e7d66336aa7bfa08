//! Local account registry
//!
//! Accounts live in the session store next to the session itself. Passwords
//! are stored as entered and compared verbatim; nothing here hashes them, and
//! consumers of the session record must not assume otherwise.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::session::SessionStore;
use crate::{AuthError, AuthOptions};

/// ユーザー情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    /// Trimmed and lower-cased on registration
    pub email: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

/// Sign-up, sign-in and sign-out against the session store
#[derive(Clone)]
pub struct LocalAccounts {
    session: Arc<dyn SessionStore>,
    options: AuthOptions,
}

impl LocalAccounts {
    pub fn new(session: Arc<dyn SessionStore>, options: AuthOptions) -> Self {
        Self { session, options }
    }

    /// 新規ユーザー登録
    ///
    /// Registers the account and signs it in.
    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<User, AuthError> {
        let name = name.trim();
        let email = email.trim().to_lowercase();
        if name.is_empty() || email.is_empty() || password.is_empty() || confirm_password.is_empty()
        {
            return Err(AuthError::validation("all fields are required"));
        }
        if password != confirm_password {
            return Err(AuthError::validation("passwords don't match"));
        }
        if password.chars().count() < self.options.min_password_length {
            return Err(AuthError::validation(format!(
                "password should be at least {} characters",
                self.options.min_password_length
            )));
        }

        let mut users = self.users().await?;
        if users.iter().any(|u| u.email.to_lowercase() == email) {
            return Err(AuthError::EmailTaken(email));
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            email,
            password: password.to_string(),
            created_at: Utc::now(),
        };
        users.push(user.clone());
        self.session
            .set(&self.options.users_key, &serde_json::to_string(&users)?)
            .await?;
        self.store_current(&user).await?;

        info!("Registered user {}", user.id);
        Ok(user)
    }

    /// メールアドレスとパスワードでサインイン
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::validation("email and password are required"));
        }

        let user = self
            .users()
            .await?
            .into_iter()
            .find(|u| u.email.to_lowercase() == email && u.password == password)
            .ok_or(AuthError::InvalidCredentials)?;

        self.store_current(&user).await?;
        info!("User {} signed in", user.id);
        Ok(user)
    }

    /// サインアウト
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.session.remove(&self.options.current_user_key).await?;
        info!("Signed out");
        Ok(())
    }

    /// 現在サインインしているユーザーを取得
    pub async fn current_user(&self) -> Result<User, AuthError> {
        let raw = self
            .session
            .get(&self.options.current_user_key)
            .await?
            .ok_or(AuthError::MissingSession)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn is_registered(&self, email: &str) -> Result<bool, AuthError> {
        let email = email.trim().to_lowercase();
        Ok(self
            .users()
            .await?
            .iter()
            .any(|u| u.email.to_lowercase() == email))
    }

    async fn users(&self) -> Result<Vec<User>, AuthError> {
        match self.session.get(&self.options.users_key).await? {
            Some(raw) if !raw.trim().is_empty() => serde_json::from_str(&raw).map_err(|e| {
                warn!("Stored user list is unreadable: {}", e);
                AuthError::SerializationError(e)
            }),
            _ => Ok(Vec::new()),
        }
    }

    async fn store_current(&self, user: &User) -> Result<(), AuthError> {
        self.session
            .set(&self.options.current_user_key, &serde_json::to_string(user)?)
            .await
    }
}
