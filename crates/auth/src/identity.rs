//! Active user resolution

use log::warn;
use serde::Deserialize;
use std::sync::Arc;

use crate::session::SessionStore;
use crate::AuthOptions;

#[derive(Deserialize)]
struct StoredIdentity {
    id: serde_json::Value,
}

/// Resolves the active user id from the persisted session record.
///
/// The resolver never caches: every call reads the session store, so a
/// sign-out is visible to the next query without any notification.
#[derive(Clone)]
pub struct IdentityResolver {
    session: Arc<dyn SessionStore>,
    current_user_key: String,
}

impl IdentityResolver {
    pub fn new(session: Arc<dyn SessionStore>, options: &AuthOptions) -> Self {
        Self {
            session,
            current_user_key: options.current_user_key.clone(),
        }
    }

    /// 現在のユーザーIDを取得
    ///
    /// Returns `None` when nobody is signed in or the session record cannot be
    /// read. Callers treat `None` as the anonymous scope.
    pub async fn current_user_id(&self) -> Option<String> {
        let raw = match self.session.get(&self.current_user_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read session key '{}': {}", self.current_user_key, e);
                return None;
            }
        };
        parse_user_id(&raw)
    }
}

/// Accepts a serialised user object or, for older sessions, a bare id.
fn parse_user_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<StoredIdentity>(trimmed) {
        Ok(StoredIdentity {
            id: serde_json::Value::String(id),
        }) if !id.trim().is_empty() => Some(id),
        Ok(StoredIdentity {
            id: serde_json::Value::Number(n),
        }) => Some(n.to_string()),
        Ok(_) => {
            warn!("Session user record has no usable id");
            None
        }
        Err(_) => match serde_json::from_str::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::String(id)) if !id.is_empty() => Some(id),
            Ok(serde_json::Value::Number(n)) => Some(n.to_string()),
            Ok(_) => {
                warn!("Session user record is not a user object");
                None
            }
            Err(_) if !trimmed.starts_with('{') => Some(trimmed.to_string()),
            Err(e) => {
                warn!("Session user record is unreadable: {}", e);
                None
            }
        },
    }
}
