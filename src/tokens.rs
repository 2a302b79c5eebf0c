//! Persistent OAuth token material, keyed by provider name.

use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::Mutex,
};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{write_json_atomically, NotesError, Result};

/// Access/refresh token pair for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    /// True when the access token expires within `margin` of `now`
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at <= now + margin
    }
}

/// JSON document of tokens, rewritten atomically on every change.
pub struct TokenStore {
    path: PathBuf,
    tokens: Mutex<HashMap<String, StoredToken>>,
}

impl TokenStore {
    /// Opens the store at `path`, starting empty if the file does not exist
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tokens = if path.exists() {
            debug!("Loading OAuth tokens from {}", path.display());
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            HashMap::new()
        };

        Ok(TokenStore {
            path,
            tokens: Mutex::new(tokens),
        })
    }

    pub fn get(&self, provider: &str) -> Option<StoredToken> {
        self.tokens
            .lock()
            .ok()
            .and_then(|tokens| tokens.get(provider).cloned())
    }

    /// Stores `token` for `provider` and persists the whole document
    pub fn put(&self, provider: &str, token: StoredToken) -> Result<()> {
        let mut tokens = self.lock()?;
        let mut next = tokens.clone();
        next.insert(provider.to_string(), token);
        write_json_atomically(&self.path, &next)?;
        *tokens = next;
        info!("Stored OAuth token for provider '{}'", provider);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, StoredToken>>> {
        self.tokens
            .lock()
            .map_err(|_| NotesError::LockAcquisitionFailed {
                message: "Failed to acquire lock on token store".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(access: &str) -> StoredToken {
        StoredToken {
            access_token: access.to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    #[test]
    fn tokens_persist_across_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("tokens.json");

        let store = TokenStore::open(&path).unwrap();
        assert!(store.get("google").is_none());
        store.put("google", token("a1")).unwrap();
        store.put("google", token("a2")).unwrap();

        let reopened = TokenStore::open(&path).unwrap();
        assert_eq!(reopened.get("google").unwrap().access_token, "a2");
    }

    #[test]
    fn expiry_margin() {
        let now = Utc::now();
        let mut t = token("a");
        t.expires_at = now + Duration::seconds(30);
        assert!(t.expires_within(now, Duration::seconds(60)));
        assert!(!t.expires_within(now, Duration::seconds(10)));
    }
}
