use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Error;
use crate::types::{AccessToken, RefreshToken, Session, UserProfile};

/// Storage key of the current access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Storage key of the current refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// Storage key of the JSON-serialized user profile.
pub const USER_KEY: &str = "user";
/// Pre-SSO single token key. Read as a bearer fallback, never written.
pub const LEGACY_TOKEN_KEY: &str = "auth_token";

/// Durable string key-value storage, shaped like the browser's `localStorage`.
///
/// Implementations must be safe to share; callers do not coordinate writes
/// (last write wins).
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Unreadable storage reads as absent.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value.
    fn set(&self, key: &str, value: &str) -> Result<(), Error>;

    /// Delete a value. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), Error>;
}

/// In-memory store, for tests and hosts without durable storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Store backed by a JSON object in a single file.
///
/// The file is re-read on every access so that other processes' writes are
/// observed; writes go through a temporary file and a rename.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Use `path` as the backing file. The file is created on first write.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<HashMap<String, String>, Error> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| Error::Storage(format!("corrupt store {}: {e}", self.path.display())))
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| Error::Storage(format!("failed to serialize store: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .and_then(|()| std::fs::rename(&tmp, &self.path))
            .map_err(|e| Error::Storage(format!("failed to write {}: {e}", self.path.display())))
    }

    fn update(&self, apply: impl FnOnce(&mut HashMap<String, String>)) -> Result<(), Error> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_all().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Discarding unreadable token store");
            HashMap::new()
        });
        apply(&mut entries);
        self.write_all(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.read_all() {
            Ok(mut entries) => entries.remove(key),
            Err(e) => {
                tracing::warn!(error = %e, key, "Token store read failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

/// Typed view over a [`KeyValueStore`] using the session's fixed keys.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    #[must_use]
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    /// A store over a fresh [`MemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        self.read(ACCESS_TOKEN_KEY).map(AccessToken::new)
    }

    /// Token to attach to outgoing requests: the access token, or the legacy
    /// token when no access token is stored.
    #[must_use]
    pub fn bearer_token(&self) -> Option<AccessToken> {
        self.access_token()
            .or_else(|| self.read(LEGACY_TOKEN_KEY).map(AccessToken::new))
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<RefreshToken> {
        self.read(REFRESH_TOKEN_KEY).map(RefreshToken::new)
    }

    /// Stored profile. A value that is not valid JSON reads as absent.
    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        let raw = self.read(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(error = %e, "Stored user profile is not valid JSON");
                None
            }
        }
    }

    /// Stored session, present when both an access token and a profile are.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        Some(Session {
            access_token: self.access_token()?,
            refresh_token: self.refresh_token(),
            user: self.user()?,
        })
    }

    pub fn save_session(&self, session: &Session) -> Result<(), Error> {
        let user = serde_json::to_string(&session.user)
            .map_err(|e| Error::Storage(format!("failed to serialize user: {e}")))?;
        self.inner
            .set(ACCESS_TOKEN_KEY, session.access_token.as_str())?;
        match &session.refresh_token {
            Some(refresh) => self.inner.set(REFRESH_TOKEN_KEY, refresh.as_str())?,
            None => self.inner.remove(REFRESH_TOKEN_KEY)?,
        }
        self.inner.set(USER_KEY, &user)
    }

    pub fn set_access_token(&self, token: &AccessToken) -> Result<(), Error> {
        self.inner.set(ACCESS_TOKEN_KEY, token.as_str())
    }

    /// Remove tokens and profile.
    pub fn clear(&self) -> Result<(), Error> {
        self.inner.remove(ACCESS_TOKEN_KEY)?;
        self.inner.remove(REFRESH_TOKEN_KEY)?;
        self.inner.remove(USER_KEY)
    }

    fn read(&self, key: &str) -> Option<String> {
        self.inner.get(key).filter(|v| !v.is_empty())
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}
