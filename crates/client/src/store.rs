//! Durable credential storage.
//!
//! The session engine keeps exactly two strings across restarts: the access
//! token and (optionally) the refresh token. Storage technology is hidden
//! behind [`CredentialStore`]; the session manager is its only writer.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Store key of the access token.
pub const ACCESS_TOKEN_KEY: &str = "token";
/// Store key of the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("credential store I/O error: {0}")]
    Io(String),
    #[error("credential store serialization error: {0}")]
    Serialize(String),
}

/// Synchronous key-value storage that survives process restarts.
///
/// No atomicity across keys is assumed: callers must cope with one key being
/// present without the other.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Credential pair
// ─────────────────────────────────────────────────────────────────────────────

/// Access token plus the optional refresh token issued with it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Read the stored pair. `None` when no access token is stored.
    pub fn load(store: &dyn CredentialStore) -> Option<Self> {
        let access_token = store.get(ACCESS_TOKEN_KEY)?;
        Some(Self::new(access_token, store.get(REFRESH_TOKEN_KEY)))
    }

    /// Write both keys. A pair without refresh token removes any stale one.
    pub fn persist(&self, store: &dyn CredentialStore) -> Result<(), StoreError> {
        store.set(ACCESS_TOKEN_KEY, &self.access_token)?;
        match &self.refresh_token {
            Some(refresh_token) => store.set(REFRESH_TOKEN_KEY, refresh_token),
            None => store.remove(REFRESH_TOKEN_KEY),
        }
    }
}

impl core::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"<redacted>")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Remove both keys. Both removals are attempted; the first error is returned.
pub fn clear_credentials(store: &dyn CredentialStore) -> Result<(), StoreError> {
    let access = store.remove(ACCESS_TOKEN_KEY);
    let refresh = store.remove(REFRESH_TOKEN_KEY);
    access.and(refresh)
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory store
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local store, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File-backed store
// ─────────────────────────────────────────────────────────────────────────────

/// JSON file store under the OS data directory.
///
/// The whole map is rewritten on each change through a temporary file and a
/// rename, so a crash never leaves a half-written file behind. A missing,
/// unreadable or corrupt file is treated as empty.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileCredentialStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Io(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let entries = read_entries(&path);
        tracing::debug!(path = %path.display(), keys = entries.len(), "opened credential store");

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Open the store at [`default_credentials_path`].
    pub fn open_default() -> anyhow::Result<Self> {
        let path = default_credentials_path()?;
        Self::open(&path)
            .with_context(|| format!("failed to open credential store at {:?}", path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = entries.clone();
        change(&mut next);
        if next == *entries {
            return Ok(());
        }
        write_entries(&self.path, &next)?;
        *entries = next;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

fn read_entries(path: &Path) -> BTreeMap<String, String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(err) => {
            tracing::warn!(path = %path.display(), "credential store unreadable, starting empty: {err}");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(path = %path.display(), "credential store corrupt, starting empty: {err}");
            BTreeMap::new()
        }
    }
}

fn write_entries(path: &Path, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
    let payload =
        serde_json::to_vec_pretty(entries).map_err(|e| StoreError::Serialize(e.to_string()))?;

    let tmp = path.with_extension("tmp");
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options
        .open(&tmp)
        .map_err(|e| StoreError::Io(format!("failed to open {}: {e}", tmp.display())))?;
    file.write_all(&payload)
        .and_then(|()| file.sync_all())
        .map_err(|e| StoreError::Io(format!("failed to write {}: {e}", tmp.display())))?;
    drop(file);

    std::fs::rename(&tmp, path)
        .map_err(|e| StoreError::Io(format!("failed to replace {}: {e}", path.display())))
}

/// `<data dir>/storefront/credentials.json`.
pub fn default_credentials_path() -> anyhow::Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?;

    let mut path = base;
    path.push("storefront");
    path.push("credentials.json");
    Ok(path)
}
