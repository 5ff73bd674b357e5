//! Persistent key-value store for JSON-serialized records.
//!
//! DESIGN
//! ======
//! Values are opaque strings; callers own the serialization through
//! [`load_json`] and [`save_json`]. Every mutation rewrites the whole record.
//! There are no transactions and no cross-process locking: one active writer
//! per namespace is assumed.
//!
//! ERROR HANDLING
//! ==============
//! Reads never fail. A missing key is `None`; an unreadable file or a record
//! that does not parse is logged and also reported as `None`, so one corrupt
//! record cannot block startup. The next successful write overwrites it.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::ErrorCode;

/// Stored session record (`Session`).
pub const SESSION_KEY: &str = "auth_session";
/// Stored username -> role map.
pub const ROLES_KEY: &str = "user_roles";
/// Stored email -> registered user map.
pub const REGISTERED_USERS_KEY: &str = "registered_users";
/// Stored favorites array.
pub const FAVORITES_KEY: &str = "favorites";
/// Stored product id -> quantity map.
pub const CART_KEY: &str = "cart";
/// Stored free-text search term.
pub const SEARCH_KEY: &str = "search_term";

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
    #[error("failed to encode record {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage io error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

impl ErrorCode for StorageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "E_STORAGE_KEY",
            Self::Encode { .. } => "E_STORAGE_ENCODE",
            Self::Io { .. } => "E_STORAGE_IO",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

// =============================================================================
// STORE CONTRACT
// =============================================================================

/// Durable string-keyed storage of raw record values.
pub trait KvStore: Send + Sync {
    /// Raw value for `key`, or `None` when absent or unreadable.
    fn get(&self, key: &str) -> Option<String>;

    /// Replace the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the key is unusable or the write fails.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the key is unusable or the delete fails.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Load and decode the JSON record stored under `key`.
///
/// Malformed records are logged and reported as absent.
pub fn load_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str) -> Option<T> {
    let raw = store.get(key)?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "corrupt stored record treated as absent");
            None
        }
    }
}

/// Encode `value` as JSON and store it under `key`, replacing any prior record.
///
/// # Errors
///
/// Returns [`StorageError`] if encoding or the underlying write fails.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn KvStore, key: &str, value: &T) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|source| StorageError::Encode { key: key.to_owned(), source })?;
    store.set(key, &raw)
}

// =============================================================================
// IN-MEMORY BACKEND
// =============================================================================

/// Process-local store. Contents vanish with the instance; used for tests
/// and for embedding hosts that provide their own durability.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

// =============================================================================
// FILE BACKEND
// =============================================================================

/// Directory-backed store: one `<key>.json` file per record.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write leaves either the old or the new record, never a torn one.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir` as the record directory. It is created lazily on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        if validate_key(key).is_err() {
            warn!(key, "read with invalid storage key");
            return None;
        }
        match std::fs::read_to_string(self.record_path(key)) {
            Ok(raw) => Some(raw),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(key, error = %e, "unreadable stored record treated as absent");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let io_err = |source| StorageError::Io { key: key.to_owned(), source };
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        std::fs::write(&tmp, value).map_err(io_err)?;
        std::fs::rename(&tmp, self.record_path(key)).map_err(io_err)?;
        debug!(key, bytes = value.len(), "record written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        match std::fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { key: key.to_owned(), source }),
        }
    }
}

/// Keys become file names, so only a conservative alphabet is accepted.
fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid { Ok(()) } else { Err(StorageError::InvalidKey(key.to_owned())) }
}

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
