use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use thiserror::Error;
use tracing::instrument;

/// Errors produced by key-value stores and the encrypting decorator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Requested key does not exist.
    #[error("entry not found for key: {key}")]
    NotFound { key: String },
    /// Underlying storage failure (read or write).
    #[error("storage failure: {reason}")]
    Storage { reason: String },
    /// The KMS client could not be constructed.
    #[error("kms connection failed: {reason}")]
    Connection { reason: String },
    /// The KMS refused or failed to encrypt a value.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },
    /// The KMS refused or failed to decrypt a value.
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },
    /// The wrapped backend failed its own liveness check.
    #[error("test of backend store failed: {reason}")]
    BackendTest { reason: String },
    /// Encrypt followed by decrypt did not return the original bytes.
    #[error("encrypted and decrypted text doesn't match: exp: '{expected}', act: '{actual}'")]
    RoundTripMismatch { expected: String, actual: String },
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    ///
    /// Missing keys, construction failures and round-trip mismatches point at
    /// configuration problems (wrong key, inconsistent context) and are final.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            StoreError::NotFound { .. }
                | StoreError::Connection { .. }
                | StoreError::RoundTripMismatch { .. }
        )
    }
}

/// Key-value store contract shared by raw backends and decorators wrapping them.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Retrieve the bytes last stored under a key.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Persist a value under a key, overwriting any existing entry.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Backend-specific liveness check. Must not persist anything visible
    /// through `get`.
    async fn test(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store for tests and ephemeral sessions. Values are kept as-is;
/// wrap it in an encrypting decorator to keep plaintext out of it.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes held for a key, bypassing any decorator.
    pub fn raw(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>, StoreError> {
        self.inner.lock().map_err(|err| StoreError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    #[instrument(skip_all, fields(key = %key))]
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.lock()?
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn test(&self, key: &str) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_returns_bytes_unmodified() {
        let store = InMemoryStore::new();
        let key = "vault/root-token";
        let value = b"\x00\x01binary\xff";

        store.set(key, value).await.expect("set should succeed");
        let retrieved = store.get(key).await.expect("get should succeed");

        assert_eq!(retrieved, value);
        assert_eq!(store.raw(key).expect("raw").as_deref(), Some(&value[..]));
    }

    #[tokio::test]
    async fn set_overwrites_previous_value() {
        let store = InMemoryStore::new();
        store.set("k", b"first").await.expect("set");
        store.set("k", b"second").await.expect("set again");

        assert_eq!(store.get("k").await.expect("get"), b"second");
        assert_eq!(store.len().expect("len"), 1);
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.get("absent").await.expect_err("get should fail");
        assert_eq!(
            err,
            StoreError::NotFound {
                key: "absent".into()
            }
        );
    }

    #[tokio::test]
    async fn test_does_not_persist_anything() {
        let store = InMemoryStore::new();
        store.test("probe").await.expect("test should succeed");
        assert!(store.is_empty().expect("is_empty"));
    }

    #[tokio::test]
    async fn poisoned_lock_is_reported_not_hidden() {
        let store = InMemoryStore::new();
        store.set("k", b"v").await.expect("set");

        let clone = store.clone();
        std::thread::spawn(move || {
            let _guard = clone.inner.lock().unwrap();
            panic!("poison the lock");
        })
        .join()
        .expect_err("thread should panic");

        assert!(matches!(store.raw("k"), Err(StoreError::Storage { .. })));
        assert!(matches!(store.len(), Err(StoreError::Storage { .. })));
        assert!(matches!(store.is_empty(), Err(StoreError::Storage { .. })));
        assert!(matches!(
            store.test("k").await,
            Err(StoreError::Storage { .. })
        ));
    }

    #[test]
    fn round_trip_mismatch_is_final() {
        let err = StoreError::RoundTripMismatch {
            expected: "test".into(),
            actual: "tampered".into(),
        };
        assert!(!err.is_retryable());
        assert!(StoreError::Decryption {
            reason: "kms unreachable".into()
        }
        .is_retryable());
    }
}
