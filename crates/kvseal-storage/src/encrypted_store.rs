use async_trait::async_trait;
use kvseal_core::{
    kms::{Kms, KmsConnect},
    storage::{KvStore, StoreError},
};
use tracing::{debug, instrument};

/// Context bound to every ciphertext this store produces.
pub const ENCRYPTION_CONTEXT: &str = "Tool:kvseal";

/// Plaintext round-tripped through the KMS by `test`.
const TEST_PLAINTEXT: &str = "test";

/// Decorator that encrypts values through a KMS before handing them to the
/// wrapped store, and decrypts them on the way back out.
///
/// Only ciphertext ever reaches `store`. The decorator itself implements
/// `KvStore`, so it can be wrapped again or used wherever a raw store is.
pub struct EncryptedStore<K: Kms, S: KvStore> {
    kms: K,
    key_id: String,
    store: S,
}

impl<K: Kms, S: KvStore> EncryptedStore<K, S> {
    /// Bind an existing KMS client, master key reference and raw store.
    /// The key reference is not validated until first use.
    pub fn new(kms: K, key_id: impl Into<String>, store: S) -> Self {
        Self {
            kms,
            key_id: key_id.into(),
            store,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn kms(&self) -> &K {
        &self.kms
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    async fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.kms
            .encrypt(plaintext, &self.key_id, ENCRYPTION_CONTEXT)
            .await
            .map_err(|e| StoreError::Encryption {
                reason: format!("{} kms: {e}", self.kms.name()),
            })
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, StoreError> {
        self.kms
            .decrypt(ciphertext, ENCRYPTION_CONTEXT)
            .await
            .map_err(|e| StoreError::Decryption {
                reason: format!("{} kms: {e}", self.kms.name()),
            })
    }
}

impl<K: KmsConnect, S: KvStore> EncryptedStore<K, S> {
    /// Build the KMS client from connection parameters, then bind it.
    pub fn connect(
        params: &K::Params,
        key_id: impl Into<String>,
        store: S,
    ) -> Result<Self, StoreError> {
        let kms = K::connect(params).map_err(|e| StoreError::Connection {
            reason: e.to_string(),
        })?;
        Ok(Self::new(kms, key_id, store))
    }
}

#[async_trait]
impl<K: Kms, S: KvStore> KvStore for EncryptedStore<K, S> {
    #[instrument(skip_all, fields(key = %key, kms = self.kms.name()))]
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let ciphertext = self.store.get(key).await?;
        self.decrypt(&ciphertext).await
    }

    #[instrument(skip_all, fields(key = %key, kms = self.kms.name()))]
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let ciphertext = self.encrypt(value).await?;
        self.store.set(key, &ciphertext).await
    }

    #[instrument(skip_all, fields(key = %key, kms = self.kms.name()))]
    async fn test(&self, key: &str) -> Result<(), StoreError> {
        self.store
            .test(key)
            .await
            .map_err(|e| StoreError::BackendTest {
                reason: e.to_string(),
            })?;

        let ciphertext = self.encrypt(TEST_PLAINTEXT.as_bytes()).await?;
        let plaintext = self.decrypt(&ciphertext).await?;

        if plaintext != TEST_PLAINTEXT.as_bytes() {
            return Err(StoreError::RoundTripMismatch {
                expected: TEST_PLAINTEXT.to_string(),
                actual: String::from_utf8_lossy(&plaintext).into_owned(),
            });
        }

        debug!("kms round trip ok");
        Ok(())
    }
}
