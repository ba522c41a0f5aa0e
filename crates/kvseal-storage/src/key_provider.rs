use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;

/// Master key material held on behalf of the local KMS.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Key reference callers encrypt under (never log key bytes).
    pub id: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; 32],
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("no master key named {0}")]
    NotFound(String),
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

/// Provides access to named master keys (OS keychain in production; memory in tests).
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Load an existing key. Never creates one.
    async fn load(&self, key_id: &str) -> Result<KeyMaterial, KeyError>;

    /// Load a key, generating and storing a fresh one if it does not exist yet.
    async fn get_or_create(&self, key_id: &str) -> Result<KeyMaterial, KeyError>;
}

/// OS keyring-backed provider. Each key lives under `(service, key_id)`.
pub struct KeyringProvider {
    service: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, key_id: &str) -> Result<keyring::Entry, KeyError> {
        keyring::Entry::new(&self.service, key_id).map_err(|e| KeyError::Keyring(e.to_string()))
    }
}

#[async_trait]
impl KeyProvider for KeyringProvider {
    async fn load(&self, key_id: &str) -> Result<KeyMaterial, KeyError> {
        // Keyring operations are synchronous; wrap in async for trait compatibility.
        match self.entry(key_id)?.get_password() {
            Ok(secret) => decode_key(key_id, &secret),
            Err(keyring::Error::NoEntry) => Err(KeyError::NotFound(key_id.to_string())),
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }

    async fn get_or_create(&self, key_id: &str) -> Result<KeyMaterial, KeyError> {
        match self.load(key_id).await {
            Err(KeyError::NotFound(_)) => {}
            other => return other,
        }

        let material = generate_key(key_id);
        self.entry(key_id)?
            .set_password(&encode_key(&material))
            .map_err(|e| KeyError::Keyring(e.to_string()))?;
        Ok(material)
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<HashMap<String, KeyMaterial>>>,
}

impl InMemoryKeyProvider {
    /// Provider pre-seeded with freshly generated keys for each id.
    pub fn with_keys<I, S>(key_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = key_ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                (id.clone(), generate_key(&id))
            })
            .collect();
        Self {
            inner: Arc::new(Mutex::new(keys)),
        }
    }
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn load(&self, key_id: &str) -> Result<KeyMaterial, KeyError> {
        let guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        guard
            .get(key_id)
            .cloned()
            .ok_or_else(|| KeyError::NotFound(key_id.to_string()))
    }

    async fn get_or_create(&self, key_id: &str) -> Result<KeyMaterial, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        let material = guard
            .entry(key_id.to_string())
            .or_insert_with(|| generate_key(key_id));
        Ok(material.clone())
    }
}

fn generate_key(key_id: &str) -> KeyMaterial {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial {
        id: key_id.to_string(),
        bytes,
    }
}

fn encode_key(material: &KeyMaterial) -> String {
    general_purpose::STANDARD.encode(material.bytes)
}

fn decode_key(key_id: &str, secret: &str) -> Result<KeyMaterial, KeyError> {
    let bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    if bytes.len() != 32 {
        return Err(KeyError::Decode(format!(
            "expected 32 bytes, got {}",
            bytes.len()
        )));
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(KeyMaterial {
        id: key_id.to_string(),
        bytes: out,
    })
}
