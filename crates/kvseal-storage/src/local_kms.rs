use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use kvseal_core::kms::{Kms, KmsConnect, KmsError};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::key_provider::{KeyError, KeyMaterial, KeyProvider, KeyringProvider};

const NONCE_LEN: usize = 12;

/// AES-256-GCM key-management service whose master keys come from a
/// `KeyProvider`. The encryption context is bound as associated data.
pub struct LocalKms<P: KeyProvider> {
    keys: P,
}

impl<P: KeyProvider> LocalKms<P> {
    pub fn new(keys: P) -> Self {
        Self { keys }
    }

    pub fn key_provider(&self) -> &P {
        &self.keys
    }

    async fn master_key(&self, key_id: &str) -> Result<KeyMaterial, KmsError> {
        self.keys.load(key_id).await.map_err(|err| match err {
            KeyError::NotFound(key_id) => KmsError::KeyNotFound { key_id },
            other => KmsError::KeyProvider(other.to_string()),
        })
    }
}

/// Self-describing ciphertext produced by `LocalKms`.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    key_id: String,
    nonce: String,
    ciphertext: String,
}

#[async_trait]
impl<P: KeyProvider> Kms for LocalKms<P> {
    fn name(&self) -> &'static str {
        "local"
    }

    #[instrument(skip_all, fields(key_id = %key_id))]
    async fn encrypt(
        &self,
        plaintext: &[u8],
        key_id: &str,
        context: &str,
    ) -> Result<Vec<u8>, KmsError> {
        let material = self.master_key(key_id).await?;
        let cipher = build_cipher(&material)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: context.as_bytes(),
                },
            )
            .map_err(|e| KmsError::Crypto(format!("encrypt failed: {e}")))?;

        let envelope = Envelope {
            key_id: material.id,
            nonce: URL_SAFE_NO_PAD.encode(nonce.as_slice()),
            ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
        };
        serde_json::to_vec(&envelope).map_err(|e| KmsError::Crypto(e.to_string()))
    }

    #[instrument(skip_all)]
    async fn decrypt(&self, ciphertext: &[u8], context: &str) -> Result<Vec<u8>, KmsError> {
        let envelope: Envelope = serde_json::from_slice(ciphertext)
            .map_err(|e| KmsError::InvalidCiphertext(format!("envelope: {e}")))?;

        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(&envelope.nonce)
            .map_err(|e| KmsError::InvalidCiphertext(format!("nonce decode failed: {e}")))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(KmsError::InvalidCiphertext(format!(
                "expected {NONCE_LEN}-byte nonce, got {}",
                nonce_bytes.len()
            )));
        }
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = URL_SAFE_NO_PAD
            .decode(&envelope.ciphertext)
            .map_err(|e| KmsError::InvalidCiphertext(format!("ciphertext decode failed: {e}")))?;

        let material = self.master_key(&envelope.key_id).await?;
        let cipher = build_cipher(&material)?;
        cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &sealed,
                    aad: context.as_bytes(),
                },
            )
            .map_err(|e| KmsError::Crypto(format!("decrypt failed: {e}")))
    }
}

/// Connection parameters for a keyring-backed local KMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringKmsParams {
    /// Keyring service namespace holding the master keys.
    pub service: String,
}

impl KmsConnect for LocalKms<KeyringProvider> {
    type Params = KeyringKmsParams;

    fn connect(params: &Self::Params) -> Result<Self, KmsError> {
        let service = params.service.trim();
        if service.is_empty() {
            return Err(KmsError::Connection(
                "keyring service name must not be empty".to_string(),
            ));
        }
        // Only checks that a credential store backend is available.
        keyring::Entry::new(service, "kvseal-connect-probe")
            .map_err(|e| KmsError::Connection(e.to_string()))?;

        Ok(Self::new(KeyringProvider::new(service)))
    }
}

fn build_cipher(material: &KeyMaterial) -> Result<Aes256Gcm, KmsError> {
    Aes256Gcm::new_from_slice(&material.bytes)
        .map_err(|e| KmsError::Crypto(format!("cipher init failed: {e}")))
}
