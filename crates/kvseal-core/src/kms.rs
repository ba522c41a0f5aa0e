use async_trait::async_trait;
use thiserror::Error;

/// Errors produced by key-management service clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KmsError {
    /// Client could not be built from its connection parameters.
    #[error("connection error: {0}")]
    Connection(String),
    /// The referenced master key does not exist.
    #[error("master key not found: {key_id}")]
    KeyNotFound { key_id: String },
    /// Ciphertext is not something this KMS produced.
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),
    /// The cipher rejected the operation (tampering, wrong key, context mismatch).
    #[error("crypto error: {0}")]
    Crypto(String),
    /// Master key storage failure.
    #[error("key provider error: {0}")]
    KeyProvider(String),
}

/// Contract for a key-management service holding master keys.
///
/// Ciphertext is self-describing: `decrypt` needs no key reference. The
/// `context` is bound to the ciphertext as associated data and must match
/// exactly on decryption.
#[async_trait]
pub trait Kms: Send + Sync {
    /// Short name used for logging.
    fn name(&self) -> &'static str;

    async fn encrypt(
        &self,
        plaintext: &[u8],
        key_id: &str,
        context: &str,
    ) -> Result<Vec<u8>, KmsError>;

    async fn decrypt(&self, ciphertext: &[u8], context: &str) -> Result<Vec<u8>, KmsError>;
}

/// KMS clients that can be constructed from connection parameters
/// (region, credentials, keyring namespace, ...).
pub trait KmsConnect: Kms + Sized {
    type Params;

    fn connect(params: &Self::Params) -> Result<Self, KmsError>;
}
