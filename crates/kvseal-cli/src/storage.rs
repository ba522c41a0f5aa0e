use std::path::PathBuf;

use crate::config::Config;
use color_eyre::Result;
use dirs::data_dir;
use kvseal_core::kms::KmsConnect;
use kvseal_storage::{
    encrypted_store::EncryptedStore,
    file_store::FileStore,
    key_provider::KeyringProvider,
    local_kms::{KeyringKmsParams, LocalKms},
};
use tracing::debug;

pub type SealedStore = EncryptedStore<LocalKms<KeyringProvider>, FileStore>;

/// Resolve the default data directory for kvseal.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("kvseal"))
}

/// Build the keyring-backed KMS named by the config.
pub fn kms_from_config(config: &Config) -> Result<LocalKms<KeyringProvider>> {
    LocalKms::connect(&kms_params(config)).map_err(|e| color_eyre::eyre::eyre!(e.to_string()))
}

/// Build the encrypting store: file backend sealed by the keyring-backed KMS.
pub fn store_from_config(config: &Config) -> Result<SealedStore> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    let key_id = config.key_id();
    debug!(?root, %key_id, service = %config.kms.service, "initializing encrypted store");

    SealedStore::connect(&kms_params(config), key_id, FileStore::new(root))
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))
}

fn kms_params(config: &Config) -> KeyringKmsParams {
    KeyringKmsParams {
        service: config.kms.service.clone(),
    }
}

/// Helper for tests: file store in a temp dir sealed with an in-memory master key.
#[cfg(test)]
pub fn test_store(
    root: impl Into<PathBuf>,
    key_id: &str,
) -> EncryptedStore<LocalKms<kvseal_storage::key_provider::InMemoryKeyProvider>, FileStore> {
    use kvseal_storage::key_provider::InMemoryKeyProvider;

    EncryptedStore::new(
        LocalKms::new(InMemoryKeyProvider::with_keys([key_id])),
        key_id,
        FileStore::new(root),
    )
}
