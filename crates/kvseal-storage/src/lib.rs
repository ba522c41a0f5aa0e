//! Concrete storage implementations with envelope encryption at rest.
//! `EncryptedStore` routes values through a KMS before they reach a raw
//! backend; `LocalKms` holds AES-GCM master keys in the OS keyring (or test doubles).

pub mod encrypted_store;
pub mod file_store;
pub mod key_provider;
pub mod local_kms;
