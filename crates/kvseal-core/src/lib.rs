//! Core abstractions for kvseal: the key-value store contract and the
//! key-management service contract used to encrypt values at rest.
//! This crate is intentionally small to keep dependency surface minimal.

pub mod kms;
pub mod storage;
