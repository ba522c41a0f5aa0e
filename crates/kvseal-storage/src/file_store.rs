use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use kvseal_core::storage::{KvStore, StoreError};
use tempfile::NamedTempFile;
use tracing::instrument;

/// Longest encoded key chunk placed in a single path component.
const SEGMENT_LEN: usize = 128;
/// Prefix of directory components holding the leading chunks of long keys.
const DIR_PREFIX: char = 'd';
/// Prefix of the file component holding the last chunk of every key.
const FILE_PREFIX: char = 'k';

/// File-backed raw store: one file per key under `root`, bytes stored as-is.
/// Wrap it in `EncryptedStore` to keep plaintext off disk.
///
/// Keys are URL-safe base64 encoded and split into chunks of at most
/// `SEGMENT_LEN` characters. Every chunk but the last becomes a directory
/// (`d…`), the last one the file (`k…`), so the empty key and keys of any
/// length get their own file and a file never shadows a directory.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        path.extend(key_segments(key));
        path
    }
}

#[async_trait]
impl KvStore for FileStore {
    #[instrument(skip_all, fields(key = %key))]
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let mut file = File::open(self.path_for(key)).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound {
                    key: key.to_string(),
                }
            } else {
                storage_err(err)
            }
        })?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(storage_err)?;
        Ok(buf)
    }

    #[instrument(skip_all, fields(key = %key))]
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        write_atomic(&self.path_for(key), value)
    }

    /// Checks that the root directory exists (creating it if needed) and is writable.
    #[instrument(skip_all, fields(key = %key))]
    async fn test(&self, key: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(storage_err)?;
        let mut probe = NamedTempFile::new_in(&self.root).map_err(storage_err)?;
        probe.write_all(b"probe").map_err(storage_err)?;
        probe.flush().map_err(storage_err)?;
        probe.close().map_err(storage_err)
    }
}

fn write_atomic(path: &Path, value: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| StoreError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    tmp.write_all(value).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn key_segments(key: &str) -> Vec<String> {
    let encoded = URL_SAFE_NO_PAD.encode(key);
    let chunks: Vec<&str> = if encoded.is_empty() {
        vec![""]
    } else {
        // base64 output is ASCII, so byte offsets are char boundaries.
        (0..encoded.len())
            .step_by(SEGMENT_LEN)
            .map(|start| &encoded[start..(start + SEGMENT_LEN).min(encoded.len())])
            .collect()
    };

    let last = chunks.len() - 1;
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let prefix = if i == last { FILE_PREFIX } else { DIR_PREFIX };
            format!("{prefix}{chunk}")
        })
        .collect()
}

fn storage_err<E: ToString>(err: E) -> StoreError {
    StoreError::Storage {
        reason: err.to_string(),
    }
}
