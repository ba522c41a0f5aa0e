use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

const KEY_ID_ENV: &str = "KVSEAL_KMS_KEY_ID";

/// User-level configuration loaded from `~/.config/kvseal/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the data directory holding the raw file store.
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub kms: KmsConfig,
}

/// Local KMS settings: where master keys live and which one seals values.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct KmsConfig {
    /// Keyring service namespace for master keys.
    pub service: String,
    /// Master key reference used for encryption.
    pub key_id: String,
}

impl Default for KmsConfig {
    fn default() -> Self {
        Self {
            service: "kvseal".to_string(),
            key_id: "default".to_string(),
        }
    }
}

impl Config {
    /// Master key reference, honoring the `KVSEAL_KMS_KEY_ID` override.
    pub fn key_id(&self) -> String {
        std::env::var(KEY_ID_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.kms.key_id.clone())
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("kvseal").join("config.toml"))
}

/// Write the given config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_if_missing(config, &default_path()?)
}

fn write_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.kms.service, "kvseal");
        assert_eq!(cfg.kms.key_id, "default");
    }

    #[test]
    fn returns_default_when_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "  \n").expect("write");
        assert_eq!(load_from_path(&path).expect("load"), Config::default());
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            data_dir = "/tmp/kvseal-data"
            [kms]
            service = "bank-vaults"
            key_id = "unseal-master"
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            Config {
                data_dir: Some(PathBuf::from("/tmp/kvseal-data")),
                kms: KmsConfig {
                    service: "bank-vaults".into(),
                    key_id: "unseal-master".into(),
                },
            }
        );
    }

    #[test]
    fn partial_kms_section_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[kms]\nkey_id = \"other\"\n").expect("write");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(cfg.kms.service, "kvseal");
        assert_eq!(cfg.kms.key_id, "other");
    }

    #[test]
    fn write_creates_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config {
            data_dir: Some(PathBuf::from("/tmp/kvseal-data")),
            kms: KmsConfig::default(),
        };

        write_if_missing(&cfg, &path).expect("write should succeed");
        let other = Config::default();
        let second = write_if_missing(&other, &path).expect("second write ok");
        assert_eq!(second, path);

        let loaded = load_from_path(&path).expect("load");
        assert_eq!(loaded, cfg);
    }
}
