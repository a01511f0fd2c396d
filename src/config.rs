use crate::token::{Algorithm, DEFAULT_DIGITS, DEFAULT_PERIOD};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides the store location (mostly for scripting and tests).
pub const STORE_DIR_ENV: &str = "XAUTH_STORE_DIR";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KdfParams {
    pub algo: String, // "argon2id"
    pub memory_mib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub salt: String, // base64
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EncConfig {
    pub algo: String,                 // "xchacha20-poly1305"
    pub master_key_nonce: String,     // base64
    pub encrypted_master_key: String, // base64
}

/// Parameters for tokens entered by hand rather than from a URL.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TokenDefaults {
    pub algorithm: Algorithm,
    pub digits: u32,
    pub period: i32,
}

impl Default for TokenDefaults {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Sha1,
            digits: DEFAULT_DIGITS,
            period: DEFAULT_PERIOD,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub version: u32,
    pub kdf: KdfParams,
    pub enc: EncConfig,
    #[serde(default)]
    pub defaults: TokenDefaults,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&data)?;
        Ok(cfg)
    }
}

/// Store root, e.g. ~/.local/share/xauth-store
pub fn store_root() -> anyhow::Result<PathBuf> {
    if let Some(dir) = std::env::var_os(STORE_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let mut dir = dirs::data_dir().ok_or_else(|| anyhow::anyhow!("cannot get data dir"))?;
    dir.push("xauth-store");
    Ok(dir)
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(store_root()?.join("config.json"))
}

pub fn save_config(cfg: &Config, path: &Path) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(cfg)?;
    std::fs::write(path, s)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_defaults_fall_back() {
        let json = r#"{
            "version": 1,
            "kdf": {"algo": "argon2id", "memory_mib": 32, "iterations": 3, "parallelism": 1, "salt": ""},
            "enc": {"algo": "xchacha20-poly1305", "master_key_nonce": "", "encrypted_master_key": ""}
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.defaults, TokenDefaults::default());
    }

    #[test]
    fn partial_defaults_keep_the_rest() {
        let defaults: TokenDefaults =
            serde_json::from_str(r#"{"algorithm": "SHA256", "digits": 8}"#).unwrap();
        assert_eq!(defaults.algorithm, Algorithm::Sha256);
        assert_eq!(defaults.digits, 8);
        assert_eq!(defaults.period, 30);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = crate::crypto::generate_new_config("pw").unwrap();
        save_config(&cfg, &path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.kdf.salt, cfg.kdf.salt);
        assert_eq!(loaded.enc.encrypted_master_key, cfg.enc.encrypted_master_key);
    }
}
