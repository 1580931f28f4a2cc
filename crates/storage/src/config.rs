//! Store configuration, consumed once at open.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::cipher::Algorithm;

/// Boot-time settings of a [`DocumentStore`](crate::DocumentStore).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base directory holding one file per table.
    pub directory: PathBuf,

    /// Encrypt table files (`.cryson`) instead of plain JSON (`.json`).
    pub encrypt: bool,

    pub algorithm: Algorithm,

    /// Key material, stretched to the algorithm's key size.
    pub key: String,

    /// Initialization vector material, stretched to 16 bytes.
    pub iv: String,

    /// Autosave cadence in milliseconds. Zero disables autosave.
    pub autosave_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data"),
            encrypt: false,
            algorithm: Algorithm::default(),
            key: "data.service".to_string(),
            iv: "51498c76b69cff62".to_string(),
            autosave_ms: 900_000,
        }
    }
}

impl StoreConfig {
    pub fn with_dir(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_encrypt(mut self, encrypt: bool) -> Self {
        self.encrypt = encrypt;
        self
    }

    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>, iv: impl Into<String>) -> Self {
        self.key = key.into();
        self.iv = iv.into();
        self
    }

    pub fn with_cadence(mut self, autosave_ms: u64) -> Self {
        self.autosave_ms = autosave_ms;
        self
    }

    /// File extension for table files under the current encryption flag.
    pub fn extension(&self) -> &'static str {
        if self.encrypt { "cryson" } else { "json" }
    }

    pub fn autosave_interval(&self) -> Option<Duration> {
        (self.autosave_ms > 0).then(|| Duration::from_millis(self.autosave_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.directory, PathBuf::from("data"));
        assert_eq!(config.extension(), "json");
        assert_eq!(config.autosave_interval(), Some(Duration::from_secs(900)));
        assert_eq!(config.algorithm, Algorithm::Aes256Cbc);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: StoreConfig = toml::from_str(
            r#"
directory = "/var/lib/app"
encrypt = true
algorithm = "aes-128-cbc"
autosave_ms = 0
"#,
        )
        .unwrap();
        assert_eq!(config.extension(), "cryson");
        assert_eq!(config.algorithm, Algorithm::Aes128Cbc);
        assert_eq!(config.autosave_interval(), None);
        assert_eq!(config.key, "data.service");
    }
}
