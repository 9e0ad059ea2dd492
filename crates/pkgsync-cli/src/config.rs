//! `config.toml`
//!
//! ```toml
//! [network]
//! timeout_secs = 30
//!
//! [trust]
//! version = 2
//! [[trust.anchor]]
//! address = "https://repo.example.org/fdroid/repo"
//! fingerprint = "AB CD ..."
//!
//! [[repo]]
//! address = "https://repo.example.org/fdroid/repo"
//! format = "v1"
//! ```
//!
//! Every section is optional and a missing file is an empty configuration.

use std::path::Path;
use std::time::Duration;

use pkgsync_core::TrustAnchors;
use pkgsync_schema::{Fingerprint, IndexFormat};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid configuration in {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub network: NetworkConfig,
    pub trust: TrustAnchors,
    #[serde(rename = "repo")]
    pub repos: Vec<RepoConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// A repository to register on start-up if it is not known yet.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    pub address: String,
    pub fingerprint: Option<Fingerprint>,
    #[serde(default)]
    pub format: IndexFormat,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.network.timeout_secs)
    }

    /// Built-in anchors, unless the configured list has a newer version.
    pub fn anchors(&self) -> TrustAnchors {
        TrustAnchors::builtin().newest(self.trust.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(config.repos.is_empty());
        assert_eq!(config.anchors(), TrustAnchors::builtin());
    }

    #[test]
    fn parses_every_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [network]
            timeout_secs = 5

            [trust]
            version = 7
            [[trust.anchor]]
            address = "https://repo.example.org/fdroid/repo"
            fingerprint = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"

            [[repo]]
            address = "https://repo.example.org/fdroid/repo"
            format = "xml"

            [[repo]]
            address = "file:///media/usb/repo"
            fingerprint = "B9:4D:27:B9:93:4D:3E:08:A5:2E:52:D7:DA:7D:AB:FA:C4:84:EF:E3:7A:53:80:EE:90:88:F7:AC:E2:EF:CD:E9"
            "#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.anchors().version, 7);
        assert!(config.anchors().pin_for("https://f-droid.org/repo").is_none());
        assert_eq!(config.repos.len(), 2);
        assert_eq!(config.repos[0].format, IndexFormat::LegacyXml);
        assert_eq!(config.repos[1].format, IndexFormat::V1Json);
        assert!(config.repos[1].fingerprint.is_some());
    }

    #[test]
    fn invalid_values_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[repo]]\naddress = \"x\"\nfingerprint = \"short\"\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }
}
