//! Credentials store.
//!
//! The installer writes a single JSON document:
//!
//! ```json
//! { "encrypted_data": "<base64>" }
//! ```
//!
//! Opening `encrypted_data` with the [obfuscation cipher](crate::cipher)
//! yields the credentials record:
//!
//! ```json
//! { "bot_token": "...", "telegram_id": "42", "created_at": "2024-01-01", "version": "1.0" }
//! ```
//!
//! The record is read once during startup and is immutable afterwards.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cipher::{self, CipherError, ObfuscationKey};

/// Default credentials file name, resolved against the working directory.
pub const CREDENTIALS_FILE_NAME: &str = "config.json";

/// Record version written by [`Credentials::new`].
pub const CURRENT_RECORD_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("credentials file not found: {0}")]
    Missing(PathBuf),
    #[error("credentials file unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("credentials file malformed: {0}")]
    Malformed(String),
    #[error("credentials payload undecodable: {0}")]
    Cipher(#[from] CipherError),
    #[error("credentials record incomplete: missing {0}")]
    Incomplete(&'static str),
}

impl ConfigError {
    /// True when the file simply is not there yet.
    pub fn is_missing(&self) -> bool {
        matches!(self, ConfigError::Missing(_))
    }
}

/// Outer file envelope.
#[derive(Debug, Serialize, Deserialize)]
struct CredentialsFile {
    encrypted_data: Option<String>,
}

/// The single credentials record.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    /// Bot API token for the message channel.
    #[serde(rename = "bot_token")]
    pub channel_token: String,
    /// Id of the only principal allowed to issue commands.
    #[serde(rename = "telegram_id", deserialize_with = "deserialize_id")]
    pub admin_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(rename = "version", default)]
    pub schema_version: String,
}

impl Credentials {
    pub fn new(channel_token: impl Into<String>, admin_id: impl Into<String>) -> Self {
        Self {
            channel_token: channel_token.into(),
            admin_id: admin_id.into(),
            created_at: chrono::Local::now().format("%Y-%m-%d").to_string(),
            schema_version: CURRENT_RECORD_VERSION.to_string(),
        }
    }

    /// Parse `schema_version` ("1.0" → 1). Unparsable versions read as 0.
    pub fn schema_major(&self) -> u32 {
        self.schema_version
            .split('.')
            .next()
            .and_then(|major| major.trim().parse().ok())
            .unwrap_or(0)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_token.trim().is_empty() {
            return Err(ConfigError::Incomplete("bot_token"));
        }
        if self.admin_id.trim().is_empty() {
            return Err(ConfigError::Incomplete("telegram_id"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("channel_token", &"<redacted>")
            .field("admin_id", &self.admin_id)
            .field("created_at", &self.created_at)
            .field("schema_version", &self.schema_version)
            .finish()
    }
}

/// The installer validates the id as an integer and may store it either way.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text.trim().to_string(),
        RawId::Number(number) => number.to_string(),
    })
}

/// Loads and persists [`Credentials`] at a fixed path.
pub struct ConfigStore {
    path: PathBuf,
    key: ObfuscationKey,
}

impl ConfigStore {
    /// Store at `path` using the installer's key.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_key(path, ObfuscationKey::installer_default())
    }

    pub fn with_key(path: impl Into<PathBuf>, key: ObfuscationKey) -> Self {
        Self {
            path: path.into(),
            key,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the record, folding every failure into `None`.
    ///
    /// A missing or unreadable file is an expected condition before the
    /// installer has run.
    pub fn load(&self) -> Option<Credentials> {
        match self.try_load() {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                debug!("credentials unavailable: {}", e);
                None
            }
        }
    }

    /// Load the record, reporting why it could not be loaded.
    pub fn try_load(&self) -> Result<Credentials, ConfigError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::Missing(self.path.clone()));
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let file: CredentialsFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        let sealed = file
            .encrypted_data
            .filter(|data| !data.trim().is_empty())
            .ok_or(ConfigError::Incomplete("encrypted_data"))?;

        let json = cipher::open_utf8(&sealed, &self.key)?;
        let credentials: Credentials =
            serde_json::from_str(&json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        credentials.validate()?;

        Ok(credentials)
    }

    /// Persist `credentials`, replacing the file atomically.
    pub fn save(&self, credentials: &Credentials) -> Result<(), ConfigError> {
        credentials.validate()?;

        let json =
            serde_json::to_string(credentials).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        let file = CredentialsFile {
            encrypted_data: Some(cipher::seal(json.as_bytes(), &self.key)),
        };
        let body =
            serde_json::to_string_pretty(&file).map_err(|e| ConfigError::Malformed(e.to_string()))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(body.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| ConfigError::Io(e.error))?;

        info!("credentials written to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::OnceLock;

    fn key() -> ObfuscationKey {
        static KEY: OnceLock<ObfuscationKey> = OnceLock::new();
        KEY.get_or_init(ObfuscationKey::installer_default).clone()
    }

    fn store_in(dir: &tempfile::TempDir) -> ConfigStore {
        ConfigStore::with_key(dir.path().join(CREDENTIALS_FILE_NAME), key())
    }

    fn sample() -> Credentials {
        Credentials {
            channel_token: "123456:ABC-DEF".to_string(),
            admin_id: "42".to_string(),
            created_at: "2024-01-01".to_string(),
            schema_version: "1.0".to_string(),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        assert!(!store.exists());
        assert!(store.load().is_none());
        assert!(store.try_load().unwrap_err().is_missing());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&sample()).unwrap();
        assert!(store.exists());
        assert_eq!(store.load(), Some(sample()));
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::with_key(dir.path().join("nested/config.json"), key());
        store.save(&sample()).unwrap();
        assert_eq!(store.load(), Some(sample()));
    }

    #[test]
    fn test_save_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&sample()).unwrap();
        let mut updated = sample();
        updated.admin_id = "77".to_string();
        store.save(&updated).unwrap();
        assert_eq!(store.load().unwrap().admin_id, "77");
    }

    #[test]
    fn test_reads_installer_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        // Installer output: python json.dumps separators, numeric id.
        let record = r#"{"bot_token": "123:XYZ", "telegram_id": 42, "created_at": "2024-01-01", "version": "1.0"}"#;
        let body = format!(
            "{{\n  \"encrypted_data\": \"{}\"\n}}",
            cipher::seal(record.as_bytes(), &key())
        );
        std::fs::write(store.path(), body).unwrap();

        let credentials = store.try_load().unwrap();
        assert_eq!(credentials.channel_token, "123:XYZ");
        assert_eq!(credentials.admin_id, "42");
        assert_eq!(credentials.schema_major(), 1);
    }

    #[test]
    fn test_corrupt_outer_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.try_load(), Err(ConfigError::Malformed(_))));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_missing_encrypted_data_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{}").unwrap();
        assert!(matches!(
            store.try_load(),
            Err(ConfigError::Incomplete("encrypted_data"))
        ));
    }

    #[test]
    fn test_bad_base64_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), r#"{"encrypted_data": "%%%"}"#).unwrap();
        assert!(matches!(store.try_load(), Err(ConfigError::Cipher(_))));
    }

    #[test]
    fn test_wrong_key_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&sample()).unwrap();
        let other = ConfigStore::with_key(store.path(), ObfuscationKey::derive("other", b"salt"));
        assert!(other.load().is_none());
    }

    #[test]
    fn test_empty_token_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let mut credentials = sample();
        credentials.channel_token = "  ".to_string();
        assert!(matches!(
            store.save(&credentials),
            Err(ConfigError::Incomplete("bot_token"))
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("ABC-DEF"));
        assert!(rendered.contains("42"));
    }

    #[test]
    fn test_schema_major_fallback() {
        let mut credentials = sample();
        credentials.schema_version = "beta".to_string();
        assert_eq!(credentials.schema_major(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_credentials_round_trip(
            token in "[0-9]{1,10}:[A-Za-z0-9_-]{1,40}",
            admin_id in "[1-9][0-9]{0,11}",
            created_at in "\\PC{0,20}",
            version in "[0-9]\\.[0-9]",
        ) {
            let dir = tempfile::tempdir().unwrap();
            let store = store_in(&dir);
            let record = Credentials {
                channel_token: token,
                admin_id,
                created_at,
                schema_version: version,
            };
            store.save(&record).unwrap();
            prop_assert_eq!(store.load(), Some(record));
        }
    }
}
