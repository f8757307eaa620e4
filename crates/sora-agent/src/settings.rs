use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sora_core::capture::CameraOptions;
use sora_core::config::CREDENTIALS_FILE_NAME;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file not readable: {0}")]
    FileNotFound(String),
    #[error("settings parse error: {0}")]
    ParseError(String),
    #[error("settings validation error: {0}")]
    ValidationError(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Obfuscated credentials file written by the installer
    pub credentials_path: PathBuf,

    // Logging
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
    pub log_json: bool,

    // Camera
    pub camera_index: u32,
    pub camera_width: u32,
    pub camera_height: u32,
    pub camera_warmup_frames: u32,
    pub jpeg_quality: u8, // 1-100

    // Windows
    pub activation_delay_ms: u64,

    /// Window selections expire after this long; unset keeps them until replaced
    pub session_ttl_secs: Option<u64>,

    /// Message the admin when the agent comes online
    pub startup_notification: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        let camera = CameraOptions::default();
        Self {
            credentials_path: PathBuf::from(CREDENTIALS_FILE_NAME),
            log_level: "info".to_string(),
            log_dir: None,
            log_json: false,
            camera_index: camera.index,
            camera_width: camera.width,
            camera_height: camera.height,
            camera_warmup_frames: camera.warmup_frames,
            jpeg_quality: camera.jpeg_quality,
            activation_delay_ms: 500,
            session_ttl_secs: None,
            startup_notification: true,
        }
    }
}

impl AgentSettings {
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SettingsError::FileNotFound(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: AgentSettings =
            toml::from_str(content).map_err(|e| SettingsError::ParseError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults overridden by `SORA_*` environment variables.
    pub fn load_from_env() -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// A settings file when given, the environment otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_from_env(),
        }
    }

    /// Apply overrides from `lookup`. Unparsable values are logged and skipped.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(key: &str, value: Option<String>) -> Option<T> {
            let value = value?;
            match value.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("ignoring {}: cannot parse {:?}", key, value);
                    None
                }
            }
        }

        if let Some(path) = lookup("SORA_CREDENTIALS") {
            self.credentials_path = PathBuf::from(path);
        }
        if let Some(level) = lookup("SORA_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(dir) = lookup("SORA_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(json) = parsed("SORA_LOG_JSON", lookup("SORA_LOG_JSON")) {
            self.log_json = json;
        }
        if let Some(index) = parsed("SORA_CAMERA_INDEX", lookup("SORA_CAMERA_INDEX")) {
            self.camera_index = index;
        }
        if let Some(width) = parsed("SORA_CAMERA_WIDTH", lookup("SORA_CAMERA_WIDTH")) {
            self.camera_width = width;
        }
        if let Some(height) = parsed("SORA_CAMERA_HEIGHT", lookup("SORA_CAMERA_HEIGHT")) {
            self.camera_height = height;
        }
        if let Some(frames) = parsed("SORA_CAMERA_WARMUP_FRAMES", lookup("SORA_CAMERA_WARMUP_FRAMES")) {
            self.camera_warmup_frames = frames;
        }
        if let Some(quality) = parsed("SORA_JPEG_QUALITY", lookup("SORA_JPEG_QUALITY")) {
            self.jpeg_quality = quality;
        }
        if let Some(delay) = parsed("SORA_ACTIVATION_DELAY_MS", lookup("SORA_ACTIVATION_DELAY_MS")) {
            self.activation_delay_ms = delay;
        }
        if let Some(ttl) = parsed("SORA_SESSION_TTL_SECS", lookup("SORA_SESSION_TTL_SECS")) {
            self.session_ttl_secs = Some(ttl);
        }
        if let Some(notify) = parsed("SORA_STARTUP_NOTIFICATION", lookup("SORA_STARTUP_NOTIFICATION")) {
            self.startup_notification = notify;
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(SettingsError::ValidationError(format!(
                "log_level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(SettingsError::ValidationError(
                "jpeg_quality must be between 1 and 100".to_string(),
            ));
        }
        if self.camera_width == 0 || self.camera_height == 0 {
            return Err(SettingsError::ValidationError(
                "camera resolution must be non-zero".to_string(),
            ));
        }
        if self.session_ttl_secs == Some(0) {
            return Err(SettingsError::ValidationError(
                "session_ttl_secs must be at least 1 when set".to_string(),
            ));
        }
        if self.credentials_path.as_os_str().is_empty() {
            return Err(SettingsError::ValidationError(
                "credentials_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn camera_options(&self) -> CameraOptions {
        CameraOptions {
            index: self.camera_index,
            width: self.camera_width,
            height: self.camera_height,
            warmup_frames: self.camera_warmup_frames,
            jpeg_quality: self.jpeg_quality,
        }
    }

    pub fn activation_delay(&self) -> Duration {
        Duration::from_millis(self.activation_delay_ms)
    }

    pub fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let settings = AgentSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.credentials_path, PathBuf::from("config.json"));
        assert_eq!(settings.camera_options().jpeg_quality, 90);
        assert_eq!(settings.activation_delay(), Duration::from_millis(500));
        assert_eq!(settings.session_ttl(), None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = AgentSettings::from_toml(
            r#"
            log_level = "debug"
            session_ttl_secs = 600
            "#,
        )
        .unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.session_ttl(), Some(Duration::from_secs(600)));
        assert_eq!(settings.camera_width, 1280);
        assert!(settings.startup_notification);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            AgentSettings::from_toml("jpeg_quality = \"high\""),
            Err(SettingsError::ParseError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        for toml in [
            "jpeg_quality = 0",
            "jpeg_quality = 101",
            "camera_width = 0",
            "session_ttl_secs = 0",
            "log_level = \"loud\"",
        ] {
            assert!(
                matches!(AgentSettings::from_toml(toml), Err(SettingsError::ValidationError(_))),
                "{toml} should fail validation"
            );
        }
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SORA_CREDENTIALS", "/etc/sora/config.json"),
            ("SORA_LOG_JSON", "true"),
            ("SORA_JPEG_QUALITY", "75"),
            ("SORA_STARTUP_NOTIFICATION", "false"),
            ("SORA_CAMERA_INDEX", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut settings = AgentSettings::default();
        settings.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.credentials_path, PathBuf::from("/etc/sora/config.json"));
        assert!(settings.log_json);
        assert_eq!(settings.jpeg_quality, 75);
        assert!(!settings.startup_notification);
        // Unparsable value leaves the default.
        assert_eq!(settings.camera_index, 0);
    }

    #[test]
    fn test_env_camera_overrides() {
        let env: HashMap<&str, &str> = [
            ("SORA_CAMERA_WIDTH", "640"),
            ("SORA_CAMERA_HEIGHT", "480"),
            ("SORA_CAMERA_WARMUP_FRAMES", "0"),
        ]
        .into_iter()
        .collect();

        let mut settings = AgentSettings::default();
        settings.apply_env(|key| env.get(key).map(|v| v.to_string()));

        let camera = settings.camera_options();
        assert_eq!((camera.width, camera.height), (640, 480));
        assert_eq!(camera.warmup_frames, 0);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_env_zero_resolution_fails_validation() {
        let mut settings = AgentSettings::default();
        settings.apply_env(|key| (key == "SORA_CAMERA_HEIGHT").then(|| "0".to_string()));
        assert!(matches!(settings.validate(), Err(SettingsError::ValidationError(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sora.toml");
        std::fs::write(&path, "camera_index = 2\nlog_dir = \"logs\"\n").unwrap();

        let settings = AgentSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.camera_index, 2);
        assert_eq!(settings.log_dir, Some(PathBuf::from("logs")));
    }

    #[test]
    fn test_missing_file() {
        let err = AgentSettings::load_from_file(Path::new("/nonexistent/sora.toml")).unwrap_err();
        assert!(matches!(err, SettingsError::FileNotFound(_)));
    }

    proptest! {
        #[test]
        fn test_quality_range(quality in any::<u8>()) {
            let settings = AgentSettings { jpeg_quality: quality, ..AgentSettings::default() };
            prop_assert_eq!(settings.validate().is_ok(), (1..=100).contains(&quality));
        }
    }
}
