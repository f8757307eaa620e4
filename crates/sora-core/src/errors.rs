//! Error taxonomy for Sora Core.
//!
//! Module errors converge into [`CoreError`]. Only [`CoreError::user_message`]
//! text is ever sent to the remote user; the `Display` output carries internal
//! detail and belongs in logs.

use std::path::PathBuf;

use thiserror::Error;

use crate::capture::CaptureError;
use crate::config::ConfigError;
use crate::window::WindowError;

/// Fixed reply for callers that are not the admin principal.
pub const REJECTION_TEXT: &str = "Insufficient privileges to run this command";

/// The request a failure belongs to, used to pick the reply text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Screenshot,
    CameraPhoto,
    WindowList,
    WindowScreenshot,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// No credentials file at startup.
    #[error("credentials missing at {0}")]
    ConfigMissing(PathBuf),

    /// Credentials file present but unusable.
    #[error("credentials corrupt: {0}")]
    ConfigCorrupt(String),

    #[error("unauthorized principal")]
    Unauthorized,

    /// Camera absent or held by another capture.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("{action:?} failed: {detail}")]
    CaptureFailed { action: Action, detail: String },

    /// Callback index does not match the current window list.
    #[error("stale window reference")]
    StaleReference,

    #[error("window activation failed")]
    ActivationFailed,
}

impl CoreError {
    pub fn capture(action: Action, err: impl std::fmt::Display) -> Self {
        CoreError::CaptureFailed {
            action,
            detail: err.to_string(),
        }
    }

    /// Wrap a capture error, keeping the camera-unavailable class distinct.
    pub fn from_capture(action: Action, err: CaptureError) -> Self {
        if err.is_device_unavailable() {
            CoreError::DeviceUnavailable(err.to_string())
        } else {
            CoreError::capture(action, err)
        }
    }

    pub fn from_window(err: WindowError) -> Self {
        CoreError::capture(Action::WindowList, err)
    }

    /// Startup failures end the process; everything else is per request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::ConfigMissing(_) | CoreError::ConfigCorrupt(_))
    }

    /// Short, non-technical text safe to send over the channel.
    pub fn user_message(&self) -> &'static str {
        match self {
            CoreError::ConfigMissing(_) | CoreError::ConfigCorrupt(_) => {
                "Configuration not found. Please reinstall the client."
            }
            CoreError::Unauthorized => REJECTION_TEXT,
            CoreError::DeviceUnavailable(_) => {
                "Webcam is unavailable or in use by another application"
            }
            CoreError::CaptureFailed { action, .. } => match action {
                Action::Screenshot => "Failed to take screenshot",
                Action::CameraPhoto => "Failed to take photo",
                Action::WindowList => "Failed to get window list",
                Action::WindowScreenshot => "Failed to take window screenshot",
            },
            CoreError::StaleReference => "Window not found",
            CoreError::ActivationFailed => "Failed to activate window",
        }
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Missing(path) => CoreError::ConfigMissing(path),
            other => CoreError::ConfigCorrupt(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_split_missing_and_corrupt() {
        let missing: CoreError = ConfigError::Missing(PathBuf::from("config.json")).into();
        assert!(matches!(missing, CoreError::ConfigMissing(_)));
        assert!(missing.is_fatal());

        let corrupt: CoreError = ConfigError::Malformed("eof".into()).into();
        assert!(matches!(corrupt, CoreError::ConfigCorrupt(_)));
        assert!(corrupt.is_fatal());
    }

    #[test]
    fn test_camera_busy_and_absent_share_message() {
        let busy = CoreError::from_capture(Action::CameraPhoto, CaptureError::DeviceBusy);
        let absent = CoreError::from_capture(
            Action::CameraPhoto,
            CaptureError::DeviceUnavailable("/dev/video0".into()),
        );
        assert_eq!(busy.user_message(), absent.user_message());
        assert!(!busy.is_fatal());
    }

    #[test]
    fn test_generic_capture_failure() {
        let err = CoreError::from_capture(Action::CameraPhoto, CaptureError::Encode("x".into()));
        assert_eq!(err.user_message(), "Failed to take photo");
    }

    #[test]
    fn test_user_message_hides_detail() {
        let secret = "/home/admin/.config/sora/config.json token=123:ABC";
        let errors = [
            CoreError::ConfigMissing(PathBuf::from(secret)),
            CoreError::ConfigCorrupt(secret.into()),
            CoreError::DeviceUnavailable(secret.into()),
            CoreError::capture(Action::Screenshot, secret),
            CoreError::from_window(WindowError::EnumerationFailed(secret.into())),
        ];
        for err in errors {
            assert!(!err.user_message().contains("config.json"));
            assert!(!err.user_message().contains("token"));
            // Detail stays available for logs.
            assert!(err.to_string().contains("sora") || err.to_string().contains("token"));
        }
    }

    #[test]
    fn test_unauthorized_uses_rejection_text() {
        assert_eq!(CoreError::Unauthorized.user_message(), REJECTION_TEXT);
    }
}
