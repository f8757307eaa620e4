//! Host backend wiring per target OS.

use std::sync::Arc;

use sora_core::capture::{CameraBackend, ScreenBackend};
use sora_core::window::WindowBackend;

use crate::camera::camera_backend;

/// Backends the core services run on.
pub struct HostBackends {
    pub screen: Arc<dyn ScreenBackend>,
    pub windows: Arc<dyn WindowBackend>,
    pub camera: Arc<dyn CameraBackend>,
}

impl HostBackends {
    #[cfg(target_os = "linux")]
    pub fn detect() -> Self {
        let platform = sora_platform_linux::LinuxPlatform::detect();
        Self {
            screen: platform.screen(),
            windows: platform.windows(),
            camera: camera_backend(),
        }
    }

    #[cfg(windows)]
    pub fn detect() -> Self {
        let platform = sora_platform_win::WinPlatform::new();
        Self {
            screen: platform.screen(),
            windows: platform.windows(),
            camera: camera_backend(),
        }
    }

    #[cfg(not(any(target_os = "linux", windows)))]
    pub fn detect() -> Self {
        tracing::warn!("no screen or window backend for this platform");
        Self {
            screen: Arc::new(sora_core::capture::NoScreen),
            windows: Arc::new(sora_core::window::NoWindows),
            camera: camera_backend(),
        }
    }
}
