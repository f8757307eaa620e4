#![cfg(target_os = "linux")]

use std::sync::Arc;

use sora_core::capture::{NoScreen, ScreenBackend};
use sora_core::window::{NoWindows, WindowBackend};
use tracing::{info, warn};

use crate::capture_x11::X11ScreenGrabber;
use crate::desktop_env::SessionType;
use crate::windows_ewmh::EwmhWindows;

/// Linux backends chosen for the current graphical session.
pub struct LinuxPlatform {
    session: SessionType,
    screen: Arc<dyn ScreenBackend>,
    windows: Arc<dyn WindowBackend>,
}

impl LinuxPlatform {
    /// Pick backends from the session environment. Wayland without
    /// Xwayland and headless hosts get backends that report unavailability.
    pub fn detect() -> Self {
        let session = SessionType::detect();
        info!("Linux session type: {:?}", session);

        if session.has_x11() {
            return Self {
                session,
                screen: Arc::new(X11ScreenGrabber::new()),
                windows: Arc::new(EwmhWindows::new()),
            };
        }

        warn!("no X server reachable; screen capture and window control are disabled");
        Self {
            session,
            screen: Arc::new(NoScreen),
            windows: Arc::new(NoWindows),
        }
    }

    pub fn session(&self) -> SessionType {
        self.session
    }

    pub fn screen(&self) -> Arc<dyn ScreenBackend> {
        self.screen.clone()
    }

    pub fn windows(&self) -> Arc<dyn WindowBackend> {
        self.windows.clone()
    }
}
