#![cfg(windows)]

use std::sync::Arc;

use sora_core::capture::ScreenBackend;
use sora_core::window::WindowBackend;

use crate::capture_gdi::GdiScreenGrabber;
use crate::window_enum::Win32Windows;

/// Windows backends: GDI screen grab and Win32 window control.
pub struct WinPlatform {
    screen: Arc<GdiScreenGrabber>,
    windows: Arc<Win32Windows>,
}

impl WinPlatform {
    pub fn new() -> Self {
        Self {
            screen: Arc::new(GdiScreenGrabber::new()),
            windows: Arc::new(Win32Windows::new()),
        }
    }

    pub fn screen(&self) -> Arc<dyn ScreenBackend> {
        self.screen.clone()
    }

    pub fn windows(&self) -> Arc<dyn WindowBackend> {
        self.windows.clone()
    }
}

impl Default for WinPlatform {
    fn default() -> Self {
        Self::new()
    }
}
