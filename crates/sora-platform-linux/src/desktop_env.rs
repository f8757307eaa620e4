#![cfg(target_os = "linux")]

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    X11,
    Wayland,
    /// Wayland compositor with an Xwayland server on `DISPLAY`.
    XWayland,
    Headless,
}

impl SessionType {
    /// Detect the graphical session from the environment.
    pub fn detect() -> Self {
        Self::from_vars(
            std::env::var_os("WAYLAND_DISPLAY").is_some(),
            std::env::var_os("DISPLAY").is_some(),
        )
    }

    fn from_vars(wayland: bool, x11: bool) -> Self {
        match (wayland, x11) {
            (true, true) => SessionType::XWayland,
            (true, false) => SessionType::Wayland,
            (false, true) => SessionType::X11,
            (false, false) => SessionType::Headless,
        }
    }

    /// An X server is reachable. Under Xwayland only X clients are visible.
    pub fn has_x11(self) -> bool {
        matches!(self, SessionType::X11 | SessionType::XWayland)
    }
}
