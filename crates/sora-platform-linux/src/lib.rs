#![cfg(target_os = "linux")]

// X11 error mapping
mod error;

// Screen capture
pub mod capture_x11;

// Window enumeration and activation
pub mod windows_ewmh;

// Session detection
pub mod desktop_env;

// Backend selection
pub mod platform;

pub use error::X11Error;
pub use platform::LinuxPlatform;
