#![cfg(windows)]
// Note: Individual modules use #![allow(unsafe_code)] for Windows API calls

// Screen capture
pub mod capture_gdi;

// Window enumeration and activation
pub mod window_enum;

// Backend bundle
pub mod platform;

pub use platform::WinPlatform;
