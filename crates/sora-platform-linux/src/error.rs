#![cfg(target_os = "linux")]

use sora_core::capture::CaptureError;
use sora_core::window::WindowError;
use thiserror::Error;
use x11rb::errors::{ConnectError, ConnectionError, ReplyError};

#[derive(Debug, Error)]
pub enum X11Error {
    #[error("X11 connect failed: {0}")]
    Connect(#[from] ConnectError),
    #[error("X11 connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("X11 request failed: {0}")]
    Reply(#[from] ReplyError),
    #[error("no X screen {0}")]
    NoScreen(usize),
    #[error("no pixmap format for depth {0}")]
    NoPixmapFormat(u8),
}

impl From<X11Error> for CaptureError {
    fn from(err: X11Error) -> Self {
        CaptureError::CaptureFailed(err.to_string())
    }
}

impl From<X11Error> for WindowError {
    fn from(err: X11Error) -> Self {
        WindowError::EnumerationFailed(err.to_string())
    }
}
