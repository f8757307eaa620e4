//! Sora Agent - host-side daemon answering remote commands over Telegram.
//!
//! Wires the core dispatcher to the Bot API, the host's screen and window
//! backends and, when built with `camera-native`, a webcam.

pub mod app;
pub mod camera;
pub mod logging;
pub mod platform;
pub mod settings;
pub mod telegram;
