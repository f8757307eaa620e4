//! Sora Core - authorized remote-command dispatch for the Sora agent.
//!
//! This crate implements:
//! - Credential storage behind an obfuscation cipher
//! - The single-principal authorization gate
//! - Per-conversation window selection sessions
//! - Screen, camera and window services over pluggable platform backends
//! - The command/callback dispatcher and its reply channel abstraction

#![forbid(unsafe_code)]

// Credentials
pub mod cipher;
pub mod config;

// Services
pub mod auth;
pub mod capture;
pub mod session;
pub mod window;

// Dispatch
pub mod channel;
pub mod dispatch;

// Supporting modules
pub mod errors;
pub mod testing;

/// Product name shown in replies and the startup banner.
pub const PRODUCT_NAME: &str = "Sora-Client";

/// Crate version, reported by the `start` command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
