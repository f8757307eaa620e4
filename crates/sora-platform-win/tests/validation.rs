#![cfg(windows)]

use sora_core::capture::{CaptureService, NoCamera, ScreenBackend};
use sora_core::window::{WindowBackend, WindowService};
use sora_platform_win::WinPlatform;

/// Validation tests for sora-platform-win backends.
/// These need an interactive desktop session.

#[test]
fn test_gdi_grab() {
    let platform = WinPlatform::new();
    let frame = platform.screen().grab_screen();
    assert!(frame.is_ok(), "GDI grab should work");

    let frame = frame.unwrap();
    assert!(frame.width > 0, "Frame should have width > 0");
    assert!(frame.height > 0, "Frame should have height > 0");
    assert_eq!(frame.data.len(), (frame.width * frame.height * 4) as usize);
}

#[test]
fn test_enumerate_windows() {
    let platform = WinPlatform::new();
    let windows = platform.windows().list_windows();
    assert!(windows.is_ok(), "EnumWindows should work");
    // Every session has at least a shell or console window.
    assert!(!windows.unwrap().is_empty());
}

#[tokio::test]
async fn test_screenshot_encodes_png() {
    let platform = WinPlatform::new();
    let service = CaptureService::new(platform.screen(), std::sync::Arc::new(NoCamera));
    let result = service.capture_screen().await.expect("screen capture");
    assert!(result.data.starts_with(&[0x89, b'P', b'N', b'G']));
}

#[tokio::test]
async fn test_window_service_lists_titled_windows() {
    let platform = WinPlatform::new();
    let service = WindowService::new(platform.windows());
    let windows = service.enumerate().await.expect("enumeration");
    assert!(windows.iter().all(|w| !w.title.is_empty()));
    assert!(windows.iter().all(|w| w.process_guess.ends_with(".exe")));
}
