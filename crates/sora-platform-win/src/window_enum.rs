#![cfg(windows)]
#![allow(unsafe_code)] // Windows API calls require unsafe.

use std::ffi::c_void;

use sora_core::window::{RawWindow, WindowBackend, WindowError};
use tracing::debug;
use windows::core::BOOL;
use windows::Win32::{
    Foundation::{HWND, LPARAM, RECT},
    UI::WindowsAndMessaging::*,
};

fn to_hwnd(handle: u64) -> HWND {
    HWND(handle as usize as *mut c_void)
}

fn to_handle(hwnd: HWND) -> u64 {
    hwnd.0 as usize as u64
}

unsafe extern "system" fn collect_hwnd(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = &mut *(lparam.0 as *mut Vec<HWND>);
    handles.push(hwnd);
    BOOL::from(true) // Continue enumeration
}

unsafe fn window_title(hwnd: HWND) -> String {
    let len = GetWindowTextLengthW(hwnd);
    if len <= 0 {
        return String::new();
    }
    let mut buf = vec![0u16; len as usize + 1];
    let copied = GetWindowTextW(hwnd, &mut buf);
    String::from_utf16_lossy(&buf[..copied.max(0) as usize])
}

unsafe fn describe(hwnd: HWND, foreground: HWND) -> Option<RawWindow> {
    let mut rect = RECT::default();
    GetWindowRect(hwnd, &mut rect).ok()?;

    Some(RawWindow {
        handle: to_handle(hwnd),
        title: window_title(hwnd),
        x: rect.left,
        y: rect.top,
        width: rect.right - rect.left,
        height: rect.bottom - rect.top,
        visible: IsWindowVisible(hwnd).as_bool(),
        minimized: IsIconic(hwnd).as_bool(),
        maximized: IsZoomed(hwnd).as_bool(),
        active: hwnd == foreground,
    })
}

/// Top-level windows via `EnumWindows`; activation via `SetForegroundWindow`.
#[derive(Debug, Default)]
pub struct Win32Windows;

impl Win32Windows {
    pub fn new() -> Self {
        Self
    }
}

impl WindowBackend for Win32Windows {
    fn list_windows(&self) -> Result<Vec<RawWindow>, WindowError> {
        let mut handles: Vec<HWND> = Vec::new();
        unsafe {
            EnumWindows(
                Some(collect_hwnd),
                LPARAM(&mut handles as *mut Vec<HWND> as isize),
            )
            .map_err(|e| WindowError::EnumerationFailed(format!("EnumWindows failed: {e}")))?;

            let foreground = GetForegroundWindow();
            let windows: Vec<RawWindow> = handles
                .iter()
                .filter_map(|&hwnd| describe(hwnd, foreground))
                .collect();
            debug!("{} top-level windows", windows.len());
            Ok(windows)
        }
    }

    fn restore(&self, handle: u64) -> Result<(), WindowError> {
        let hwnd = to_hwnd(handle);
        unsafe {
            if !IsWindow(Some(hwnd)).as_bool() {
                return Err(WindowError::NotFound);
            }
            // Return value is the previous visibility, not success.
            let _ = ShowWindow(hwnd, SW_RESTORE);
        }
        Ok(())
    }

    fn bring_to_front(&self, handle: u64) -> Result<(), WindowError> {
        let hwnd = to_hwnd(handle);
        unsafe {
            if !IsWindow(Some(hwnd)).as_bool() {
                return Err(WindowError::NotFound);
            }
            let _ = BringWindowToTop(hwnd);
            if !SetForegroundWindow(hwnd).as_bool() {
                return Err(WindowError::ActivationFailed(
                    "SetForegroundWindow refused".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_conversion() {
        let hwnd = to_hwnd(0x1234);
        assert_eq!(to_handle(hwnd), 0x1234);
    }
}
