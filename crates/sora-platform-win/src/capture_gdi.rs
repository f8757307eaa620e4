#![cfg(windows)]
#![allow(unsafe_code)] // Windows API calls require unsafe.

use sora_core::capture::{CaptureError, PixelOrder, RawFrame, ScreenBackend};
use tracing::debug;
use windows::Win32::{
    Graphics::Gdi::*,
    UI::WindowsAndMessaging::*,
};

fn win32(call: &str) -> CaptureError {
    CaptureError::CaptureFailed(format!("{call} failed"))
}

/// Screen DC released on drop.
struct ScreenDc(HDC);

impl Drop for ScreenDc {
    fn drop(&mut self) {
        unsafe {
            let _ = ReleaseDC(None, self.0);
        }
    }
}

/// Memory DC deleted on drop.
struct MemoryDc(HDC);

impl Drop for MemoryDc {
    fn drop(&mut self) {
        unsafe {
            let _ = DeleteDC(self.0);
        }
    }
}

/// Bitmap deleted on drop. Must be deselected before its DC goes away.
struct Bitmap(HBITMAP);

impl Drop for Bitmap {
    fn drop(&mut self) {
        unsafe {
            let _ = DeleteObject(self.0.into());
        }
    }
}

/// GDI BitBlt capture of the primary display into a 32bpp top-down DIB.
///
/// GDI handles are created per grab; they are not `Send` and the grab rate
/// is a handful per minute at most.
#[derive(Debug, Default)]
pub struct GdiScreenGrabber;

impl GdiScreenGrabber {
    pub fn new() -> Self {
        Self
    }
}

impl ScreenBackend for GdiScreenGrabber {
    fn grab_screen(&self) -> Result<RawFrame, CaptureError> {
        unsafe { capture_primary() }
    }
}

unsafe fn capture_primary() -> Result<RawFrame, CaptureError> {
    let w = GetSystemMetrics(SM_CXSCREEN);
    let h = GetSystemMetrics(SM_CYSCREEN);
    if w <= 0 || h <= 0 {
        return Err(CaptureError::CaptureFailed("no primary display".into()));
    }

    let screen = GetDC(None);
    if screen.is_invalid() {
        return Err(win32("GetDC"));
    }
    let screen = ScreenDc(screen);

    let memory = CreateCompatibleDC(Some(screen.0));
    if memory.is_invalid() {
        return Err(win32("CreateCompatibleDC"));
    }
    let memory = MemoryDc(memory);

    let bitmap = CreateCompatibleBitmap(screen.0, w, h);
    if bitmap.is_invalid() {
        return Err(win32("CreateCompatibleBitmap"));
    }
    let bitmap = Bitmap(bitmap);

    let old = SelectObject(memory.0, bitmap.0.into());
    if old.is_invalid() {
        return Err(win32("SelectObject"));
    }

    let blit = BitBlt(memory.0, 0, 0, w, h, Some(screen.0), 0, 0, SRCCOPY);

    let stride = (w as usize) * 4;
    let mut buffer = vec![0u8; stride * (h as usize)];
    let mut bmi = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: w,
            biHeight: -h, // top-down DIB
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0 as u32,
            ..Default::default()
        },
        ..Default::default()
    };

    let scanlines = if blit.is_ok() {
        // The bitmap must not be selected into a DC during GetDIBits.
        let _ = SelectObject(memory.0, old);
        GetDIBits(
            memory.0,
            bitmap.0,
            0,
            h as u32,
            Some(buffer.as_mut_ptr() as *mut _),
            &mut bmi,
            DIB_RGB_COLORS,
        )
    } else {
        let _ = SelectObject(memory.0, old);
        0
    };

    blit.map_err(|e| CaptureError::CaptureFailed(format!("BitBlt failed: {e}")))?;
    if scanlines == 0 {
        return Err(win32("GetDIBits"));
    }

    debug!("GDI capture {}x{}", w, h);
    Ok(RawFrame {
        width: w as u32,
        height: h as u32,
        order: PixelOrder::Bgrx,
        data: buffer,
    })
}
