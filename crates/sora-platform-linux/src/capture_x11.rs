#![cfg(target_os = "linux")]

use sora_core::capture::{CaptureError, PixelOrder, RawFrame, ScreenBackend};
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ConnectionExt as XprotoConnectionExt, ImageFormat};

use crate::error::X11Error;

/// Full-screen grab of the X root window with `GetImage`.
///
/// A connection is opened per grab so display restarts and resolution
/// changes need no bookkeeping.
pub struct X11ScreenGrabber {
    display: Option<String>,
}

impl X11ScreenGrabber {
    /// Use `$DISPLAY`.
    pub fn new() -> Self {
        Self { display: None }
    }

    pub fn with_display(display: impl Into<String>) -> Self {
        Self {
            display: Some(display.into()),
        }
    }
}

impl Default for X11ScreenGrabber {
    fn default() -> Self {
        Self::new()
    }
}

impl X11ScreenGrabber {
    fn grab(&self) -> Result<(u16, u16, u8, u8, u8, Vec<u8>), X11Error> {
        let (conn, screen_num) = x11rb::connect(self.display.as_deref())?;

        let setup = conn.setup();
        let screen = setup
            .roots
            .get(screen_num)
            .ok_or(X11Error::NoScreen(screen_num))?;
        let (width, height) = (screen.width_in_pixels, screen.height_in_pixels);

        let reply = conn
            .get_image(ImageFormat::Z_PIXMAP, screen.root, 0, 0, width, height, !0)?
            .reply()?;

        let format = setup
            .pixmap_formats
            .iter()
            .find(|f| f.depth == reply.depth)
            .ok_or(X11Error::NoPixmapFormat(reply.depth))?;

        debug!(
            "X11 image {}x{} depth {} bpp {}",
            width, height, reply.depth, format.bits_per_pixel
        );
        Ok((
            width,
            height,
            reply.depth,
            format.bits_per_pixel,
            format.scanline_pad,
            reply.data,
        ))
    }
}

impl ScreenBackend for X11ScreenGrabber {
    fn grab_screen(&self) -> Result<RawFrame, CaptureError> {
        let (width, height, depth, bpp, scanline_pad, image) = self.grab()?;
        let data = zpixmap_to_bgrx(
            &image,
            usize::from(width),
            usize::from(height),
            depth,
            bpp,
            scanline_pad,
        )?;

        Ok(RawFrame {
            width: u32::from(width),
            height: u32::from(height),
            order: PixelOrder::Bgrx,
            data,
        })
    }
}

/// Repack a ZPixmap image into tight BGRX rows.
///
/// Only 32 bits per pixel with depth 24 or 32 is supported, which covers
/// TrueColor visuals on little-endian servers.
fn zpixmap_to_bgrx(
    data: &[u8],
    width: usize,
    height: usize,
    depth: u8,
    bits_per_pixel: u8,
    scanline_pad: u8,
) -> Result<Vec<u8>, CaptureError> {
    if !(depth == 24 || depth == 32) || bits_per_pixel != 32 {
        return Err(CaptureError::CaptureFailed(format!(
            "unsupported depth {depth} at {bits_per_pixel} bpp"
        )));
    }

    let row = width * 4;
    let pad = usize::from(scanline_pad.max(8)) / 8;
    let stride = row.div_ceil(pad) * pad;
    if data.len() < stride * height.saturating_sub(1) + row {
        return Err(CaptureError::FrameSize {
            expected: stride * height,
            actual: data.len(),
        });
    }

    if stride == row {
        return Ok(data[..row * height].to_vec());
    }

    let mut out = Vec::with_capacity(row * height);
    for y in 0..height {
        let start = y * stride;
        out.extend_from_slice(&data[start..start + row]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_tight_rows_copied() {
        let data: Vec<u8> = (0..32).collect();
        let out = zpixmap_to_bgrx(&data, 4, 2, 24, 32, 32).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_padded_rows_are_repacked() {
        // 3 pixels = 12 bytes per row, padded to 16 by a 128-bit scanline pad.
        let mut data = Vec::new();
        for y in 0..2u8 {
            data.extend(std::iter::repeat(y + 1).take(12));
            data.extend([0xEE; 4]);
        }
        let out = zpixmap_to_bgrx(&data, 3, 2, 24, 32, 128).unwrap();
        assert_eq!(out.len(), 24);
        assert!(out[..12].iter().all(|&b| b == 1));
        assert!(out[12..].iter().all(|&b| b == 2));
    }

    #[test]
    fn test_short_buffer_rejected() {
        let err = zpixmap_to_bgrx(&[0; 10], 4, 2, 24, 32, 32).unwrap_err();
        assert!(matches!(err, CaptureError::FrameSize { .. }));
    }

    #[test]
    fn test_unsupported_depth() {
        assert!(zpixmap_to_bgrx(&[0; 8], 2, 2, 16, 16, 32).is_err());
    }

    proptest! {
        #[test]
        fn test_repacked_size(width in 1usize..64, height in 1usize..16, pad in prop::sample::select(vec![8u8, 16, 32, 64, 128])) {
            let stride = (width * 4).div_ceil(usize::from(pad) / 8) * (usize::from(pad) / 8);
            let data = vec![0x7Fu8; stride * height];
            let out = zpixmap_to_bgrx(&data, width, height, 24, 32, pad).unwrap();
            prop_assert_eq!(out.len(), width * height * 4);
        }
    }
}
