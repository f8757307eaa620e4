//! Screen and camera capture.
//!
//! Backends hand back raw pixel buffers; [`CaptureService`] normalises the
//! channel order and encodes PNG (screen) or JPEG (camera).

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("no capture backend available")]
    NoBackend,
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("camera busy")]
    DeviceBusy,
    #[error("frame capture failed: {0}")]
    CaptureFailed(String),
    #[error("frame has {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },
    #[error("image encoding failed: {0}")]
    Encode(String),
}

impl CaptureError {
    /// Device absent or held elsewhere.
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, CaptureError::DeviceUnavailable(_) | CaptureError::DeviceBusy)
    }
}

/// Byte order of a raw pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrder {
    Rgb,
    Bgr,
    Rgba,
    Bgra,
    /// 32-bit BGR with an undefined fourth byte (X11 ZPixmap, GDI DIB).
    Bgrx,
}

impl PixelOrder {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelOrder::Rgb | PixelOrder::Bgr => 3,
            PixelOrder::Rgba | PixelOrder::Bgra | PixelOrder::Bgrx => 4,
        }
    }
}

/// Tightly packed pixel rows as produced by a backend.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub order: PixelOrder,
    pub data: Vec<u8>,
}

impl RawFrame {
    fn check_len(&self) -> Result<usize, CaptureError> {
        let pixels = self.width as usize * self.height as usize;
        let expected = pixels * self.order.bytes_per_pixel();
        if pixels == 0 || self.data.len() != expected {
            return Err(CaptureError::FrameSize {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(pixels)
    }

    /// Convert to packed RGBA8.
    pub fn to_rgba(&self) -> Result<Vec<u8>, CaptureError> {
        let pixels = self.check_len()?;
        let bpp = self.order.bytes_per_pixel();
        let mut out = Vec::with_capacity(pixels * 4);
        for px in self.data.chunks_exact(bpp) {
            let (r, g, b, a) = match self.order {
                PixelOrder::Rgb => (px[0], px[1], px[2], 255),
                PixelOrder::Bgr => (px[2], px[1], px[0], 255),
                PixelOrder::Rgba => (px[0], px[1], px[2], px[3]),
                PixelOrder::Bgra => (px[2], px[1], px[0], px[3]),
                PixelOrder::Bgrx => (px[2], px[1], px[0], 255),
            };
            out.extend_from_slice(&[r, g, b, a]);
        }
        Ok(out)
    }

    /// Convert to packed RGB8, dropping any alpha.
    pub fn to_rgb(&self) -> Result<Vec<u8>, CaptureError> {
        let pixels = self.check_len()?;
        let bpp = self.order.bytes_per_pixel();
        let mut out = Vec::with_capacity(pixels * 3);
        for px in self.data.chunks_exact(bpp) {
            match self.order {
                PixelOrder::Rgb | PixelOrder::Rgba => out.extend_from_slice(&px[..3]),
                PixelOrder::Bgr | PixelOrder::Bgra | PixelOrder::Bgrx => {
                    out.extend_from_slice(&[px[2], px[1], px[0]])
                }
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

/// An encoded image ready to attach to a reply.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub data: Bytes,
    pub format: ImageFormat,
    pub captured_at: DateTime<Local>,
}

impl CaptureResult {
    /// File name used for attachments, e.g. `screenshot_20240101_120000.png`.
    pub fn file_name(&self, stem: &str) -> String {
        format!(
            "{}_{}.{}",
            stem,
            self.captured_at.format("%Y%m%d_%H%M%S"),
            self.format.extension()
        )
    }
}

/// Grabs the full composited desktop. Calls may block.
pub trait ScreenBackend: Send + Sync {
    fn grab_screen(&self) -> Result<RawFrame, CaptureError>;
}

/// An open camera. Dropping it without [`release`](CameraDevice::release)
/// is allowed but backends should release in `release`.
pub trait CameraDevice {
    fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), CaptureError>;
    fn read_frame(&mut self) -> Result<RawFrame, CaptureError>;
    fn release(&mut self) -> Result<(), CaptureError>;
}

/// Opens camera devices. Calls may block.
pub trait CameraBackend: Send + Sync {
    fn open(&self, index: u32) -> Result<Box<dyn CameraDevice>, CaptureError>;
}

/// Owns an open camera and releases it when dropped.
struct CameraGuard {
    device: Box<dyn CameraDevice>,
}

impl CameraGuard {
    fn new(device: Box<dyn CameraDevice>) -> Self {
        Self { device }
    }
}

impl std::ops::Deref for CameraGuard {
    type Target = dyn CameraDevice;

    fn deref(&self) -> &Self::Target {
        self.device.as_ref()
    }
}

impl std::ops::DerefMut for CameraGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.device.as_mut()
    }
}

impl Drop for CameraGuard {
    fn drop(&mut self) {
        if let Err(e) = self.device.release() {
            debug!("camera release failed (ignored): {}", e);
        }
    }
}

/// Camera capture parameters.
#[derive(Debug, Clone)]
pub struct CameraOptions {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    /// Frames read and discarded so exposure and focus can settle.
    pub warmup_frames: u32,
    pub jpeg_quality: u8,
}

impl Default for CameraOptions {
    fn default() -> Self {
        Self {
            index: 0,
            width: 1280,
            height: 720,
            warmup_frames: 5,
            jpeg_quality: 90,
        }
    }
}

pub struct CaptureService {
    screen: Arc<dyn ScreenBackend>,
    camera: Arc<dyn CameraBackend>,
    camera_options: CameraOptions,
    // Held for the whole lifetime of an open camera.
    camera_lock: Arc<Mutex<()>>,
}

impl CaptureService {
    pub fn new(screen: Arc<dyn ScreenBackend>, camera: Arc<dyn CameraBackend>) -> Self {
        Self {
            screen,
            camera,
            camera_options: CameraOptions::default(),
            camera_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_camera_options(mut self, options: CameraOptions) -> Self {
        self.camera_options = options;
        self
    }

    /// Grab the desktop and encode it as PNG.
    pub async fn capture_screen(&self) -> Result<CaptureResult, CaptureError> {
        let screen = self.screen.clone();
        let data = tokio::task::spawn_blocking(move || {
            let frame = screen.grab_screen()?;
            debug!("screen frame {}x{} {:?}", frame.width, frame.height, frame.order);
            encode_png(&frame)
        })
        .await
        .map_err(|e| CaptureError::CaptureFailed(e.to_string()))??;

        Ok(CaptureResult {
            data: Bytes::from(data),
            format: ImageFormat::Png,
            captured_at: Local::now(),
        })
    }

    /// Take one camera photo and encode it as JPEG.
    ///
    /// Only one capture may hold the camera; a concurrent call fails with
    /// [`CaptureError::DeviceBusy`] instead of waiting.
    pub async fn capture_camera(&self) -> Result<CaptureResult, CaptureError> {
        let permit = self
            .camera_lock
            .clone()
            .try_lock_owned()
            .map_err(|_| CaptureError::DeviceBusy)?;

        let camera = self.camera.clone();
        let options = self.camera_options.clone();
        let data = tokio::task::spawn_blocking(move || {
            // Guard is dropped before the permit, so the device is released
            // before another capture can start.
            let _permit = permit;
            let mut device = CameraGuard::new(camera.open(options.index)?);
            shoot(&mut device, &options)
        })
        .await
        .map_err(|e| CaptureError::CaptureFailed(e.to_string()))??;

        info!("camera photo captured ({} bytes)", data.len());
        Ok(CaptureResult {
            data: Bytes::from(data),
            format: ImageFormat::Jpeg,
            captured_at: Local::now(),
        })
    }
}

fn shoot(device: &mut CameraGuard, options: &CameraOptions) -> Result<Vec<u8>, CaptureError> {
    if let Err(e) = device.set_resolution(options.width, options.height) {
        debug!("camera resolution {}x{} not applied: {}", options.width, options.height, e);
    }

    for n in 0..options.warmup_frames {
        if let Err(e) = device.read_frame() {
            debug!("warm-up frame {} dropped: {}", n, e);
        }
    }

    let frame = device.read_frame().map_err(|e| match e {
        CaptureError::DeviceUnavailable(_) | CaptureError::DeviceBusy => e,
        other => CaptureError::CaptureFailed(other.to_string()),
    })?;
    encode_jpeg(&frame, options.jpeg_quality)
}

/// Encode a frame as PNG.
pub fn encode_png(frame: &RawFrame) -> Result<Vec<u8>, CaptureError> {
    let rgba = frame.to_rgba()?;
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(&rgba, frame.width, frame.height, ExtendedColorType::Rgba8)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(out)
}

/// Encode a frame as JPEG at `quality` (1-100).
pub fn encode_jpeg(frame: &RawFrame, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let rgb = frame.to_rgb()?;
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .write_image(&rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    Ok(out)
}

/// Camera backend for builds without a native camera stack.
pub struct NoCamera;

impl CameraBackend for NoCamera {
    fn open(&self, _index: u32) -> Result<Box<dyn CameraDevice>, CaptureError> {
        warn!("camera requested but no camera backend is compiled in");
        Err(CaptureError::DeviceUnavailable("no camera backend".into()))
    }
}

/// Screen backend for hosts without a supported display server.
pub struct NoScreen;

impl ScreenBackend for NoScreen {
    fn grab_screen(&self) -> Result<RawFrame, CaptureError> {
        Err(CaptureError::NoBackend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{solid_frame, ScriptedCamera, ScriptedScreen};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G'];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

    #[test]
    fn test_bgr_to_rgb() {
        let frame = RawFrame {
            width: 2,
            height: 1,
            order: PixelOrder::Bgr,
            data: vec![1, 2, 3, 4, 5, 6],
        };
        assert_eq!(frame.to_rgb().unwrap(), vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_bgrx_to_rgba_forces_opaque() {
        let frame = RawFrame {
            width: 1,
            height: 1,
            order: PixelOrder::Bgrx,
            data: vec![10, 20, 30, 0],
        };
        assert_eq!(frame.to_rgba().unwrap(), vec![30, 20, 10, 255]);
    }

    #[test]
    fn test_frame_size_mismatch() {
        let frame = RawFrame {
            width: 4,
            height: 4,
            order: PixelOrder::Rgba,
            data: vec![0; 10],
        };
        assert!(matches!(
            frame.to_rgba(),
            Err(CaptureError::FrameSize { expected: 64, actual: 10 })
        ));
    }

    #[test]
    fn test_empty_frame_rejected() {
        let frame = RawFrame {
            width: 0,
            height: 0,
            order: PixelOrder::Rgb,
            data: Vec::new(),
        };
        assert!(encode_png(&frame).is_err());
    }

    #[test]
    fn test_file_name() {
        let result = CaptureResult {
            data: Bytes::new(),
            format: ImageFormat::Jpeg,
            captured_at: Local::now(),
        };
        let name = result.file_name("camera");
        assert!(name.starts_with("camera_"));
        assert!(name.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_capture_screen_png() {
        let screen = Arc::new(ScriptedScreen::new(solid_frame(8, 6, PixelOrder::Bgrx)));
        let service = CaptureService::new(screen.clone(), Arc::new(NoCamera));

        let result = service.capture_screen().await.unwrap();
        assert_eq!(result.format, ImageFormat::Png);
        assert!(result.data.starts_with(PNG_MAGIC));
        assert_eq!(screen.calls(), 1);
    }

    #[tokio::test]
    async fn test_capture_screen_no_backend() {
        let service = CaptureService::new(Arc::new(NoScreen), Arc::new(NoCamera));
        assert_eq!(service.capture_screen().await.unwrap_err(), CaptureError::NoBackend);
    }

    #[tokio::test]
    async fn test_capture_camera_jpeg_and_warmup() {
        let camera = Arc::new(ScriptedCamera::new(solid_frame(16, 9, PixelOrder::Bgr)));
        let service = CaptureService::new(Arc::new(NoScreen), camera.clone());

        let result = service.capture_camera().await.unwrap();
        assert_eq!(result.format, ImageFormat::Jpeg);
        assert!(result.data.starts_with(JPEG_MAGIC));
        // Five warm-up reads plus the kept frame.
        assert_eq!(camera.frames_read(), 6);
        assert_eq!(camera.requested_resolution(), Some((1280, 720)));
        assert!(!camera.is_open());
    }

    #[tokio::test]
    async fn test_camera_released_on_read_failure() {
        let camera = Arc::new(ScriptedCamera::new(solid_frame(4, 4, PixelOrder::Bgr)).fail_reads());
        let service = CaptureService::new(Arc::new(NoScreen), camera.clone());

        let err = service.capture_camera().await.unwrap_err();
        assert!(matches!(err, CaptureError::CaptureFailed(_)));
        assert!(!camera.is_open());
        assert_eq!(camera.releases(), 1);
    }

    #[tokio::test]
    async fn test_camera_release_error_swallowed() {
        let camera = Arc::new(ScriptedCamera::new(solid_frame(4, 4, PixelOrder::Bgr)).fail_release());
        let service = CaptureService::new(Arc::new(NoScreen), camera.clone());

        assert!(service.capture_camera().await.is_ok());
        assert!(!camera.is_open());
    }

    #[tokio::test]
    async fn test_camera_busy_fails_fast() {
        let camera = Arc::new(ScriptedCamera::new(solid_frame(4, 4, PixelOrder::Bgr)));
        let service = CaptureService::new(Arc::new(NoScreen), camera.clone());

        let _held = service.camera_lock.clone().try_lock_owned().unwrap();
        assert_eq!(service.capture_camera().await.unwrap_err(), CaptureError::DeviceBusy);
        assert_eq!(camera.opens(), 0);
    }

    #[tokio::test]
    async fn test_no_camera_is_unavailable() {
        let service = CaptureService::new(Arc::new(NoScreen), Arc::new(NoCamera));
        assert!(service.capture_camera().await.unwrap_err().is_device_unavailable());
    }
}
