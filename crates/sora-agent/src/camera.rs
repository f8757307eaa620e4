//! Camera backend selection.
//!
//! Native capture goes through nokhwa behind the default `camera-native`
//! feature. Builds with `--no-default-features` report the camera as
//! unavailable.

use std::sync::Arc;

use sora_core::capture::CameraBackend;

#[cfg(feature = "camera-native")]
mod native {
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType, Resolution};
    use nokhwa::Camera;
    use sora_core::capture::{CameraBackend, CameraDevice, CaptureError, PixelOrder, RawFrame};
    use tracing::debug;

    pub struct NokhwaCamera;

    impl CameraBackend for NokhwaCamera {
        fn open(&self, index: u32) -> Result<Box<dyn CameraDevice>, CaptureError> {
            let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
            let mut camera = Camera::new(CameraIndex::Index(index), format)
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
            camera
                .open_stream()
                .map_err(|e| CaptureError::DeviceUnavailable(e.to_string()))?;
            debug!("camera {} opened: {}", index, camera.info().human_name());
            Ok(Box::new(NokhwaDevice { camera }))
        }
    }

    struct NokhwaDevice {
        camera: Camera,
    }

    impl CameraDevice for NokhwaDevice {
        fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), CaptureError> {
            self.camera
                .set_resolution(Resolution::new(width, height))
                .map_err(|e| CaptureError::CaptureFailed(e.to_string()))
        }

        fn read_frame(&mut self) -> Result<RawFrame, CaptureError> {
            let buffer = self
                .camera
                .frame()
                .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
            let image = buffer
                .decode_image::<RgbFormat>()
                .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
            Ok(RawFrame {
                width: image.width(),
                height: image.height(),
                order: PixelOrder::Rgb,
                data: image.into_raw(),
            })
        }

        fn release(&mut self) -> Result<(), CaptureError> {
            self.camera
                .stop_stream()
                .map_err(|e| CaptureError::CaptureFailed(e.to_string()))
        }
    }
}

/// Camera backend for this build.
pub fn camera_backend() -> Arc<dyn CameraBackend> {
    #[cfg(feature = "camera-native")]
    {
        Arc::new(native::NokhwaCamera)
    }
    #[cfg(not(feature = "camera-native"))]
    {
        Arc::new(sora_core::capture::NoCamera)
    }
}

#[cfg(all(test, not(feature = "camera-native")))]
mod tests {
    use super::*;

    #[test]
    fn test_camera_unavailable_without_native_backend() {
        let err = camera_backend().open(0).err().unwrap();
        assert!(err.is_device_unavailable());
    }
}

#[cfg(all(test, feature = "camera-native"))]
mod native_tests {
    use super::*;
    use sora_core::capture::CaptureError;

    #[test]
    fn test_native_backend_is_wired() {
        // No host has this many cameras; the native backend reports the
        // device itself rather than a missing backend.
        let err = camera_backend().open(u32::MAX).err().unwrap();
        assert!(err.is_device_unavailable());
        assert_ne!(err, CaptureError::DeviceUnavailable("no camera backend".into()));
    }
}
