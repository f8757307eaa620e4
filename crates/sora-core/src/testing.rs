//! Test doubles for the channel and the platform backends.
//!
//! Each fake records what was asked of it so tests can assert on call
//! counts as well as on replies.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::capture::{
    CameraBackend, CameraDevice, CaptureError, CaptureResult, ImageFormat, PixelOrder, RawFrame,
    ScreenBackend,
};
use crate::channel::{ChannelError, ConversationId, Keyboard, MessageRef, ReplyChannel};
use crate::window::{guess_process, RawWindow, WindowBackend, WindowDescriptor, WindowError};

// ============================================================================
// Builders
// ============================================================================

/// A visible, normal 800x600 window.
pub fn raw_window(handle: u64, title: &str) -> RawWindow {
    RawWindow {
        handle,
        title: title.to_string(),
        x: 10,
        y: 10,
        width: 800,
        height: 600,
        visible: true,
        minimized: false,
        maximized: false,
        active: false,
    }
}

/// Descriptor for a normal window titled `title`.
pub fn descriptor(title: &str) -> WindowDescriptor {
    WindowDescriptor {
        title: title.to_string(),
        process_guess: guess_process(title),
        position: (0, 0),
        size: (800, 600),
        is_maximized: false,
        is_minimized: false,
        is_active: false,
    }
}

/// Frame filled with a single mid-grey value.
pub fn solid_frame(width: u32, height: u32, order: PixelOrder) -> RawFrame {
    let len = width as usize * height as usize * order.bytes_per_pixel();
    RawFrame {
        width,
        height,
        order,
        data: vec![0x80; len],
    }
}

// ============================================================================
// Recording Channel
// ============================================================================

/// One outbound operation, in the order the dispatcher issued it.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        conversation: ConversationId,
        message_id: i32,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Image {
        conversation: ConversationId,
        message_id: i32,
        format: ImageFormat,
        bytes: usize,
        caption: String,
    },
    Edit {
        message: MessageRef,
        text: String,
    },
    Delete {
        message: MessageRef,
    },
    Ack {
        callback_id: String,
    },
}

/// Channel that records every call and hands out sequential message ids.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<Sent>>,
    next_id: AtomicU32,
    fail_sends: AtomicBool,
    fail_images: AtomicBool,
    fail_keyboards: AtomicBool,
    fail_deletes: AtomicBool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send fail with [`ChannelError::Send`].
    pub fn fail_sends(self) -> Self {
        self.fail_sends.store(true, Ordering::Relaxed);
        self
    }

    /// Reject attachments only, as the Bot API does for oversized photos.
    pub fn fail_images(self) -> Self {
        self.fail_images.store(true, Ordering::Relaxed);
        self
    }

    /// Reject only messages that carry a keyboard.
    pub fn fail_keyboards(self) -> Self {
        self.fail_keyboards.store(true, Ordering::Relaxed);
        self
    }

    pub fn fail_deletes(self) -> Self {
        self.fail_deletes.store(true, Ordering::Relaxed);
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    /// Texts of sent messages (not edits).
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Edit { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(format, caption)` of every attachment.
    pub fn images(&self) -> Vec<(ImageFormat, String)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| match s {
                Sent::Image { format, caption, .. } => Some((*format, caption.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|s| matches!(s, Sent::Delete { .. }))
            .count()
    }

    /// Keyboard of the most recent text message that carried one.
    pub fn last_keyboard(&self) -> Option<Keyboard> {
        self.sent.lock().iter().rev().find_map(|s| match s {
            Sent::Text {
                keyboard: Some(kb), ..
            } => Some(kb.clone()),
            _ => None,
        })
    }

    fn allocate(&self, conversation: ConversationId) -> Result<MessageRef, ChannelError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(ChannelError::Send("induced failure".into()));
        }
        let message_id = self.next_id.fetch_add(1, Ordering::Relaxed) as i32 + 1;
        Ok(MessageRef {
            conversation,
            message_id,
        })
    }
}

#[async_trait]
impl ReplyChannel for RecordingChannel {
    async fn send_text(
        &self,
        conversation: ConversationId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageRef, ChannelError> {
        if keyboard.is_some() && self.fail_keyboards.load(Ordering::Relaxed) {
            return Err(ChannelError::Send("REPLY_MARKUP_INVALID".into()));
        }
        let message = self.allocate(conversation)?;
        self.sent.lock().push(Sent::Text {
            conversation,
            message_id: message.message_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(message)
    }

    async fn send_image(
        &self,
        conversation: ConversationId,
        image: &CaptureResult,
        caption: &str,
    ) -> Result<MessageRef, ChannelError> {
        if self.fail_images.load(Ordering::Relaxed) {
            return Err(ChannelError::Send("PHOTO_INVALID_DIMENSIONS".into()));
        }
        let message = self.allocate(conversation)?;
        self.sent.lock().push(Sent::Image {
            conversation,
            message_id: message.message_id,
            format: image.format,
            bytes: image.data.len(),
            caption: caption.to_string(),
        });
        Ok(message)
    }

    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<(), ChannelError> {
        self.sent.lock().push(Sent::Edit {
            message: *message,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), ChannelError> {
        if self.fail_deletes.load(Ordering::Relaxed) {
            return Err(ChannelError::MessageNotFound);
        }
        self.sent.lock().push(Sent::Delete { message: *message });
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), ChannelError> {
        self.sent.lock().push(Sent::Ack {
            callback_id: callback_id.to_string(),
        });
        Ok(())
    }
}

// ============================================================================
// Scripted Screen
// ============================================================================

pub struct ScriptedScreen {
    frame: RawFrame,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl ScriptedScreen {
    pub fn new(frame: RawFrame) -> Self {
        Self {
            frame,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// A 64x48 BGRX desktop.
    pub fn desktop() -> Self {
        Self::new(solid_frame(64, 48, PixelOrder::Bgrx))
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl ScreenBackend for ScriptedScreen {
    fn grab_screen(&self) -> Result<RawFrame, CaptureError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Relaxed) {
            return Err(CaptureError::CaptureFailed("induced failure".into()));
        }
        Ok(self.frame.clone())
    }
}

// ============================================================================
// Scripted Camera
// ============================================================================

#[derive(Default)]
struct CameraState {
    open: bool,
    opens: usize,
    releases: usize,
    frames_read: usize,
    resolution: Option<(u32, u32)>,
}

/// Camera that models exclusive device ownership: opening while already
/// open reports the device as unavailable.
pub struct ScriptedCamera {
    frame: RawFrame,
    state: Arc<Mutex<CameraState>>,
    absent: AtomicBool,
    fail_reads: AtomicBool,
    fail_release: AtomicBool,
}

impl ScriptedCamera {
    pub fn new(frame: RawFrame) -> Self {
        Self {
            frame,
            state: Arc::new(Mutex::new(CameraState::default())),
            absent: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
            fail_release: AtomicBool::new(false),
        }
    }

    /// A 32x18 BGR webcam.
    pub fn webcam() -> Self {
        Self::new(solid_frame(32, 18, PixelOrder::Bgr))
    }

    pub fn fail_reads(self) -> Self {
        self.set_fail_reads(true);
        self
    }

    pub fn fail_release(self) -> Self {
        self.fail_release.store(true, Ordering::Relaxed);
        self
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Simulate an unplugged device.
    pub fn set_absent(&self, absent: bool) {
        self.absent.store(absent, Ordering::Relaxed);
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    pub fn releases(&self) -> usize {
        self.state.lock().releases
    }

    pub fn frames_read(&self) -> usize {
        self.state.lock().frames_read
    }

    pub fn requested_resolution(&self) -> Option<(u32, u32)> {
        self.state.lock().resolution
    }
}

impl CameraBackend for ScriptedCamera {
    fn open(&self, _index: u32) -> Result<Box<dyn CameraDevice>, CaptureError> {
        if self.absent.load(Ordering::Relaxed) {
            return Err(CaptureError::DeviceUnavailable("no device".into()));
        }
        let mut state = self.state.lock();
        if state.open {
            return Err(CaptureError::DeviceUnavailable("device in use".into()));
        }
        state.open = true;
        state.opens += 1;
        Ok(Box::new(ScriptedDevice {
            frame: self.frame.clone(),
            state: self.state.clone(),
            fail_reads: self.fail_reads.load(Ordering::Relaxed),
            fail_release: self.fail_release.load(Ordering::Relaxed),
        }))
    }
}

struct ScriptedDevice {
    frame: RawFrame,
    state: Arc<Mutex<CameraState>>,
    fail_reads: bool,
    fail_release: bool,
}

impl CameraDevice for ScriptedDevice {
    fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), CaptureError> {
        self.state.lock().resolution = Some((width, height));
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RawFrame, CaptureError> {
        self.state.lock().frames_read += 1;
        if self.fail_reads {
            return Err(CaptureError::CaptureFailed("induced read failure".into()));
        }
        Ok(self.frame.clone())
    }

    fn release(&mut self) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        // The handle is gone either way; only the report differs.
        state.open = false;
        state.releases += 1;
        if self.fail_release {
            return Err(CaptureError::CaptureFailed("induced release failure".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Scripted Windows
// ============================================================================

pub struct ScriptedWindows {
    windows: Mutex<Vec<RawWindow>>,
    failing: bool,
    refuse_focus: bool,
    list_calls: AtomicUsize,
    restored: Mutex<Vec<u64>>,
    focused: Mutex<Vec<u64>>,
}

impl ScriptedWindows {
    pub fn new(windows: Vec<RawWindow>) -> Self {
        Self {
            windows: Mutex::new(windows),
            failing: false,
            refuse_focus: false,
            list_calls: AtomicUsize::new(0),
            restored: Mutex::new(Vec::new()),
            focused: Mutex::new(Vec::new()),
        }
    }

    /// `n` windows titled `Document <i> - App <i>`.
    pub fn numbered(n: usize) -> Self {
        Self::new(
            (0..n)
                .map(|i| raw_window(i as u64 + 1, &format!("Document {i:02} - App {i:02}")))
                .collect(),
        )
    }

    /// Enumeration always fails.
    pub fn failing() -> Self {
        let mut scripted = Self::new(Vec::new());
        scripted.failing = true;
        scripted
    }

    /// Foreground requests are refused.
    pub fn refuse_focus(mut self) -> Self {
        self.refuse_focus = true;
        self
    }

    pub fn set_windows(&self, windows: Vec<RawWindow>) {
        *self.windows.lock() = windows;
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    pub fn restored(&self) -> Vec<u64> {
        self.restored.lock().clone()
    }

    pub fn focused(&self) -> Vec<u64> {
        self.focused.lock().clone()
    }
}

impl WindowBackend for ScriptedWindows {
    fn list_windows(&self) -> Result<Vec<RawWindow>, WindowError> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        if self.failing {
            return Err(WindowError::EnumerationFailed("induced failure".into()));
        }
        Ok(self.windows.lock().clone())
    }

    fn restore(&self, handle: u64) -> Result<(), WindowError> {
        self.restored.lock().push(handle);
        Ok(())
    }

    fn bring_to_front(&self, handle: u64) -> Result<(), WindowError> {
        if self.refuse_focus {
            return Err(WindowError::ActivationFailed("focus refused".into()));
        }
        self.focused.lock().push(handle);
        Ok(())
    }
}
