//! Command and callback dispatch.
//!
//! Every inbound event passes the [`AuthorizationGate`] before any capture,
//! enumeration or activation happens. Failures end the current request with
//! a short reply and never change dispatcher state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::auth::AuthorizationGate;
use crate::capture::{CaptureResult, CaptureService};
use crate::channel::{
    window_payload, Button, CallbackToken, ChannelError, Command, ConversationId, InboundEvent,
    Keyboard, MessageRef, ReplyChannel,
};
use crate::errors::{Action, CoreError, REJECTION_TEXT};
use crate::session::{SessionStore, MAX_SESSION_ENTRIES};
use crate::window::{WindowDescriptor, WindowService};
use crate::{PRODUCT_NAME, VERSION};

/// Caption and list timestamp format.
pub const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Windows listed in the reply text; the rest are summarised.
pub const LISTED_WINDOWS: usize = 10;

const MAX_LINE_CHARS: usize = 60;
const MAX_BUTTON_CHARS: usize = 25;
const MAX_KEYBOARD_ROWS: usize = 10;

// ============================================================================
// Usage Statistics
// ============================================================================

/// Counters for handled requests.
#[derive(Debug, Default)]
pub struct UsageStats {
    /// Commands handled (`start` from anyone, others only when authorized)
    pub commands: AtomicU64,
    pub screenshots: AtomicU64,
    pub camera_photos: AtomicU64,
    pub window_listings: AtomicU64,
    /// Authorized window button presses
    pub callbacks: AtomicU64,
    /// Requests refused by the authorization gate
    pub rejections: AtomicU64,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> UsageStatsSnapshot {
        UsageStatsSnapshot {
            commands: self.commands.load(Ordering::Relaxed),
            screenshots: self.screenshots.load(Ordering::Relaxed),
            camera_photos: self.camera_photos.load(Ordering::Relaxed),
            window_listings: self.window_listings.load(Ordering::Relaxed),
            callbacks: self.callbacks.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }

    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageStatsSnapshot {
    pub commands: u64,
    pub screenshots: u64,
    pub camera_photos: u64,
    pub window_listings: u64,
    pub callbacks: u64,
    pub rejections: u64,
}

// ============================================================================
// Reply Formatting
// ============================================================================

/// Cut `text` to `max` characters, marking the cut with `...`.
fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Reply to `start`. Unauthorized callers see their own id and nothing else.
pub fn start_text(authorized: bool, sender: &str) -> String {
    if authorized {
        let commands: Vec<String> = Command::ALL
            .iter()
            .map(|c| format!("/{} - {}", c.name(), c.description()))
            .collect();
        format!(
            "{PRODUCT_NAME} v{VERSION}\n\nAvailable commands:\n{}\n\nSystem ready.",
            commands.join("\n")
        )
    } else {
        format!("{PRODUCT_NAME} v{VERSION}\n\nID: {sender}\nAccess restricted")
    }
}

/// Text body of a `windows` reply.
pub fn format_window_list(windows: &[WindowDescriptor], at: &DateTime<Local>) -> String {
    let mut lines = vec![
        format!("Open windows ({})", windows.len()),
        format_timestamp(at),
        String::new(),
    ];
    for window in windows.iter().take(LISTED_WINDOWS) {
        let line = format!("{} {} - {}", window.status_tag(), window.process_guess, window.title);
        lines.push(clip(&line, MAX_LINE_CHARS));
    }
    if windows.len() > LISTED_WINDOWS {
        lines.push(format!("... and {} more windows", windows.len() - LISTED_WINDOWS));
    }
    lines.join("\n")
}

/// One button per selectable window; above 10 buttons they are paired.
pub fn window_keyboard(windows: &[WindowDescriptor]) -> Keyboard {
    let buttons: Vec<Button> = windows
        .iter()
        .take(MAX_SESSION_ENTRIES)
        .enumerate()
        .map(|(i, w)| Button::new(clip(&w.process_guess, MAX_BUTTON_CHARS), window_payload(i)))
        .collect();

    let rows = if buttons.len() > MAX_KEYBOARD_ROWS {
        buttons
            .chunks(2)
            .take(MAX_KEYBOARD_ROWS)
            .map(<[Button]>::to_vec)
            .collect()
    } else {
        buttons.into_iter().map(|b| vec![b]).collect()
    };
    Keyboard { rows }
}

// ============================================================================
// Dispatcher
// ============================================================================

pub struct Dispatcher {
    gate: AuthorizationGate,
    capture: CaptureService,
    windows: WindowService,
    sessions: SessionStore,
    channel: Arc<dyn ReplyChannel>,
    stats: Arc<UsageStats>,
}

impl Dispatcher {
    pub fn new(
        gate: AuthorizationGate,
        capture: CaptureService,
        windows: WindowService,
        channel: Arc<dyn ReplyChannel>,
    ) -> Self {
        Self {
            gate,
            capture,
            windows,
            sessions: SessionStore::new(),
            channel,
            stats: Arc::new(UsageStats::new()),
        }
    }

    pub fn with_sessions(mut self, sessions: SessionStore) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn stats(&self) -> &Arc<UsageStats> {
        &self.stats
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle one inbound event.
    ///
    /// Service failures are answered in the conversation and return `Ok`;
    /// only a failure to talk to the channel itself is returned.
    pub async fn dispatch(&self, event: InboundEvent) -> Result<(), ChannelError> {
        match event {
            InboundEvent::Command {
                conversation,
                sender,
                command,
            } => self.handle_command(conversation, &sender, command).await,
            InboundEvent::Callback {
                callback_id,
                conversation,
                message,
                sender,
                payload,
            } => {
                self.handle_callback(&callback_id, conversation, message, &sender, &payload)
                    .await
            }
        }
    }

    /// Tell the admin the agent is up. Failures are logged and ignored.
    pub async fn notify_started(&self) {
        let Ok(conversation) = self.gate.admin_id().parse::<ConversationId>() else {
            debug!("admin id is not a chat id, skipping startup notification");
            return;
        };
        let text = format!("{PRODUCT_NAME} started");
        if let Err(e) = self.channel.send_text(conversation, &text, None).await {
            debug!("startup notification not delivered: {}", e);
        }
    }

    async fn handle_command(
        &self,
        conversation: ConversationId,
        sender: &str,
        command: Command,
    ) -> Result<(), ChannelError> {
        let authorized = self.gate.is_authorized(sender);

        if command == Command::Start {
            UsageStats::inc(&self.stats.commands);
            let text = start_text(authorized, sender);
            self.channel.send_text(conversation, &text, None).await?;
            return Ok(());
        }

        if !authorized {
            return self.reject(conversation, sender).await;
        }

        UsageStats::inc(&self.stats.commands);
        info!(command = command.name(), conversation, "handling command");

        match command {
            Command::Screenshot => self.screenshot(conversation).await,
            Command::Camera => self.camera(conversation).await,
            Command::Windows => self.list_windows(conversation).await,
            Command::Start => Ok(()),
        }
    }

    async fn reject(&self, conversation: ConversationId, sender: &str) -> Result<(), ChannelError> {
        UsageStats::inc(&self.stats.rejections);
        warn!(sender, "rejected request from unauthorized principal");
        self.channel.send_text(conversation, REJECTION_TEXT, None).await?;
        Ok(())
    }

    async fn screenshot(&self, conversation: ConversationId) -> Result<(), ChannelError> {
        UsageStats::inc(&self.stats.screenshots);
        let status = self
            .channel
            .send_text(conversation, "Taking screenshot...", None)
            .await?;

        match self.capture.capture_screen().await {
            Ok(image) => {
                let caption = format!("Screenshot\n{}", format_timestamp(&image.captured_at));
                if let Err(e) = self.channel.send_image(conversation, &image, &caption).await {
                    return self.undelivered(conversation, Action::Screenshot, e).await;
                }
                self.discard(&status).await;
                Ok(())
            }
            Err(e) => {
                let err = CoreError::from_capture(Action::Screenshot, e);
                self.fail(conversation, &err).await
            }
        }
    }

    async fn camera(&self, conversation: ConversationId) -> Result<(), ChannelError> {
        UsageStats::inc(&self.stats.camera_photos);
        let status = self
            .channel
            .send_text(conversation, "Connecting to camera...", None)
            .await?;

        match self.capture.capture_camera().await {
            Ok(image) => {
                let caption = format!("Camera photo\n{}", format_timestamp(&image.captured_at));
                if let Err(e) = self.channel.send_image(conversation, &image, &caption).await {
                    return self.undelivered(conversation, Action::CameraPhoto, e).await;
                }
                self.discard(&status).await;
                Ok(())
            }
            Err(e) => {
                let err = CoreError::from_capture(Action::CameraPhoto, e);
                self.fail(conversation, &err).await
            }
        }
    }

    async fn list_windows(&self, conversation: ConversationId) -> Result<(), ChannelError> {
        UsageStats::inc(&self.stats.window_listings);
        let status = self
            .channel
            .send_text(conversation, "Fetching window list...", None)
            .await?;

        let windows = match self.windows.enumerate().await {
            Ok(windows) => windows,
            Err(e) => return self.fail(conversation, &CoreError::from_window(e)).await,
        };

        if windows.is_empty() {
            self.channel
                .send_text(conversation, "No open windows found", None)
                .await?;
            return Ok(());
        }

        let text = format_window_list(&windows, &Local::now());
        let keyboard = window_keyboard(&windows);
        let stored = self.sessions.put(conversation, windows);
        debug!(conversation, stored, "window selection stored");

        if let Err(e) = self.channel.send_text(conversation, &text, Some(keyboard)).await {
            return self.undelivered(conversation, Action::WindowList, e).await;
        }
        self.discard(&status).await;
        Ok(())
    }

    async fn handle_callback(
        &self,
        callback_id: &str,
        conversation: ConversationId,
        message: Option<MessageRef>,
        sender: &str,
        payload: &str,
    ) -> Result<(), ChannelError> {
        if let Err(e) = self.channel.acknowledge(callback_id).await {
            debug!("callback acknowledge failed: {}", e);
        }

        if !self.gate.is_authorized(sender) {
            UsageStats::inc(&self.stats.rejections);
            warn!(sender, "rejected callback from unauthorized principal");
            return self.reply_in_place(conversation, message, REJECTION_TEXT).await;
        }

        let index = match CallbackToken::parse(payload) {
            CallbackToken::Window(index) => Some(index),
            CallbackToken::MalformedWindow => None,
            CallbackToken::Unknown => {
                debug!(payload, "ignoring unknown callback payload");
                return Ok(());
            }
        };

        UsageStats::inc(&self.stats.callbacks);

        let Some(window) = index.and_then(|i| self.sessions.resolve(conversation, i)) else {
            debug!(conversation, payload, "stale window reference");
            let text = CoreError::StaleReference.user_message();
            return self.reply_in_place(conversation, message, text).await;
        };

        let progress = format!(
            "Activating window: {}\nTaking screenshot...",
            window.process_guess
        );
        self.reply_in_place(conversation, message, &progress).await?;

        if !self.windows.activate(&window.title).await {
            let text = CoreError::ActivationFailed.user_message();
            return self.reply_in_place(conversation, message, text).await;
        }

        let image = match self.capture.capture_screen().await {
            Ok(image) => image,
            Err(e) => {
                let err = CoreError::from_capture(Action::WindowScreenshot, e);
                warn!("window screenshot failed: {}", err);
                return self.reply_in_place(conversation, message, err.user_message()).await;
            }
        };

        if let Err(e) = self.send_window_shot(conversation, &window, &image).await {
            let err = CoreError::capture(Action::WindowScreenshot, &e);
            warn!("window screenshot not delivered: {}", err);
            if let Err(tidy) = self.reply_in_place(conversation, message, err.user_message()).await {
                debug!("failure text not delivered: {}", tidy);
            }
            return Err(e);
        }

        let done = format!("Screenshot taken for: {}", window.process_guess);
        self.reply_in_place(conversation, message, &done).await
    }

    async fn send_window_shot(
        &self,
        conversation: ConversationId,
        window: &WindowDescriptor,
        image: &CaptureResult,
    ) -> Result<(), ChannelError> {
        let caption = format!(
            "Window screenshot: {}\n{}\n{}",
            window.process_guess,
            window.title,
            format_timestamp(&image.captured_at)
        );
        self.channel.send_image(conversation, image, &caption).await?;
        Ok(())
    }

    /// Edit the keyboard message, or post a new one if the client lost it.
    async fn reply_in_place(
        &self,
        conversation: ConversationId,
        message: Option<MessageRef>,
        text: &str,
    ) -> Result<(), ChannelError> {
        match message {
            Some(message) => self.channel.edit_text(&message, text).await,
            None => self.channel.send_text(conversation, text, None).await.map(|_| ()),
        }
    }

    async fn fail(&self, conversation: ConversationId, err: &CoreError) -> Result<(), ChannelError> {
        warn!("request failed: {}", err);
        self.channel
            .send_text(conversation, err.user_message(), None)
            .await?;
        Ok(())
    }

    /// The result could not be delivered; the status message stays and the
    /// failure text follows it.
    async fn undelivered(
        &self,
        conversation: ConversationId,
        action: Action,
        err: ChannelError,
    ) -> Result<(), ChannelError> {
        let err = CoreError::capture(action, &err);
        self.fail(conversation, &err).await
    }

    /// Remove a status message. Failures are ignored.
    async fn discard(&self, status: &MessageRef) {
        if let Err(e) = self.channel.delete(status).await {
            debug!("status message not removed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::descriptor;
    use proptest::prelude::*;

    fn many(n: usize) -> Vec<WindowDescriptor> {
        (0..n).map(|i| descriptor(&format!("Doc {i} - App {i}"))).collect()
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip("short", 25), "short");
        assert_eq!(clip(&"a".repeat(25), 25), "a".repeat(25));
        let clipped = clip(&"b".repeat(30), 25);
        assert_eq!(clipped, format!("{}...", "b".repeat(22)));
        // Counts characters, not bytes.
        assert_eq!(clip(&"ж".repeat(26), 25).chars().count(), 25);
    }

    #[test]
    fn test_start_text_for_admin_lists_commands() {
        let text = start_text(true, "42");
        for command in Command::ALL {
            assert!(text.contains(&format!("/{}", command.name())));
        }
        assert!(!text.contains("ID:"));
    }

    #[test]
    fn test_start_text_for_stranger_shows_only_id() {
        let text = start_text(false, "99");
        assert!(text.contains("ID: 99"));
        assert!(text.contains("Access restricted"));
        assert!(!text.contains("/screenshot"));
    }

    #[test]
    fn test_window_list_text_small() {
        let text = format_window_list(&many(3), &Local::now());
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Open windows (3)");
        assert_eq!(lines.len(), 3 + 3);
        assert!(lines[3].starts_with("[N] app_0.exe - Doc 0"));
        assert!(!text.contains("more windows"));
    }

    #[test]
    fn test_window_list_text_overflow() {
        let text = format_window_list(&many(23), &Local::now());
        assert!(text.starts_with("Open windows (23)"));
        assert!(text.ends_with("... and 13 more windows"));
        // Header, timestamp, blank, ten windows, trailer.
        assert_eq!(text.lines().count(), 14);
    }

    #[test]
    fn test_window_list_line_is_clipped() {
        let long = descriptor(&format!("{} - Editor", "x".repeat(80)));
        let text = format_window_list(&[long], &Local::now());
        let line = text.lines().nth(3).unwrap();
        assert_eq!(line.chars().count(), 60);
        assert!(line.ends_with("..."));
    }

    #[test]
    fn test_keyboard_single_column() {
        let kb = window_keyboard(&many(10));
        assert_eq!(kb.rows.len(), 10);
        assert!(kb.rows.iter().all(|r| r.len() == 1));
        assert_eq!(kb.rows[9][0].payload, "window_9");
    }

    #[test]
    fn test_keyboard_paired_when_crowded() {
        let kb = window_keyboard(&many(11));
        assert_eq!(kb.rows.len(), 6);
        assert_eq!(kb.rows[5].len(), 1);
        assert_eq!(kb.rows[5][0].payload, "window_10");
    }

    #[test]
    fn test_keyboard_button_label_clipped() {
        let w = descriptor(&format!("doc - {}", "y".repeat(40)));
        let kb = window_keyboard(&[w]);
        assert_eq!(kb.rows[0][0].label.chars().count(), 25);
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = UsageStats::new();
        UsageStats::inc(&stats.commands);
        UsageStats::inc(&stats.commands);
        UsageStats::inc(&stats.rejections);
        let snap = stats.snapshot();
        assert_eq!(snap.commands, 2);
        assert_eq!(snap.rejections, 1);
        assert_eq!(snap.screenshots, 0);
    }

    proptest! {
        #[test]
        fn test_keyboard_bounds(n in 0usize..60) {
            let kb = window_keyboard(&many(n));
            prop_assert!(kb.rows.len() <= MAX_KEYBOARD_ROWS);
            prop_assert!(kb.button_count() <= MAX_SESSION_ENTRIES);
            prop_assert_eq!(kb.button_count(), n.min(MAX_SESSION_ENTRIES));
            for (i, button) in kb.buttons().enumerate() {
                prop_assert_eq!(&button.payload, &window_payload(i));
            }
        }
    }
}
