//! Top-level window enumeration and activation.
//!
//! Platform crates implement [`WindowBackend`]; [`WindowService`] applies the
//! filtering, labelling and ordering rules on top of it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

/// Delay after a focus request, giving the window manager time to react.
pub const DEFAULT_ACTIVATION_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("no window backend available")]
    NoBackend,
    #[error("window enumeration failed: {0}")]
    EnumerationFailed(String),
    #[error("window not found")]
    NotFound,
    #[error("window activation failed: {0}")]
    ActivationFailed(String),
}

/// A window as reported by the platform, before filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawWindow {
    /// Opaque platform handle (HWND, X11 window id).
    pub handle: u64,
    pub title: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub visible: bool,
    pub minimized: bool,
    pub maximized: bool,
    pub active: bool,
}

/// Platform window operations. Calls may block.
pub trait WindowBackend: Send + Sync {
    fn list_windows(&self) -> Result<Vec<RawWindow>, WindowError>;
    fn restore(&self, handle: u64) -> Result<(), WindowError>;
    fn bring_to_front(&self, handle: u64) -> Result<(), WindowError>;
}

/// Window backend for hosts without a supported window system.
pub struct NoWindows;

impl WindowBackend for NoWindows {
    fn list_windows(&self) -> Result<Vec<RawWindow>, WindowError> {
        Err(WindowError::NoBackend)
    }

    fn restore(&self, _handle: u64) -> Result<(), WindowError> {
        Err(WindowError::NoBackend)
    }

    fn bring_to_front(&self, _handle: u64) -> Result<(), WindowError> {
        Err(WindowError::NoBackend)
    }
}

/// A window as presented to the remote user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowDescriptor {
    pub title: String,
    /// Label guessed from the title; not read from the process table.
    pub process_guess: String,
    pub position: (i32, i32),
    pub size: (i32, i32),
    pub is_maximized: bool,
    pub is_minimized: bool,
    pub is_active: bool,
}

impl WindowDescriptor {
    fn from_raw(raw: &RawWindow) -> Self {
        let title = raw.title.trim().to_string();
        Self {
            process_guess: guess_process(&title),
            title,
            position: (raw.x, raw.y),
            size: (raw.width, raw.height),
            is_maximized: raw.maximized,
            is_minimized: raw.minimized,
            is_active: raw.active,
        }
    }

    /// Three-letter state tag: `[M]` minimized, `[A]` active or maximized,
    /// `[N]` otherwise.
    pub fn status_tag(&self) -> &'static str {
        if self.is_minimized {
            "[M]"
        } else if self.is_maximized || self.is_active {
            "[A]"
        } else {
            "[N]"
        }
    }
}

/// Guess an executable name from a window title.
///
/// `"Report.docx - Word"` gives `"word.exe"`; titles without a `" - "`
/// separator use the whole title.
pub fn guess_process(title: &str) -> String {
    let title = title.trim();
    let app = match title.rsplit_once(" - ") {
        Some((_, last)) => last.trim(),
        None => title,
    };
    format!("{}.exe", app.to_lowercase().replace(' ', "_"))
}

fn keep(raw: &RawWindow) -> bool {
    raw.visible && !raw.title.trim().is_empty() && raw.width > 0 && raw.height > 0
}

/// Order: active window first, then case-insensitive title.
fn sort_descriptors(windows: &mut [WindowDescriptor]) {
    windows.sort_by(|a, b| {
        b.is_active
            .cmp(&a.is_active)
            .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
    });
}

pub struct WindowService {
    backend: Arc<dyn WindowBackend>,
    activation_delay: Duration,
}

impl WindowService {
    pub fn new(backend: Arc<dyn WindowBackend>) -> Self {
        Self {
            backend,
            activation_delay: DEFAULT_ACTIVATION_DELAY,
        }
    }

    pub fn with_activation_delay(mut self, delay: Duration) -> Self {
        self.activation_delay = delay;
        self
    }

    /// List visible, titled, non-empty windows in presentation order.
    pub async fn enumerate(&self) -> Result<Vec<WindowDescriptor>, WindowError> {
        let backend = self.backend.clone();
        let raw = tokio::task::spawn_blocking(move || backend.list_windows())
            .await
            .map_err(|e| WindowError::EnumerationFailed(e.to_string()))??;

        let mut windows: Vec<WindowDescriptor> =
            raw.iter().filter(|w| keep(w)).map(WindowDescriptor::from_raw).collect();
        sort_descriptors(&mut windows);

        debug!("enumerated {} of {} windows", windows.len(), raw.len());
        Ok(windows)
    }

    /// Bring the first window titled exactly `title` to the foreground.
    ///
    /// Best effort: `true` means the platform accepted the request, not that
    /// the window manager honoured it.
    pub async fn activate(&self, title: &str) -> bool {
        let backend = self.backend.clone();
        let wanted = title.trim().to_string();

        let result = tokio::task::spawn_blocking(move || -> Result<(), WindowError> {
            let target = backend
                .list_windows()?
                .into_iter()
                .find(|w| w.title.trim() == wanted)
                .ok_or(WindowError::NotFound)?;

            if target.minimized {
                backend.restore(target.handle)?;
            }
            backend.bring_to_front(target.handle)
        })
        .await;

        match result {
            Ok(Ok(())) => {
                tokio::time::sleep(self.activation_delay).await;
                true
            }
            Ok(Err(e)) => {
                warn!("window activation failed: {}", e);
                false
            }
            Err(e) => {
                warn!("window activation task failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{raw_window, ScriptedWindows};
    use proptest::prelude::*;

    #[test]
    fn test_guess_process_with_separator() {
        assert_eq!(guess_process("Report.docx - Microsoft Word"), "microsoft_word.exe");
        assert_eq!(guess_process("a - b - Visual Studio Code"), "visual_studio_code.exe");
    }

    #[test]
    fn test_guess_process_without_separator() {
        assert_eq!(guess_process("Calculator"), "calculator.exe");
        assert_eq!(guess_process("  Task Manager "), "task_manager.exe");
        // Hyphen without surrounding spaces is not a separator.
        assert_eq!(guess_process("well-known"), "well-known.exe");
    }

    #[test]
    fn test_guess_process_trailing_separator() {
        assert_eq!(guess_process("Untitled - "), "untitled_-.exe");
    }

    #[test]
    fn test_status_tag() {
        let mut w = WindowDescriptor::from_raw(&raw_window(1, "x"));
        assert_eq!(w.status_tag(), "[N]");
        w.is_active = true;
        assert_eq!(w.status_tag(), "[A]");
        w.is_active = false;
        w.is_maximized = true;
        assert_eq!(w.status_tag(), "[A]");
        w.is_minimized = true;
        assert_eq!(w.status_tag(), "[M]");
    }

    #[tokio::test]
    async fn test_enumerate_filters_and_sorts() {
        let mut hidden = raw_window(1, "Hidden");
        hidden.visible = false;
        let mut zero = raw_window(2, "Zero");
        zero.width = 0;
        let blank = raw_window(3, "   ");
        let mut active = raw_window(4, "zeta - Editor");
        active.active = true;

        let backend = Arc::new(ScriptedWindows::new(vec![
            hidden,
            zero,
            blank,
            raw_window(5, "beta"),
            active,
            raw_window(6, "Alpha"),
        ]));
        let service = WindowService::new(backend);

        let windows = service.enumerate().await.unwrap();
        let titles: Vec<_> = windows.iter().map(|w| w.title.as_str()).collect();
        assert_eq!(titles, vec!["zeta - Editor", "Alpha", "beta"]);
        assert_eq!(windows[0].process_guess, "editor.exe");
    }

    #[tokio::test]
    async fn test_enumerate_propagates_backend_failure() {
        let backend = Arc::new(ScriptedWindows::failing());
        let service = WindowService::new(backend);
        assert!(service.enumerate().await.is_err());
    }

    #[tokio::test]
    async fn test_no_backend() {
        let service = WindowService::new(Arc::new(NoWindows));
        assert_eq!(service.enumerate().await, Err(WindowError::NoBackend));
        assert!(!service.activate("anything").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_restores_minimized() {
        let mut minimized = raw_window(7, "Notes");
        minimized.minimized = true;
        let backend = Arc::new(ScriptedWindows::new(vec![minimized]));
        let service = WindowService::new(backend.clone());

        assert!(service.activate("Notes").await);
        assert_eq!(backend.restored(), vec![7]);
        assert_eq!(backend.focused(), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_requires_exact_title() {
        let backend = Arc::new(ScriptedWindows::new(vec![raw_window(8, "Notes - Draft")]));
        let service = WindowService::new(backend.clone());

        assert!(!service.activate("Notes").await);
        assert!(backend.focused().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_reports_focus_failure() {
        let backend = Arc::new(ScriptedWindows::new(vec![raw_window(9, "Shell")]).refuse_focus());
        let service = WindowService::new(backend);
        assert!(!service.activate("Shell").await);
    }

    proptest! {
        #[test]
        fn test_guess_process_shape(title in "\\PC{0,40}") {
            let guess = guess_process(&title);
            prop_assert!(guess.ends_with(".exe"));
            prop_assert!(!guess.contains(' '));
        }
    }
}
