#![cfg(target_os = "linux")]

//! Top-level window listing and activation through EWMH hints.
//!
//! Needs a window manager that maintains `_NET_CLIENT_LIST`; practically all
//! current X11 window managers do.

use sora_core::window::{RawWindow, WindowBackend, WindowError};
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ClientMessageEvent, ConfigureWindowAux, ConnectionExt as XprotoConnectionExt,
    EventMask, MapState, StackMode, Window,
};
use x11rb::rust_connection::RustConnection;
use x11rb::CURRENT_TIME;

use crate::error::X11Error;

x11rb::atom_manager! {
    pub Atoms: AtomsCookie {
        _NET_CLIENT_LIST,
        _NET_ACTIVE_WINDOW,
        _NET_WM_NAME,
        _NET_WM_STATE,
        _NET_WM_STATE_HIDDEN,
        _NET_WM_STATE_MAXIMIZED_VERT,
        _NET_WM_STATE_MAXIMIZED_HORZ,
        UTF8_STRING,
    }
}

/// `_NET_ACTIVE_WINDOW` source indication for pagers and taskbars, which
/// window managers honour more readily than application requests.
const SOURCE_PAGER: u32 = 2;

fn activation(context: &str, err: impl std::fmt::Display) -> WindowError {
    WindowError::ActivationFailed(format!("{context}: {err}"))
}

fn window_id(handle: u64) -> Result<Window, WindowError> {
    Window::try_from(handle).map_err(|_| WindowError::NotFound)
}

struct Session {
    conn: RustConnection,
    root: Window,
    atoms: Atoms,
}

impl Session {
    fn open(display: Option<&str>) -> Result<Self, X11Error> {
        let (conn, screen_num) = x11rb::connect(display)?;
        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .map(|s| s.root)
            .ok_or(X11Error::NoScreen(screen_num))?;
        let atoms = Atoms::new(&conn)?.reply()?;
        Ok(Self { conn, root, atoms })
    }

    fn property32(&self, window: Window, property: u32, kind: impl Into<u32>) -> Vec<u32> {
        let reply = self
            .conn
            .get_property(false, window, property, kind.into(), 0, u32::MAX)
            .ok()
            .and_then(|cookie| cookie.reply().ok());
        reply
            .and_then(|r| r.value32().map(|values| values.collect()))
            .unwrap_or_default()
    }

    fn title(&self, window: Window) -> String {
        let read = |property: u32, kind: u32| {
            self.conn
                .get_property(false, window, property, kind, 0, 1024)
                .ok()
                .and_then(|cookie| cookie.reply().ok())
                .map(|r| r.value)
                .filter(|v| !v.is_empty())
        };
        read(self.atoms._NET_WM_NAME, self.atoms.UTF8_STRING)
            .or_else(|| read(AtomEnum::WM_NAME.into(), AtomEnum::STRING.into()))
            .map(|bytes| decode_title(&bytes))
            .unwrap_or_default()
    }

    fn describe(&self, window: Window, active: Window) -> Option<RawWindow> {
        let geometry = self.conn.get_geometry(window).ok()?.reply().ok()?;
        let origin = self
            .conn
            .translate_coordinates(window, self.root, 0, 0)
            .ok()?
            .reply()
            .ok()?;
        let attributes = self.conn.get_window_attributes(window).ok()?.reply().ok()?;

        let state = self.property32(window, self.atoms._NET_WM_STATE, AtomEnum::ATOM);
        let flags = StateFlags::from_atoms(&state, &self.atoms);

        Some(RawWindow {
            handle: u64::from(window),
            title: self.title(window),
            x: i32::from(origin.dst_x),
            y: i32::from(origin.dst_y),
            width: i32::from(geometry.width),
            height: i32::from(geometry.height),
            // Iconified windows are unmapped but still count as open.
            visible: attributes.map_state == MapState::VIEWABLE || flags.hidden,
            minimized: flags.hidden,
            maximized: flags.maximized,
            active: window == active,
        })
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct StateFlags {
    hidden: bool,
    maximized: bool,
}

impl StateFlags {
    fn from_atoms(state: &[u32], atoms: &Atoms) -> Self {
        Self::from_ids(
            state,
            atoms._NET_WM_STATE_HIDDEN,
            atoms._NET_WM_STATE_MAXIMIZED_VERT,
            atoms._NET_WM_STATE_MAXIMIZED_HORZ,
        )
    }

    fn from_ids(state: &[u32], hidden: u32, max_vert: u32, max_horz: u32) -> Self {
        Self {
            hidden: state.contains(&hidden),
            maximized: state.contains(&max_vert) && state.contains(&max_horz),
        }
    }
}

/// Titles are UTF-8 under `_NET_WM_NAME`; legacy `WM_NAME` is Latin-1 but
/// lossy UTF-8 is close enough for a label.
fn decode_title(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// EWMH window backend.
pub struct EwmhWindows {
    display: Option<String>,
}

impl EwmhWindows {
    pub fn new() -> Self {
        Self { display: None }
    }

    pub fn with_display(display: impl Into<String>) -> Self {
        Self {
            display: Some(display.into()),
        }
    }
}

impl Default for EwmhWindows {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowBackend for EwmhWindows {
    fn list_windows(&self) -> Result<Vec<RawWindow>, WindowError> {
        let session = Session::open(self.display.as_deref())?;
        let clients = session.property32(session.root, session.atoms._NET_CLIENT_LIST, AtomEnum::WINDOW);
        let active = session
            .property32(session.root, session.atoms._NET_ACTIVE_WINDOW, AtomEnum::WINDOW)
            .first()
            .copied()
            .unwrap_or(0);

        let windows: Vec<RawWindow> = clients
            .iter()
            .filter_map(|&w| session.describe(w, active))
            .collect();
        debug!("{} EWMH clients, {} described", clients.len(), windows.len());
        Ok(windows)
    }

    fn restore(&self, handle: u64) -> Result<(), WindowError> {
        let window = window_id(handle)?;
        let session = Session::open(self.display.as_deref())?;
        session
            .conn
            .map_window(window)
            .map_err(|e| activation("MapWindow", e))?;
        session.conn.flush().map_err(|e| activation("flush", e))?;
        Ok(())
    }

    fn bring_to_front(&self, handle: u64) -> Result<(), WindowError> {
        let window = window_id(handle)?;
        let session = Session::open(self.display.as_deref())?;

        let event = ClientMessageEvent::new(
            32,
            window,
            session.atoms._NET_ACTIVE_WINDOW,
            [SOURCE_PAGER, CURRENT_TIME, 0, 0, 0],
        );
        session
            .conn
            .send_event(
                false,
                session.root,
                EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
                event,
            )
            .map_err(|e| activation("SendEvent", e))?;
        session
            .conn
            .configure_window(window, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))
            .map_err(|e| activation("ConfigureWindow", e))?;
        session.conn.flush().map_err(|e| activation("flush", e))?;
        Ok(())
    }
}
