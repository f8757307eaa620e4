//! Messaging channel abstraction.
//!
//! The dispatcher talks to the remote user only through [`ReplyChannel`];
//! the agent crate implements it on top of the Telegram Bot API.

use async_trait::async_trait;
use thiserror::Error;

use crate::auth::PrincipalId;
use crate::capture::CaptureResult;

/// Chat the reply is addressed to.
pub type ConversationId = i64;

/// Callback payload prefix for window buttons.
pub const WINDOW_CALLBACK_PREFIX: &str = "window_";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("send failed: {0}")]
    Send(String),
    #[error("message not found")]
    MessageNotFound,
    #[error("channel closed")]
    Closed,
}

/// Handle for a message that was sent, used for later edits and deletes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub conversation: ConversationId,
    pub message_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

impl Button {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

/// Inline keyboard, row-major.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn button_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(Vec::is_empty)
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }
}

/// Outbound operations on the messaging channel.
#[async_trait]
pub trait ReplyChannel: Send + Sync {
    async fn send_text(
        &self,
        conversation: ConversationId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageRef, ChannelError>;

    async fn send_image(
        &self,
        conversation: ConversationId,
        image: &CaptureResult,
        caption: &str,
    ) -> Result<MessageRef, ChannelError>;

    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<(), ChannelError>;

    async fn delete(&self, message: &MessageRef) -> Result<(), ChannelError>;

    /// Acknowledge a button press so the client stops its spinner.
    async fn acknowledge(&self, callback_id: &str) -> Result<(), ChannelError>;
}

/// Commands the agent understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    Screenshot,
    Camera,
    Windows,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::Start,
        Command::Screenshot,
        Command::Camera,
        Command::Windows,
    ];

    /// Parse the first word of a message, e.g. `/screenshot@sora_bot now`.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split_once('@').map_or(name, |(n, _)| n);
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start),
            "screenshot" => Some(Command::Screenshot),
            "camera" => Some(Command::Camera),
            "windows" => Some(Command::Windows),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Screenshot => "screenshot",
            Command::Camera => "camera",
            Command::Windows => "windows",
        }
    }

    /// Text shown in the client's command menu.
    pub fn description(self) -> &'static str {
        match self {
            Command::Start => "Show available commands",
            Command::Screenshot => "Take a screenshot",
            Command::Camera => "Take a webcam photo",
            Command::Windows => "List open windows",
        }
    }

    /// Whether the command needs the admin principal.
    pub fn requires_authorization(self) -> bool {
        !matches!(self, Command::Start)
    }
}

/// An update received from the channel, already stripped of transport detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Command {
        conversation: ConversationId,
        sender: PrincipalId,
        command: Command,
    },
    Callback {
        callback_id: String,
        conversation: ConversationId,
        /// Message carrying the keyboard, when the client still has it.
        message: Option<MessageRef>,
        sender: PrincipalId,
        payload: String,
    },
}

impl InboundEvent {
    pub fn sender(&self) -> &str {
        match self {
            InboundEvent::Command { sender, .. } | InboundEvent::Callback { sender, .. } => sender,
        }
    }

    pub fn conversation(&self) -> ConversationId {
        match self {
            InboundEvent::Command { conversation, .. }
            | InboundEvent::Callback { conversation, .. } => *conversation,
        }
    }
}

/// Window button payload for list position `index`.
pub fn window_payload(index: usize) -> String {
    format!("{WINDOW_CALLBACK_PREFIX}{index}")
}

/// Parsed callback payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackToken {
    /// `window_<n>` with a valid index.
    Window(usize),
    /// `window_` prefix with an unusable suffix.
    MalformedWindow,
    /// Some other payload.
    Unknown,
}

impl CallbackToken {
    pub fn parse(payload: &str) -> Self {
        match payload.strip_prefix(WINDOW_CALLBACK_PREFIX) {
            Some(rest) => rest
                .parse::<usize>()
                .map(CallbackToken::Window)
                .unwrap_or(CallbackToken::MalformedWindow),
            None => CallbackToken::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/screenshot please"), Some(Command::Screenshot));
        assert_eq!(Command::parse("/Camera@sora_bot"), Some(Command::Camera));
        assert_eq!(Command::parse("  /windows"), Some(Command::Windows));
    }

    #[test]
    fn test_parse_rejects_non_commands() {
        assert_eq!(Command::parse("screenshot"), None);
        assert_eq!(Command::parse("/shutdown"), None);
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("/"), None);
    }

    #[test]
    fn test_only_start_is_public() {
        let gated: Vec<_> = Command::ALL
            .iter()
            .filter(|c| c.requires_authorization())
            .collect();
        assert_eq!(gated, vec![&Command::Screenshot, &Command::Camera, &Command::Windows]);
    }

    #[test]
    fn test_callback_token() {
        assert_eq!(CallbackToken::parse("window_0"), CallbackToken::Window(0));
        assert_eq!(CallbackToken::parse("window_19"), CallbackToken::Window(19));
        assert_eq!(CallbackToken::parse("window_x"), CallbackToken::MalformedWindow);
        assert_eq!(CallbackToken::parse("window_-1"), CallbackToken::MalformedWindow);
        assert_eq!(CallbackToken::parse("noop"), CallbackToken::Unknown);
        assert_eq!(CallbackToken::parse(&window_payload(7)), CallbackToken::Window(7));
    }

    #[test]
    fn test_keyboard_counts() {
        let kb = Keyboard {
            rows: vec![
                vec![Button::new("a", "1"), Button::new("b", "2")],
                vec![Button::new("c", "3")],
            ],
        };
        assert_eq!(kb.button_count(), 3);
        assert!(!kb.is_empty());
        assert!(Keyboard::default().is_empty());
    }
}
