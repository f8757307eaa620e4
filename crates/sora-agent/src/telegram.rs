//! Telegram Bot API adapter.
//!
//! [`TelegramChannel`] implements the core reply channel with teloxide;
//! [`serve`] long-polls updates and feeds them to the core dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use sora_core::capture::CaptureResult;
use sora_core::channel::{
    ChannelError, Command, ConversationId, InboundEvent, Keyboard, MessageRef, ReplyChannel,
};
use sora_core::dispatch::Dispatcher as CommandDispatcher;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::prelude::*;
use teloxide::types::{
    BotCommand, CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId,
};
use teloxide::update_listeners::{Polling, PollingBuilder};
use tracing::{debug, info, warn};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

fn send_error(err: teloxide::RequestError) -> ChannelError {
    ChannelError::Send(err.to_string())
}

/// Convert a core keyboard into Telegram inline markup.
pub fn inline_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.payload.clone()))
            .collect::<Vec<_>>()
    }))
}

/// Command menu entries registered with the Bot API.
pub fn bot_commands() -> Vec<BotCommand> {
    Command::ALL
        .iter()
        .map(|c| BotCommand::new(c.name(), c.description()))
        .collect()
}

/// Map a text message to a command event. Non-command text is ignored.
pub fn message_event(msg: &Message) -> Option<InboundEvent> {
    let command = Command::parse(msg.text()?)?;
    let sender = msg.from.as_ref()?;
    Some(InboundEvent::Command {
        conversation: msg.chat.id.0,
        sender: sender.id.0.to_string(),
        command,
    })
}

pub fn callback_event(q: &CallbackQuery) -> InboundEvent {
    let (conversation, message) = match &q.message {
        Some(m) => {
            let conversation = m.chat().id.0;
            (
                conversation,
                Some(MessageRef {
                    conversation,
                    message_id: m.id().0,
                }),
            )
        }
        // Without the message, answer the presser directly.
        None => (q.from.id.0 as ConversationId, None),
    };
    InboundEvent::Callback {
        callback_id: q.id.clone(),
        conversation,
        message,
        sender: q.from.id.0.to_string(),
        payload: q.data.clone().unwrap_or_default(),
    }
}

pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ReplyChannel for TelegramChannel {
    async fn send_text(
        &self,
        conversation: ConversationId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageRef, ChannelError> {
        let mut request = self.bot.send_message(ChatId(conversation), text);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(inline_markup(&keyboard));
        }
        let sent = request.await.map_err(send_error)?;
        Ok(MessageRef {
            conversation,
            message_id: sent.id.0,
        })
    }

    async fn send_image(
        &self,
        conversation: ConversationId,
        image: &CaptureResult,
        caption: &str,
    ) -> Result<MessageRef, ChannelError> {
        let stem = match image.format {
            sora_core::capture::ImageFormat::Png => "screenshot",
            sora_core::capture::ImageFormat::Jpeg => "camera",
        };
        let file = InputFile::memory(image.data.to_vec()).file_name(image.file_name(stem));
        let sent = self
            .bot
            .send_photo(ChatId(conversation), file)
            .caption(caption)
            .await
            .map_err(send_error)?;
        Ok(MessageRef {
            conversation,
            message_id: sent.id.0,
        })
    }

    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<(), ChannelError> {
        self.bot
            .edit_message_text(ChatId(message.conversation), MessageId(message.message_id), text)
            .await
            .map_err(send_error)?;
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), ChannelError> {
        self.bot
            .delete_message(ChatId(message.conversation), MessageId(message.message_id))
            .await
            .map_err(send_error)?;
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> Result<(), ChannelError> {
        self.bot
            .answer_callback_query(callback_id.to_string())
            .await
            .map_err(send_error)?;
        Ok(())
    }
}

/// Register the command menu. Failures are logged and ignored.
pub async fn register_commands(bot: &Bot) {
    match bot.set_my_commands(bot_commands()).await {
        Ok(_) => debug!("command menu registered"),
        Err(e) => warn!("command menu registration failed: {}", e),
    }
}

async fn on_message(msg: Message, core: Arc<CommandDispatcher>) -> HandlerResult {
    if let Some(event) = message_event(&msg) {
        if let Err(e) = core.dispatch(event).await {
            warn!("reply to chat {} failed: {}", msg.chat.id, e);
        }
    }
    Ok(())
}

async fn on_callback(q: CallbackQuery, core: Arc<CommandDispatcher>) -> HandlerResult {
    let event = callback_event(&q);
    if let Err(e) = core.dispatch(event).await {
        warn!("callback reply failed: {}", e);
    }
    Ok(())
}

/// Long-poll configuration. Updates queued while the agent was offline are
/// discarded, so a command sent hours ago never triggers a capture now.
pub fn polling(bot: Bot) -> PollingBuilder<Bot> {
    Polling::builder(bot).drop_pending_updates()
}

/// Long-poll updates until Ctrl-C.
pub async fn serve(bot: Bot, core: Arc<CommandDispatcher>) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback));

    let listener = polling(bot.clone()).build();

    info!("listening for Telegram updates");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![core])
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("update listener error"),
        )
        .await;
    info!("update listener stopped");
}
