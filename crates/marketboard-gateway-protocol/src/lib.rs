//! Gateway Protocol types for communication between the marketboard core and
//! its platform gateway.
//!
//! The protocol is bidirectional:
//!
//! - **Commands** (core → gateway): create or delete private channels, send
//!   prompts, post and update listing cards, answer button presses
//! - **Events** (gateway → core): ready, incoming messages, button presses,
//!   channel deletions and command results
//!
//! Every command that expects a result carries a `request_id`; the gateway
//! answers with [`GatewayEvent::CommandOk`] or [`GatewayEvent::CommandError`]
//! carrying the same id. All types serialize as internally tagged JSON so a
//! gateway can also run out of process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Commands (core → Gateway)
// ============================================================================

/// Commands sent from the core to a gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Send a text message to a chat, optionally with buttons.
    SendMessage {
        request_id: String,
        chat_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inline_keyboard: Option<InlineKeyboard>,
    },

    /// Create a text channel visible only to `owner_id` and the privileged roles.
    ///
    /// Answered with `CommandOk { resource_id: Some(channel_id) }`.
    CreatePrivateChannel {
        request_id: String,
        name: String,
        owner_id: String,
        #[serde(default)]
        privileged_roles: Vec<String>,
    },

    /// Delete a channel.
    DeleteChannel { request_id: String, chat_id: String },

    /// Post a listing card. Answered with the new message id as `resource_id`.
    PostListing {
        request_id: String,
        chat_id: String,
        card: ListingCard,
    },

    /// Replace a previously posted listing card.
    EditListing {
        request_id: String,
        chat_id: String,
        message_id: String,
        card: ListingCard,
    },

    /// Delete a message.
    DeleteMessage {
        request_id: String,
        chat_id: String,
        message_id: String,
    },

    /// Post the board message unless a bot-authored message containing
    /// `marker` is already among the recent messages of the channel.
    EnsureBoard {
        request_id: String,
        chat_id: String,
        marker: String,
        content: String,
        inline_keyboard: InlineKeyboard,
    },

    /// Answer a button press. `None` dismisses the pending response silently.
    AnswerButton {
        request_id: String,
        interaction_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },

    /// Request graceful shutdown.
    Shutdown,
}

impl GatewayCommand {
    /// Correlation id of the command, `None` for [`GatewayCommand::Shutdown`].
    pub fn request_id(&self) -> Option<&str> {
        match self {
            GatewayCommand::SendMessage { request_id, .. }
            | GatewayCommand::CreatePrivateChannel { request_id, .. }
            | GatewayCommand::DeleteChannel { request_id, .. }
            | GatewayCommand::PostListing { request_id, .. }
            | GatewayCommand::EditListing { request_id, .. }
            | GatewayCommand::DeleteMessage { request_id, .. }
            | GatewayCommand::EnsureBoard { request_id, .. }
            | GatewayCommand::AnswerButton { request_id, .. } => Some(request_id),
            GatewayCommand::Shutdown => None,
        }
    }
}

/// Rows of interactive buttons attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboard {
    /// Rows of buttons (each row is a Vec of buttons).
    pub rows: Vec<Vec<InlineButton>>,
}

/// A button in an inline keyboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    /// Button text displayed to user.
    pub text: String,
    /// Callback data sent when button is pressed.
    pub callback_data: String,
    #[serde(default)]
    pub style: ButtonStyle,
}

/// Visual style of a button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    #[default]
    Primary,
    Secondary,
    Success,
    Danger,
}

impl InlineKeyboard {
    /// Create a single-row keyboard with the given buttons.
    pub fn single_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: vec![buttons],
        }
    }

    /// Iterate over the callback data of every button.
    pub fn callback_data(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(|b| b.callback_data.as_str())
    }
}

impl InlineButton {
    /// Create a new primary button.
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
            style: ButtonStyle::Primary,
        }
    }

    pub fn with_style(mut self, style: ButtonStyle) -> Self {
        self.style = style;
        self
    }
}

/// A structured listing post (rendered as an embed on Discord).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingCard {
    pub title: String,
    pub description: String,
    /// RGB colour of the card accent.
    pub colour: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_keyboard: Option<InlineKeyboard>,
}

// ============================================================================
// Events (Gateway → core)
// ============================================================================

/// Events sent from a gateway to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Gateway is connected and ready to receive commands.
    Ready {
        gateway: String,
        version: String,
        #[serde(default)]
        capabilities: Vec<String>,
    },

    /// Incoming message from a member.
    MessageReceived(Box<MessageReceivedData>),

    /// A member pressed a button.
    ButtonPressed(Box<ButtonPressedData>),

    /// A channel was deleted on the platform.
    ChatDeleted { chat_id: String },

    /// Command completed successfully.
    CommandOk {
        request_id: String,
        /// Id of the created resource (channel or message), if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resource_id: Option<String>,
    },

    /// Command failed.
    CommandError {
        request_id: String,
        code: String,
        message: String,
    },

    /// Gateway-level error (not tied to a specific command).
    Error {
        code: String,
        message: String,
        /// Whether this error is fatal (gateway will shut down).
        #[serde(default)]
        fatal: bool,
    },

    /// Gateway is shutting down.
    Shutdown { reason: String },
}

/// Data for a button press.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonPressedData {
    /// Platform id of the interaction, used to answer it.
    pub interaction_id: String,
    /// Chat where the button was pressed.
    pub chat_id: String,
    /// Message that carried the button.
    pub message_id: String,
    /// Member who pressed the button.
    pub sender: Sender,
    /// Callback data of the pressed button.
    pub data: String,
}

/// Data for an incoming message event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReceivedData {
    pub message_id: String,
    pub chat_id: String,
    pub sender: Sender,
    pub content: MessageContent,
    /// Timestamp when the message was sent (from the platform).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Sender information for incoming messages and button presses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Role ids held by the sender in the guild.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Whether the sender is an automated account.
    #[serde(default)]
    pub is_bot: bool,
}

impl Sender {
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        self.roles.iter().any(|r| roles.contains(&r.as_str()))
    }
}

/// Content of an incoming message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text message.
    Text { text: String },

    /// Attachment, possibly with a caption.
    Media {
        media_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },

    /// Content with neither text nor attachment, such as a sticker.
    Unknown {
        #[serde(default)]
        raw: serde_json::Value,
    },
}

impl MessageContent {
    /// Extract text content if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text { text } => Some(text),
            MessageContent::Media { caption, .. } => caption.as_deref(),
            MessageContent::Unknown { .. } => None,
        }
    }
}

// ============================================================================
// Gateway Capabilities
// ============================================================================

/// Well-known gateway capabilities.
pub mod capabilities {
    /// Gateway can create and delete private channels.
    pub const PRIVATE_CHANNELS: &str = "private_channels";
    /// Gateway can post and edit listing cards.
    pub const LISTING_CARDS: &str = "listing_cards";
    /// Gateway answers button presses ephemerally.
    pub const EPHEMERAL_REPLY: &str = "ephemeral_reply";
    /// Gateway supports inline keyboards for interactive buttons.
    pub const INLINE_KEYBOARD: &str = "inline_keyboard";
}

// ============================================================================
// Error Codes
// ============================================================================

/// Well-known error codes for CommandError and Error events.
pub mod error_codes {
    /// Pending interaction not found (already answered or expired).
    pub const INTERACTION_NOT_FOUND: &str = "interaction_not_found";
    /// Invalid request from the core.
    pub const INVALID_REQUEST: &str = "invalid_request";
}
