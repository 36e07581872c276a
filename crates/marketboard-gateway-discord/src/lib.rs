//! Discord gateway for marketboard using serenity.
//!
//! Import and call [`DiscordGateway::start`] with the channel pair obtained
//! from the core's gateway manager. Events flow out through `event_tx`,
//! commands flow in through `command_rx`.

use std::collections::HashMap;
use std::sync::Arc;

use marketboard_gateway_protocol::{
    ButtonPressedData, ButtonStyle as ProtocolButtonStyle, GatewayCommand, GatewayEvent,
    InlineKeyboard, ListingCard, MessageContent, MessageReceivedData, Sender, capabilities,
    error_codes,
};
use serenity::all::{
    ChannelId, ChannelType, CreateActionRow, CreateButton, CreateChannel, CreateEmbed,
    CreateEmbedFooter, CreateMessage, EditInteractionResponse, EditMessage, GatewayIntents,
    GetMessages, GuildChannel, GuildId, MessageId, PermissionOverwrite, PermissionOverwriteType,
    Permissions, RoleId, UserId,
};
use serenity::async_trait;
use serenity::http::Http;
use serenity::model::application::{ButtonStyle, ComponentInteraction, Interaction};
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use tokio::sync::{Mutex, OnceCell, mpsc};
use tracing::{debug, error, info, warn};

/// Number of recent board messages scanned for an existing board post.
const BOARD_SCAN_LIMIT: u8 = 50;

/// Button presses waiting for the core's answer, by interaction id.
type PendingInteractions = Arc<Mutex<HashMap<String, ComponentInteraction>>>;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the Discord gateway.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    /// Discord bot token.
    pub bot_token: String,
    /// Guild the bot manages channels in.
    pub guild_id: u64,
}

impl DiscordConfig {
    pub fn new(bot_token: impl Into<String>, guild_id: u64) -> Self {
        Self {
            bot_token: bot_token.into(),
            guild_id,
        }
    }
}

// ============================================================================
// Discord Gateway
// ============================================================================

/// Discord gateway that bridges the Discord Bot API with the marketboard core.
pub struct DiscordGateway {
    config: DiscordConfig,
}

impl DiscordGateway {
    pub fn new(config: DiscordConfig) -> Self {
        Self { config }
    }

    /// Start the gateway and communicate via the provided channels.
    ///
    /// This method blocks until shutdown is requested.
    pub async fn start(
        self,
        event_tx: mpsc::Sender<GatewayEvent>,
        mut command_rx: mpsc::Receiver<GatewayCommand>,
    ) {
        let intents = GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
            | GatewayIntents::GUILD_MEMBERS;

        let bot_user_id = Arc::new(OnceCell::new());
        let pending: PendingInteractions = Arc::new(Mutex::new(HashMap::new()));
        let handler = Handler {
            event_tx: event_tx.clone(),
            bot_user_id: bot_user_id.clone(),
            pending: pending.clone(),
        };

        let mut client = match Client::builder(&self.config.bot_token, intents)
            .event_handler(handler)
            .await
        {
            Ok(client) => client,
            Err(e) => {
                error!(error = %e, "Failed to create Discord client");
                let _ = event_tx
                    .send(GatewayEvent::Error {
                        code: "client_error".to_string(),
                        message: e.to_string(),
                        fatal: true,
                    })
                    .await;
                return;
            }
        };

        let executor = CommandExecutor {
            http: client.http.clone(),
            guild: GuildId::new(self.config.guild_id),
            bot_user_id,
            pending,
        };
        let shard_manager = client.shard_manager.clone();
        let event_tx_for_commands = event_tx.clone();

        let command_handle = tokio::spawn(async move {
            while let Some(command) = command_rx.recv().await {
                if matches!(command, GatewayCommand::Shutdown) {
                    info!("Discord gateway received shutdown command");
                    shard_manager.shutdown_all().await;
                    let _ = event_tx_for_commands
                        .send(GatewayEvent::Shutdown {
                            reason: "shutdown requested".to_string(),
                        })
                        .await;
                    break;
                }

                let event = executor.execute(command).await;
                if event_tx_for_commands.send(event).await.is_err() {
                    break;
                }
            }
            debug!("Command handler stopped");
        });

        // Start the Discord client (this blocks until shutdown)
        if let Err(e) = client.start().await {
            error!(error = %e, "Discord client error");
        }

        command_handle.abort();
        info!("Discord gateway stopped");
    }
}

// ============================================================================
// Event Handler
// ============================================================================

struct Handler {
    event_tx: mpsc::Sender<GatewayEvent>,
    /// Bot user ID, set from the Ready event.
    bot_user_id: Arc<OnceCell<u64>>,
    pending: PendingInteractions,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, _ctx: Context, msg: Message) {
        // Skip bot messages to avoid loops
        if msg.author.bot {
            return;
        }

        let stickers: Vec<String> = msg.sticker_items.iter().map(|s| s.name.clone()).collect();
        let content = message_content(
            &msg.content,
            msg.attachments
                .first()
                .map(|a| (a.content_type.as_deref(), a.url.as_str())),
            stickers,
        );

        let event = GatewayEvent::MessageReceived(Box::new(MessageReceivedData {
            message_id: msg.id.to_string(),
            chat_id: msg.channel_id.to_string(),
            sender: extract_sender(&msg),
            content,
            timestamp: {
                let ts = msg.timestamp;
                chrono::DateTime::from_timestamp(ts.unix_timestamp(), ts.nanosecond())
            },
        }));

        if let Err(e) = self.event_tx.send(event).await {
            warn!(error = %e, "Failed to send message event");
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Component(component) = interaction else {
            return;
        };

        self.handle_component_interaction(&ctx, component).await;
    }

    async fn channel_delete(
        &self,
        _ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        let event = GatewayEvent::ChatDeleted {
            chat_id: channel.id.to_string(),
        };
        if let Err(e) = self.event_tx.send(event).await {
            warn!(error = %e, "Failed to send channel delete event");
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        let _ = self.bot_user_id.set(ready.user.id.get());
        info!(
            user = %ready.user.name,
            user_id = %ready.user.id,
            "Discord bot connected"
        );

        let ready_event = GatewayEvent::Ready {
            gateway: "discord".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: vec![
                capabilities::PRIVATE_CHANNELS.to_string(),
                capabilities::LISTING_CARDS.to_string(),
                capabilities::EPHEMERAL_REPLY.to_string(),
                capabilities::INLINE_KEYBOARD.to_string(),
            ],
        };
        if self.event_tx.send(ready_event).await.is_err() {
            error!("failed to send ready event");
        }
    }
}

impl Handler {
    async fn handle_component_interaction(&self, ctx: &Context, component: ComponentInteraction) {
        // Defer immediately; Discord requires a response within 3 seconds and
        // the core answers once it has touched the platform.
        if let Err(e) = component.defer_ephemeral(&ctx.http).await {
            warn!(error = %e, "Failed to defer interaction");
            return;
        }

        let roles = component
            .member
            .as_ref()
            .map(|m| m.roles.iter().map(|r| r.to_string()).collect())
            .unwrap_or_default();

        let sender = Sender {
            id: component.user.id.to_string(),
            username: Some(component.user.name.clone()),
            display_name: component.user.global_name.clone(),
            roles,
            is_bot: component.user.bot,
        };

        let data = ButtonPressedData {
            interaction_id: component.id.to_string(),
            chat_id: component.channel_id.to_string(),
            message_id: component.message.id.to_string(),
            sender,
            data: component.data.custom_id.clone(),
        };

        self.pending
            .lock()
            .await
            .insert(data.interaction_id.clone(), component);

        if let Err(e) = self
            .event_tx
            .send(GatewayEvent::ButtonPressed(Box::new(data)))
            .await
        {
            warn!(error = %e, "Failed to send button event");
        }
    }
}

// ============================================================================
// Command Execution
// ============================================================================

struct CommandExecutor {
    http: Arc<Http>,
    guild: GuildId,
    bot_user_id: Arc<OnceCell<u64>>,
    pending: PendingInteractions,
}

impl CommandExecutor {
    /// Run one command and build the matching result event.
    async fn execute(&self, command: GatewayCommand) -> GatewayEvent {
        let (request_id, code, result) = match command {
            GatewayCommand::SendMessage {
                request_id,
                chat_id,
                content,
                inline_keyboard,
            } => {
                let result = self
                    .send_message(&chat_id, &content, inline_keyboard.as_ref())
                    .await
                    .map(Some);
                (request_id, "send_failed", result)
            }
            GatewayCommand::CreatePrivateChannel {
                request_id,
                name,
                owner_id,
                privileged_roles,
            } => {
                let result = self
                    .create_private_channel(&name, &owner_id, &privileged_roles)
                    .await
                    .map(Some);
                (request_id, "create_channel_failed", result)
            }
            GatewayCommand::DeleteChannel {
                request_id,
                chat_id,
            } => {
                let result = self.delete_channel(&chat_id).await.map(|_| None);
                (request_id, "delete_channel_failed", result)
            }
            GatewayCommand::PostListing {
                request_id,
                chat_id,
                card,
            } => {
                let result = self.post_listing(&chat_id, &card).await.map(Some);
                (request_id, "post_failed", result)
            }
            GatewayCommand::EditListing {
                request_id,
                chat_id,
                message_id,
                card,
            } => {
                let result = self
                    .edit_listing(&chat_id, &message_id, &card)
                    .await
                    .map(|_| Some(message_id));
                (request_id, "edit_failed", result)
            }
            GatewayCommand::DeleteMessage {
                request_id,
                chat_id,
                message_id,
            } => {
                let result = self
                    .delete_message(&chat_id, &message_id)
                    .await
                    .map(|_| None);
                (request_id, "delete_failed", result)
            }
            GatewayCommand::EnsureBoard {
                request_id,
                chat_id,
                marker,
                content,
                inline_keyboard,
            } => {
                let result = self
                    .ensure_board(&chat_id, &marker, &content, &inline_keyboard)
                    .await
                    .map(Some);
                (request_id, "board_failed", result)
            }
            GatewayCommand::AnswerButton {
                request_id,
                interaction_id,
                text,
            } => {
                let result = self.answer_button(&interaction_id, text).await.map(|_| None);
                (request_id, error_codes::INTERACTION_NOT_FOUND, result)
            }
            // The command loop intercepts shutdown before execution.
            GatewayCommand::Shutdown => {
                return GatewayEvent::Shutdown {
                    reason: "shutdown requested".to_string(),
                };
            }
        };

        match result {
            Ok(resource_id) => GatewayEvent::CommandOk {
                request_id,
                resource_id,
            },
            Err(message) => GatewayEvent::CommandError {
                request_id,
                code: code.to_string(),
                message,
            },
        }
    }

    async fn send_message(
        &self,
        chat_id: &str,
        content: &str,
        inline_keyboard: Option<&InlineKeyboard>,
    ) -> Result<String, String> {
        let channel = parse_channel(chat_id)?;
        let mut builder = CreateMessage::new().content(content);
        if let Some(keyboard) = inline_keyboard {
            builder = builder.components(convert_inline_keyboard(keyboard));
        }

        let msg = channel
            .send_message(&self.http, builder)
            .await
            .map_err(|e| e.to_string())?;
        Ok(msg.id.to_string())
    }

    async fn create_private_channel(
        &self,
        name: &str,
        owner_id: &str,
        privileged_roles: &[String],
    ) -> Result<String, String> {
        let owner: u64 = owner_id
            .parse()
            .map_err(|_| format!("{}: invalid owner_id", error_codes::INVALID_REQUEST))?;

        let mut overwrites = vec![
            PermissionOverwrite {
                allow: Permissions::empty(),
                deny: Permissions::VIEW_CHANNEL,
                // @everyone shares the guild id
                kind: PermissionOverwriteType::Role(RoleId::new(self.guild.get())),
            },
            PermissionOverwrite {
                allow: Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES,
                deny: Permissions::empty(),
                kind: PermissionOverwriteType::Member(UserId::new(owner)),
            },
        ];
        for role in privileged_roles {
            let Ok(role_id) = role.parse::<u64>() else {
                warn!(role = %role, "Skipping invalid privileged role id");
                continue;
            };
            overwrites.push(PermissionOverwrite {
                allow: Permissions::VIEW_CHANNEL
                    | Permissions::SEND_MESSAGES
                    | Permissions::MANAGE_CHANNELS,
                deny: Permissions::empty(),
                kind: PermissionOverwriteType::Role(RoleId::new(role_id)),
            });
        }

        let channel = self
            .guild
            .create_channel(
                &self.http,
                CreateChannel::new(name)
                    .kind(ChannelType::Text)
                    .permissions(overwrites),
            )
            .await
            .map_err(|e| e.to_string())?;

        debug!(channel_id = %channel.id, name = %name, "Private channel created");
        Ok(channel.id.to_string())
    }

    async fn delete_channel(&self, chat_id: &str) -> Result<(), String> {
        parse_channel(chat_id)?
            .delete(&self.http)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn post_listing(&self, chat_id: &str, card: &ListingCard) -> Result<String, String> {
        let channel = parse_channel(chat_id)?;
        let mut builder = CreateMessage::new().embed(convert_card(card));
        if let Some(keyboard) = &card.inline_keyboard {
            builder = builder.components(convert_inline_keyboard(keyboard));
        }

        let msg = channel
            .send_message(&self.http, builder)
            .await
            .map_err(|e| e.to_string())?;
        Ok(msg.id.to_string())
    }

    async fn edit_listing(
        &self,
        chat_id: &str,
        message_id: &str,
        card: &ListingCard,
    ) -> Result<(), String> {
        let channel = parse_channel(chat_id)?;
        let msg_id = parse_message(message_id)?;
        let rows = card
            .inline_keyboard
            .as_ref()
            .map(convert_inline_keyboard)
            .unwrap_or_default();

        channel
            .edit_message(
                &self.http,
                msg_id,
                EditMessage::new().embed(convert_card(card)).components(rows),
            )
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), String> {
        parse_channel(chat_id)?
            .delete_message(&self.http, parse_message(message_id)?)
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn ensure_board(
        &self,
        chat_id: &str,
        marker: &str,
        content: &str,
        inline_keyboard: &InlineKeyboard,
    ) -> Result<String, String> {
        let channel = parse_channel(chat_id)?;
        let bot_id = self.bot_user_id.get().copied();

        let recent = channel
            .messages(&self.http, GetMessages::new().limit(BOARD_SCAN_LIMIT))
            .await
            .map_err(|e| e.to_string())?;

        if let Some(existing) = recent
            .iter()
            .find(|m| Some(m.author.id.get()) == bot_id && m.content.contains(marker))
        {
            debug!(message_id = %existing.id, "Board message already present");
            return Ok(existing.id.to_string());
        }

        let msg = channel
            .send_message(
                &self.http,
                CreateMessage::new()
                    .content(content)
                    .components(convert_inline_keyboard(inline_keyboard)),
            )
            .await
            .map_err(|e| e.to_string())?;

        info!(message_id = %msg.id, "Board message posted");
        Ok(msg.id.to_string())
    }

    async fn answer_button(&self, interaction_id: &str, text: Option<String>) -> Result<(), String> {
        let Some(component) = self.pending.lock().await.remove(interaction_id) else {
            return Err(format!("no pending interaction {}", interaction_id));
        };

        match text {
            Some(text) => component
                .edit_response(&self.http, EditInteractionResponse::new().content(text))
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            None => component
                .delete_response(&self.http)
                .await
                .map_err(|e| e.to_string()),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn extract_sender(msg: &Message) -> Sender {
    let roles = msg
        .member
        .as_ref()
        .map(|m| m.roles.iter().map(|r| r.to_string()).collect())
        .unwrap_or_default();

    Sender {
        id: msg.author.id.to_string(),
        username: Some(msg.author.name.clone()),
        display_name: msg.author.global_name.clone(),
        roles,
        is_bot: msg.author.bot,
    }
}

/// Text wins over attachments; messages with neither (stickers, embeds only)
/// are passed on as `Unknown`.
fn message_content(
    text: &str,
    attachment: Option<(Option<&str>, &str)>,
    stickers: Vec<String>,
) -> MessageContent {
    if !text.is_empty() {
        return MessageContent::Text {
            text: text.to_string(),
        };
    }
    match attachment {
        Some((content_type, url)) => MessageContent::Media {
            media_type: content_type
                .unwrap_or("application/octet-stream")
                .to_string(),
            url: Some(url.to_string()),
            caption: None,
        },
        None => MessageContent::Unknown {
            raw: serde_json::json!({ "stickers": stickers }),
        },
    }
}

fn parse_channel(chat_id: &str) -> Result<ChannelId, String> {
    chat_id
        .parse::<u64>()
        .map(ChannelId::new)
        .map_err(|_| format!("{}: invalid chat_id", error_codes::INVALID_REQUEST))
}

fn parse_message(message_id: &str) -> Result<MessageId, String> {
    message_id
        .parse::<u64>()
        .map(MessageId::new)
        .map_err(|_| format!("{}: invalid message_id", error_codes::INVALID_REQUEST))
}

fn convert_card(card: &ListingCard) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title(&card.title)
        .description(&card.description)
        .colour(card.colour);
    if let Some(footer) = &card.footer {
        embed = embed.footer(CreateEmbedFooter::new(footer));
    }
    embed
}

fn convert_inline_keyboard(keyboard: &InlineKeyboard) -> Vec<CreateActionRow> {
    keyboard
        .rows
        .iter()
        .map(|row| {
            let buttons: Vec<CreateButton> = row
                .iter()
                .map(|btn| {
                    CreateButton::new(&btn.callback_data)
                        .label(&btn.text)
                        .style(convert_style(btn.style))
                })
                .collect();
            CreateActionRow::Buttons(buttons)
        })
        .collect()
}

fn convert_style(style: ProtocolButtonStyle) -> ButtonStyle {
    match style {
        ProtocolButtonStyle::Primary => ButtonStyle::Primary,
        ProtocolButtonStyle::Secondary => ButtonStyle::Secondary,
        ProtocolButtonStyle::Success => ButtonStyle::Success,
        ProtocolButtonStyle::Danger => ButtonStyle::Danger,
    }
}
