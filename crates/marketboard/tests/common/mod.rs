//! Common test utilities.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use marketboard::dispatch::{MarketHandler, MarketHandlerConfig, MarketSettings};
use marketboard::gateway::{
    ButtonPressedData, InlineKeyboard, ListingCard, MessageContent, MessageReceivedData, Platform,
    PlatformError, SendError, Sender,
};
use marketboard::listing::{ListingPolicy, ListingRegistry};
use marketboard::session::SessionStore;

pub const PLAYER_ROLE: &str = "role-player";
pub const ADMIN_ROLE: &str = "role-admin";
pub const MARKET: &str = "chan-market";
pub const MISSIONS: &str = "chan-missions";
pub const ARCHIVE: &str = "chan-archive";
pub const LOGS: &str = "chan-logs";

// ============================================================================
// Recording platform
// ============================================================================

/// Platform operation observed by [`RecordingPlatform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateWorkspace {
        owner_id: String,
        name: String,
    },
    DeleteWorkspace(String),
    SendMessage {
        chat_id: String,
        content: String,
        inline_keyboard: Option<InlineKeyboard>,
    },
    PostListing {
        chat_id: String,
        card: ListingCard,
    },
    EditListing {
        chat_id: String,
        message_id: String,
        card: ListingCard,
    },
    DeleteMessage {
        chat_id: String,
        message_id: String,
    },
    EnsureBoard {
        chat_id: String,
        marker: String,
        content: String,
        inline_keyboard: InlineKeyboard,
    },
}

/// In-memory [`Platform`] that records every call.
///
/// Workspaces are named `ws-<n>` and posted messages `msg-<n>`.
#[derive(Default)]
pub struct RecordingPlatform {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicU64,
    fail_create: AtomicBool,
    fail_post: AtomicBool,
}

impl RecordingPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_post(&self, fail: bool) {
        self.fail_post.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Cards posted to `chat_id`, oldest first.
    pub fn posts_to(&self, chat_id: &str) -> Vec<ListingCard> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::PostListing { chat_id: c, card } if c == chat_id => Some(card),
                _ => None,
            })
            .collect()
    }

    /// Message texts sent to `chat_id`, oldest first.
    pub fn messages_to(&self, chat_id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SendMessage {
                    chat_id: c,
                    content,
                    ..
                } if c == chat_id => Some(content),
                _ => None,
            })
            .collect()
    }

    /// Cards the message `message_id` was edited to, oldest first.
    pub fn edits_of(&self, message_id: &str) -> Vec<ListingCard> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::EditListing {
                    message_id: m,
                    card,
                    ..
                } if m == message_id => Some(card),
                _ => None,
            })
            .collect()
    }

    pub fn deleted_workspaces(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::DeleteWorkspace(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

fn refused(code: &str) -> PlatformError {
    PlatformError::Gateway(SendError::Command {
        code: code.to_string(),
        message: "refused by test platform".to_string(),
    })
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn create_private_workspace(
        &self,
        owner_id: &str,
        name: &str,
    ) -> Result<String, PlatformError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(refused("create_channel_failed"));
        }
        self.record(Call::CreateWorkspace {
            owner_id: owner_id.to_string(),
            name: name.to_string(),
        });
        Ok(self.next("ws"))
    }

    async fn delete_workspace(&self, workspace_id: &str) -> Result<(), PlatformError> {
        self.record(Call::DeleteWorkspace(workspace_id.to_string()));
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: &str,
        content: &str,
        inline_keyboard: Option<InlineKeyboard>,
    ) -> Result<(), PlatformError> {
        self.record(Call::SendMessage {
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            inline_keyboard,
        });
        Ok(())
    }

    async fn post_listing(
        &self,
        chat_id: &str,
        card: ListingCard,
    ) -> Result<String, PlatformError> {
        if self.fail_post.load(Ordering::SeqCst) {
            return Err(refused("send_failed"));
        }
        self.record(Call::PostListing {
            chat_id: chat_id.to_string(),
            card,
        });
        Ok(self.next("msg"))
    }

    async fn edit_listing(
        &self,
        chat_id: &str,
        message_id: &str,
        card: ListingCard,
    ) -> Result<(), PlatformError> {
        self.record(Call::EditListing {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
            card,
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), PlatformError> {
        self.record(Call::DeleteMessage {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
        });
        Ok(())
    }

    async fn ensure_board(
        &self,
        chat_id: &str,
        marker: &str,
        content: &str,
        inline_keyboard: InlineKeyboard,
    ) -> Result<(), PlatformError> {
        self.record(Call::EnsureBoard {
            chat_id: chat_id.to_string(),
            marker: marker.to_string(),
            content: content.to_string(),
            inline_keyboard,
        });
        Ok(())
    }
}

// ============================================================================
// Handler & event builders
// ============================================================================

pub fn settings() -> MarketSettings {
    MarketSettings {
        player_role: PLAYER_ROLE.to_string(),
        admin_role: ADMIN_ROLE.to_string(),
        market_channel: MARKET.to_string(),
        missions_channel: Some(MISSIONS.to_string()),
        archive_channel: ARCHIVE.to_string(),
        log_channel: LOGS.to_string(),
    }
}

/// Handler over fresh stores and a recording platform.
pub fn market(policy: ListingPolicy) -> (MarketHandler, Arc<RecordingPlatform>) {
    let platform = RecordingPlatform::new();
    let handler = MarketHandler::new(MarketHandlerConfig {
        sessions: SessionStore::new(),
        listings: ListingRegistry::new(policy),
        platform: platform.clone(),
        settings: settings(),
    });
    (handler, platform)
}

pub fn player(id: &str) -> Sender {
    Sender {
        id: id.to_string(),
        username: Some(format!("user{}", id)),
        roles: vec![PLAYER_ROLE.to_string()],
        ..Default::default()
    }
}

pub fn outsider(id: &str) -> Sender {
    Sender {
        id: id.to_string(),
        username: Some(format!("user{}", id)),
        ..Default::default()
    }
}

pub fn button(chat_id: &str, sender: &Sender, data: &str) -> ButtonPressedData {
    ButtonPressedData {
        interaction_id: format!("ix-{}", data),
        chat_id: chat_id.to_string(),
        message_id: "board".to_string(),
        sender: sender.clone(),
        data: data.to_string(),
    }
}

pub fn text(chat_id: &str, sender: &Sender, content: &str) -> MessageReceivedData {
    MessageReceivedData {
        message_id: format!("m-{}", content.len()),
        chat_id: chat_id.to_string(),
        sender: sender.clone(),
        content: MessageContent::Text {
            text: content.to_string(),
        },
        timestamp: None,
    }
}
