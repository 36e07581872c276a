//! Platform operations the marketplace needs, and their gateway-backed
//! implementation.

use async_trait::async_trait;
use thiserror::Error;

use marketboard_gateway_protocol::{GatewayCommand, InlineKeyboard, ListingCard};

use super::manager::{GatewayManager, SendError};

/// Error from a platform operation.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error(transparent)]
    Gateway(#[from] SendError),

    #[error("gateway did not report the id of the created {0}")]
    MissingResourceId(&'static str),
}

/// Platform operations used by the dispatch layer.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Create a channel visible only to `owner_id` and privileged roles.
    async fn create_private_workspace(
        &self,
        owner_id: &str,
        name: &str,
    ) -> Result<String, PlatformError>;

    async fn delete_workspace(&self, workspace_id: &str) -> Result<(), PlatformError>;

    async fn send_message(
        &self,
        chat_id: &str,
        content: &str,
        inline_keyboard: Option<InlineKeyboard>,
    ) -> Result<(), PlatformError>;

    /// Post a listing card and return its message id.
    async fn post_listing(&self, chat_id: &str, card: ListingCard)
    -> Result<String, PlatformError>;

    async fn edit_listing(
        &self,
        chat_id: &str,
        message_id: &str,
        card: ListingCard,
    ) -> Result<(), PlatformError>;

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), PlatformError>;

    /// Post the board message unless one containing `marker` already exists.
    async fn ensure_board(
        &self,
        chat_id: &str,
        marker: &str,
        content: &str,
        inline_keyboard: InlineKeyboard,
    ) -> Result<(), PlatformError>;
}

/// [`Platform`] backed by a gateway registered with the [`GatewayManager`].
#[derive(Clone)]
pub struct GatewayPlatform {
    manager: GatewayManager,
    gateway: String,
    /// Roles that can see and manage every private workspace.
    privileged_roles: Vec<String>,
}

impl GatewayPlatform {
    pub fn new(
        manager: GatewayManager,
        gateway: impl Into<String>,
        privileged_roles: Vec<String>,
    ) -> Self {
        Self {
            manager,
            gateway: gateway.into(),
            privileged_roles,
        }
    }
}

#[async_trait]
impl Platform for GatewayPlatform {
    async fn create_private_workspace(
        &self,
        owner_id: &str,
        name: &str,
    ) -> Result<String, PlatformError> {
        let privileged_roles = self.privileged_roles.clone();
        self.manager
            .request(&self.gateway, |request_id| {
                GatewayCommand::CreatePrivateChannel {
                    request_id,
                    name: name.to_string(),
                    owner_id: owner_id.to_string(),
                    privileged_roles,
                }
            })
            .await?
            .ok_or(PlatformError::MissingResourceId("channel"))
    }

    async fn delete_workspace(&self, workspace_id: &str) -> Result<(), PlatformError> {
        self.manager
            .request(&self.gateway, |request_id| GatewayCommand::DeleteChannel {
                request_id,
                chat_id: workspace_id.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: &str,
        content: &str,
        inline_keyboard: Option<InlineKeyboard>,
    ) -> Result<(), PlatformError> {
        self.manager
            .request(&self.gateway, |request_id| GatewayCommand::SendMessage {
                request_id,
                chat_id: chat_id.to_string(),
                content: content.to_string(),
                inline_keyboard,
            })
            .await?;
        Ok(())
    }

    async fn post_listing(
        &self,
        chat_id: &str,
        card: ListingCard,
    ) -> Result<String, PlatformError> {
        self.manager
            .request(&self.gateway, |request_id| GatewayCommand::PostListing {
                request_id,
                chat_id: chat_id.to_string(),
                card,
            })
            .await?
            .ok_or(PlatformError::MissingResourceId("message"))
    }

    async fn edit_listing(
        &self,
        chat_id: &str,
        message_id: &str,
        card: ListingCard,
    ) -> Result<(), PlatformError> {
        self.manager
            .request(&self.gateway, |request_id| GatewayCommand::EditListing {
                request_id,
                chat_id: chat_id.to_string(),
                message_id: message_id.to_string(),
                card,
            })
            .await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), PlatformError> {
        self.manager
            .request(&self.gateway, |request_id| GatewayCommand::DeleteMessage {
                request_id,
                chat_id: chat_id.to_string(),
                message_id: message_id.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn ensure_board(
        &self,
        chat_id: &str,
        marker: &str,
        content: &str,
        inline_keyboard: InlineKeyboard,
    ) -> Result<(), PlatformError> {
        self.manager
            .request(&self.gateway, |request_id| GatewayCommand::EnsureBoard {
                request_id,
                chat_id: chat_id.to_string(),
                marker: marker.to_string(),
                content: content.to_string(),
                inline_keyboard,
            })
            .await?;
        Ok(())
    }
}
