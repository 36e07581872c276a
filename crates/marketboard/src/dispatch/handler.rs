//! Marketplace message handler.
//!
//! Routes gateway events to the session store and the listing registry, and
//! turns their results into platform operations. Store transitions are
//! committed before any platform call is awaited.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use marketboard_gateway_protocol::{ButtonPressedData, MessageReceivedData, Sender};

use super::action::ButtonAction;
use super::render;
use crate::gateway::{MessageHandler, Platform, Reply};
use crate::listing::{Category, ListingAction, ListingId, ListingRegistry, PostRef, Transition};
use crate::session::{SessionStore, TextOutcome};
use crate::sync::KeyedLocks;

// ============================================================================
// Settings
// ============================================================================

/// Guild roles and channels the marketplace works with.
#[derive(Debug, Clone)]
pub struct MarketSettings {
    pub player_role: String,
    pub admin_role: String,
    /// Channel holding the board message and most listings.
    pub market_channel: String,
    /// Channel for job offers; the market channel when unset.
    pub missions_channel: Option<String>,
    pub archive_channel: String,
    pub log_channel: String,
}

impl MarketSettings {
    /// Channel a listing of `category` is posted to.
    pub fn listing_channel(&self, category: Category) -> &str {
        match (category, &self.missions_channel) {
            (Category::JobOffer, Some(missions)) => missions,
            _ => &self.market_channel,
        }
    }
}

// ============================================================================
// Market Handler
// ============================================================================

/// Configuration for creating a [`MarketHandler`].
pub struct MarketHandlerConfig {
    pub sessions: SessionStore,
    pub listings: ListingRegistry,
    pub platform: Arc<dyn Platform>,
    pub settings: MarketSettings,
}

/// Handler that drives creation sessions and listing actions.
pub struct MarketHandler {
    sessions: SessionStore,
    listings: ListingRegistry,
    platform: Arc<dyn Platform>,
    settings: MarketSettings,
    /// Serializes card updates per listing so the last update shows the
    /// latest state.
    card_locks: KeyedLocks,
    /// Suffix for workspace names.
    workspace_seq: AtomicU64,
}

impl MarketHandler {
    pub fn new(config: MarketHandlerConfig) -> Self {
        Self {
            sessions: config.sessions,
            listings: config.listings,
            platform: config.platform,
            settings: config.settings,
            card_locks: KeyedLocks::new(),
            workspace_seq: AtomicU64::new(0),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn listings(&self) -> &ListingRegistry {
        &self.listings
    }

    /// Drop sessions older than `ttl` and delete their workspaces.
    ///
    /// Returns the number of sessions removed.
    pub async fn expire_sessions(&self, ttl: chrono::Duration) -> usize {
        let expired = self.sessions.expire_created_before(Utc::now() - ttl);
        for session in &expired {
            info!(
                workspace_id = %session.workspace_id,
                owner_id = %session.owner_id,
                state = session.state.name(),
                "Creation session expired"
            );
            if let Err(e) = self.platform.delete_workspace(&session.workspace_id).await {
                warn!(workspace_id = %session.workspace_id, error = %e, "Failed to delete expired workspace");
            }
        }
        expired.len()
    }

    fn is_member(&self, sender: &Sender) -> bool {
        sender.has_any_role(&[
            self.settings.player_role.as_str(),
            self.settings.admin_role.as_str(),
        ])
    }

    // ------------------------------------------------------------------------
    // Creation flow
    // ------------------------------------------------------------------------

    async fn start_session(&self, sender: &Sender, category: Category) -> Option<String> {
        let seq = self.workspace_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let name = render::workspace_name(sender.username.as_deref().unwrap_or(&sender.id), seq);

        let workspace_id = match self.platform.create_private_workspace(&sender.id, &name).await {
            Ok(id) => id,
            Err(e) => {
                warn!(owner_id = %sender.id, name = %name, error = %e, "Failed to create workspace");
                return Some(render::GENERIC_FAILURE.to_string());
            }
        };

        if let Err(e) = self.sessions.start(&workspace_id, &sender.id, category) {
            debug!(error = %e, "Ignoring duplicate session");
            return None;
        }
        info!(
            workspace_id = %workspace_id,
            owner_id = %sender.id,
            category = %category,
            "Creation session started"
        );

        if let Err(e) = self
            .platform
            .send_message(&workspace_id, &render::workspace_intro(category), None)
            .await
        {
            warn!(workspace_id = %workspace_id, error = %e, "Failed to send workspace intro");
        }

        Some(render::workspace_created(&workspace_id))
    }

    async fn publish(&self, workspace_id: &str, anonymous: bool) -> Option<String> {
        let Some(draft) = self.sessions.begin_publish(workspace_id, anonymous) else {
            debug!(workspace_id = %workspace_id, "Stale visibility button");
            return None;
        };

        let channel = self.settings.listing_channel(draft.category).to_string();
        let id = self.listings.publish(draft);
        let Some(listing) = self.listings.get(&id) else {
            self.sessions.abort_publish(workspace_id);
            return Some(render::GENERIC_FAILURE.to_string());
        };

        match self
            .platform
            .post_listing(&channel, render::listing_card(&listing))
            .await
        {
            Ok(message_id) => {
                self.listings.attach_post(
                    &id,
                    PostRef {
                        chat_id: channel,
                        message_id,
                    },
                );
            }
            Err(e) => {
                warn!(workspace_id = %workspace_id, listing_id = %id, error = %e, "Failed to post listing");
                self.listings.discard(&id);
                self.sessions.abort_publish(workspace_id);
                return Some(render::GENERIC_FAILURE.to_string());
            }
        }

        info!(
            listing_id = %id,
            creator_id = %listing.creator_id,
            category = %listing.category,
            anonymous = listing.anonymous,
            "Listing posted"
        );
        self.log(&render::log_published(&listing)).await;

        self.sessions.finish(workspace_id);
        if let Err(e) = self.platform.delete_workspace(workspace_id).await {
            warn!(workspace_id = %workspace_id, error = %e, "Failed to delete workspace");
        }

        None
    }

    // ------------------------------------------------------------------------
    // Listing actions
    // ------------------------------------------------------------------------

    async fn act_on_listing(
        &self,
        actor: &str,
        action: ListingAction,
        id: &ListingId,
    ) -> Option<String> {
        match self.listings.apply(id, actor, action) {
            Ok(transition) => {
                info!(
                    listing_id = %id,
                    actor = %actor,
                    action = %action,
                    status = transition.listing.status.name(),
                    "Listing action applied"
                );
                if transition.changed {
                    self.refresh_post(&transition).await;
                    self.log(&render::log_transition(&transition)).await;
                }
                Some(render::action_confirmation(&transition).to_string())
            }
            Err(e) => {
                debug!(listing_id = %id, actor = %actor, action = %action, error = %e, "Listing action refused");
                Some(e.user_message().to_string())
            }
        }
    }

    /// Bring the board post in line with the registry after a transition.
    async fn refresh_post(&self, transition: &Transition) {
        let key = transition.listing.id.as_str();
        let lock = self.card_locks.get(key);
        let guard = lock.lock().await;

        if transition.archived() {
            if let Some(post) = &transition.listing.post
                && let Err(e) = self
                    .platform
                    .delete_message(&post.chat_id, &post.message_id)
                    .await
            {
                warn!(listing_id = %key, error = %e, "Failed to remove listing post");
            }

            let card = render::archive_card(&transition.listing, transition.action);
            if let Err(e) = self
                .platform
                .post_listing(&self.settings.archive_channel, card)
                .await
            {
                warn!(listing_id = %key, error = %e, "Failed to archive listing");
            }
        } else if let Some(current) = self.listings.get(&transition.listing.id)
            && let Some(post) = &current.post
            && let Err(e) = self
                .platform
                .edit_listing(&post.chat_id, &post.message_id, render::listing_card(&current))
                .await
        {
            warn!(listing_id = %key, error = %e, "Failed to update listing post");
        }

        drop(guard);
        if transition.archived() {
            self.card_locks.forget(key);
        }
    }

    async fn log(&self, line: &str) {
        if let Err(e) = self
            .platform
            .send_message(&self.settings.log_channel, line, None)
            .await
        {
            warn!(error = %e, "Failed to write audit log");
        }
    }
}

// ============================================================================
// MessageHandler Trait Implementation
// ============================================================================

#[async_trait]
impl MessageHandler for MarketHandler {
    async fn handle_ready(&self, gateway: &str) {
        match self
            .platform
            .ensure_board(
                &self.settings.market_channel,
                render::BOARD_MARKER,
                &render::board_message(),
                render::board_keyboard(),
            )
            .await
        {
            Ok(()) => debug!(gateway = %gateway, "Board in place"),
            Err(e) => warn!(gateway = %gateway, error = %e, "Failed to set up board"),
        }
    }

    fn handle_message(&self, _gateway: &str, data: &MessageReceivedData) -> Option<Reply> {
        if data.sender.is_bot {
            return None;
        }
        let text = data.content.as_text()?;

        match self.sessions.submit_text(&data.chat_id, text)? {
            TextOutcome::DescriptionCaptured => Some(Reply::text(render::REWARD_PROMPT)),
            TextOutcome::RewardCaptured => Some(Reply::with_keyboard(
                render::VISIBILITY_PROMPT,
                render::visibility_keyboard(),
            )),
            TextOutcome::Ignored => None,
        }
    }

    async fn handle_button(&self, _gateway: &str, data: &ButtonPressedData) -> Option<String> {
        if data.sender.is_bot {
            return None;
        }
        let Some(action) = ButtonAction::parse(&data.data) else {
            debug!(data = %data.data, "Unknown button");
            return None;
        };

        if !self.is_member(&data.sender) {
            debug!(sender_id = %data.sender.id, data = %data.data, "Button press without marketplace role");
            return Some(render::PERMISSION_DENIED.to_string());
        }

        match action {
            ButtonAction::Create(category) => self.start_session(&data.sender, category).await,
            ButtonAction::Visibility { anonymous } => self.publish(&data.chat_id, anonymous).await,
            ButtonAction::Listing { action, id } => {
                self.act_on_listing(&data.sender.id, action, &id).await
            }
        }
    }

    fn handle_chat_deleted(&self, _gateway: &str, chat_id: &str) {
        if let Some(session) = self.sessions.remove(chat_id) {
            info!(
                workspace_id = %chat_id,
                owner_id = %session.owner_id,
                state = session.state.name(),
                "Workspace deleted, session dropped"
            );
        }
    }
}
