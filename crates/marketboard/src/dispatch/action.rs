//! Button callback data understood by the marketplace.

use crate::listing::{Category, ListingAction, ListingId};

pub const CREATE_PREFIX: &str = "create_";
pub const VISIBILITY_PUBLIC: &str = "visibility_public";
pub const VISIBILITY_ANONYMOUS: &str = "visibility_anonymous";

/// What a button press asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    /// Open a private workspace and start a creation session.
    Create(Category),
    /// Publish the session of the workspace the button was pressed in.
    Visibility { anonymous: bool },
    /// Act on a published listing.
    Listing {
        action: ListingAction,
        id: ListingId,
    },
}

impl ButtonAction {
    /// Classify button callback data. Unknown data yields `None`.
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            VISIBILITY_PUBLIC => return Some(ButtonAction::Visibility { anonymous: false }),
            VISIBILITY_ANONYMOUS => return Some(ButtonAction::Visibility { anonymous: true }),
            _ => {}
        }

        if let Some(slug) = data.strip_prefix(CREATE_PREFIX) {
            return Category::from_slug(slug).map(ButtonAction::Create);
        }

        let (prefix, id) = data.split_once('_')?;
        let action = match prefix {
            "accept" => ListingAction::Accept,
            "interest" => ListingAction::Interest,
            "withdraw" => ListingAction::Withdraw,
            "close" => ListingAction::Close,
            _ => return None,
        };
        if id.is_empty() {
            return None;
        }

        Some(ButtonAction::Listing {
            action,
            id: ListingId::from(id),
        })
    }

    /// Callback data that parses back into this action.
    pub fn callback_data(&self) -> String {
        match self {
            ButtonAction::Create(category) => format!("{}{}", CREATE_PREFIX, category.slug()),
            ButtonAction::Visibility { anonymous: false } => VISIBILITY_PUBLIC.to_string(),
            ButtonAction::Visibility { anonymous: true } => VISIBILITY_ANONYMOUS.to_string(),
            ButtonAction::Listing { action, id } => format!("{}_{}", action.as_str(), id),
        }
    }
}
