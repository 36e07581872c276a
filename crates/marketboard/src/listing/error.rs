//! Listing error types.

use thiserror::Error;

use super::model::ListingId;
use super::registry::ListingAction;

/// Why a listing action was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListingError {
    #[error("listing {0} not found")]
    NotFound(ListingId),

    #[error("listing {0} is not open")]
    NotOpen(ListingId),

    #[error("member {actor} may not {action} listing {id}")]
    NotAuthorized {
        id: ListingId,
        actor: String,
        action: ListingAction,
    },

    #[error("creator may not accept own listing {0}")]
    SelfAcceptDenied(ListingId),
}

impl ListingError {
    /// Text shown to the member who pressed the button.
    pub fn user_message(&self) -> &'static str {
        match self {
            ListingError::NotFound(_) => "Dieses Angebot ist nicht mehr verfügbar.",
            ListingError::NotOpen(_) => "Dieses Angebot ist nicht mehr offen.",
            ListingError::NotAuthorized { action, .. } => match action {
                ListingAction::Withdraw => "Nur der Ersteller kann ein offenes Angebot zurückziehen.",
                _ => "Nur der Ersteller oder der Annehmende kann dieses Angebot abschließen.",
            },
            ListingError::SelfAcceptDenied(_) => {
                "Du kannst dein eigenes Angebot nicht annehmen."
            }
        }
    }
}
