//! Live registry of published listings.
//!
//! Every transition checks and writes the listing status inside a single
//! shard-locked map access. Nothing awaits while an entry is held, so a second
//! press on the same listing always observes the first press's result.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::error::ListingError;
use super::model::{Listing, ListingDraft, ListingId, ListingStatus, PostRef};

// ============================================================================
// Policy & Results
// ============================================================================

/// Tunable rules for listing transitions.
#[derive(Debug, Clone, Copy)]
pub struct ListingPolicy {
    /// Whether a creator may accept their own listing.
    pub allow_self_accept: bool,
}

impl Default for ListingPolicy {
    fn default() -> Self {
        Self {
            allow_self_accept: true,
        }
    }
}

/// Member action on a published listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingAction {
    Accept,
    Interest,
    Withdraw,
    Close,
}

impl ListingAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ListingAction::Accept => "accept",
            ListingAction::Interest => "interest",
            ListingAction::Withdraw => "withdraw",
            ListingAction::Close => "close",
        }
    }
}

impl fmt::Display for ListingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful listing action.
#[derive(Debug, Clone)]
pub struct Transition {
    pub action: ListingAction,
    pub actor: String,
    /// Listing state after the action.
    pub listing: Listing,
    /// False when the action left the listing unchanged (repeated interest).
    pub changed: bool,
}

impl Transition {
    /// The listing was closed and has left the live registry.
    pub fn archived(&self) -> bool {
        self.listing.status == ListingStatus::Closed
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Registry of open and claimed listings. Cheap to clone.
#[derive(Clone, Default)]
pub struct ListingRegistry {
    listings: Arc<DashMap<ListingId, Listing>>,
    policy: ListingPolicy,
}

impl ListingRegistry {
    pub fn new(policy: ListingPolicy) -> Self {
        Self {
            listings: Arc::new(DashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> ListingPolicy {
        self.policy
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Register a new open listing from a completed draft.
    pub fn publish(&self, draft: ListingDraft) -> ListingId {
        let id = ListingId::generate();
        let listing = Listing::open(id.clone(), draft);
        debug!(listing_id = %id, category = %listing.category, "Listing published");
        self.listings.insert(id.clone(), listing);
        id
    }

    /// Record where the listing card was posted. Returns false if the listing
    /// is no longer live.
    pub fn attach_post(&self, id: &ListingId, post: PostRef) -> bool {
        match self.listings.get_mut(id) {
            Some(mut listing) => {
                listing.post = Some(post);
                true
            }
            None => false,
        }
    }

    /// Drop a listing whose card never reached the board.
    pub fn discard(&self, id: &ListingId) -> Option<Listing> {
        self.listings.remove(id).map(|(_, listing)| listing)
    }

    pub fn get(&self, id: &ListingId) -> Option<Listing> {
        self.listings.get(id).map(|r| r.clone())
    }

    pub fn contains(&self, id: &ListingId) -> bool {
        self.listings.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    /// Apply `action` on behalf of `actor`.
    pub fn apply(
        &self,
        id: &ListingId,
        actor: &str,
        action: ListingAction,
    ) -> Result<Transition, ListingError> {
        match action {
            ListingAction::Accept => self.accept(id, actor),
            ListingAction::Interest => self.express_interest(id, actor),
            ListingAction::Withdraw => self.withdraw(id, actor),
            ListingAction::Close => self.close(id, actor),
        }
    }

    /// Claim an open listing.
    pub fn accept(&self, id: &ListingId, actor: &str) -> Result<Transition, ListingError> {
        let mut entry = self
            .listings
            .get_mut(id)
            .ok_or_else(|| ListingError::NotFound(id.clone()))?;
        let listing = entry.value_mut();

        if !listing.status.is_open() {
            return Err(ListingError::NotOpen(id.clone()));
        }
        if !self.policy.allow_self_accept && listing.is_creator(actor) {
            return Err(ListingError::SelfAcceptDenied(id.clone()));
        }

        listing.status = ListingStatus::Claimed {
            by: actor.to_string(),
        };

        Ok(Transition {
            action: ListingAction::Accept,
            actor: actor.to_string(),
            listing: listing.clone(),
            changed: true,
        })
    }

    /// Add `actor` to the interested parties of an open listing. Repeating
    /// the call is a successful no-op.
    pub fn express_interest(
        &self,
        id: &ListingId,
        actor: &str,
    ) -> Result<Transition, ListingError> {
        let mut entry = self
            .listings
            .get_mut(id)
            .ok_or_else(|| ListingError::NotFound(id.clone()))?;
        let listing = entry.value_mut();

        let ListingStatus::Open { interested } = &mut listing.status else {
            return Err(ListingError::NotOpen(id.clone()));
        };
        let changed = interested.insert(actor.to_string());

        Ok(Transition {
            action: ListingAction::Interest,
            actor: actor.to_string(),
            listing: listing.clone(),
            changed,
        })
    }

    /// Creator withdraws a listing that is still open.
    pub fn withdraw(&self, id: &ListingId, actor: &str) -> Result<Transition, ListingError> {
        self.close_if(id, actor, ListingAction::Withdraw, |listing| {
            if listing.is_creator(actor) && listing.status.is_open() {
                Ok(())
            } else {
                Err(ListingError::NotAuthorized {
                    id: id.clone(),
                    actor: actor.to_string(),
                    action: ListingAction::Withdraw,
                })
            }
        })
    }

    /// Creator or claimant closes the listing, whatever its live status.
    pub fn close(&self, id: &ListingId, actor: &str) -> Result<Transition, ListingError> {
        self.close_if(id, actor, ListingAction::Close, |listing| {
            if listing.is_creator(actor) || listing.status.claimed_by() == Some(actor) {
                Ok(())
            } else {
                Err(ListingError::NotAuthorized {
                    id: id.clone(),
                    actor: actor.to_string(),
                    action: ListingAction::Close,
                })
            }
        })
    }

    /// Remove the listing if `check` allows it and mark the removed copy closed.
    fn close_if(
        &self,
        id: &ListingId,
        actor: &str,
        action: ListingAction,
        check: impl FnOnce(&Listing) -> Result<(), ListingError>,
    ) -> Result<Transition, ListingError> {
        let Entry::Occupied(entry) = self.listings.entry(id.clone()) else {
            return Err(ListingError::NotFound(id.clone()));
        };
        check(entry.get())?;

        let (_, mut listing) = entry.remove_entry();
        listing.status = ListingStatus::Closed;
        debug!(listing_id = %id, action = %action, "Listing closed");

        Ok(Transition {
            action,
            actor: actor.to_string(),
            listing,
            changed: true,
        })
    }
}
