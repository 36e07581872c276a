//! Listing domain types shared by the session flow and the registry.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use ulid::Ulid;

// ============================================================================
// Category
// ============================================================================

/// Kind of posting a member can create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    JobOffer,
    PurchaseRequest,
    SaleOffer,
    HelpRequest,
    Seeking,
    Offering,
}

impl Category {
    /// All categories in board order.
    pub const ALL: [Category; 6] = [
        Category::JobOffer,
        Category::PurchaseRequest,
        Category::SaleOffer,
        Category::HelpRequest,
        Category::Seeking,
        Category::Offering,
    ];

    /// Canonical identifier used in button callback data.
    pub fn slug(self) -> &'static str {
        match self {
            Category::JobOffer => "job-offer",
            Category::PurchaseRequest => "purchase-request",
            Category::SaleOffer => "sale-offer",
            Category::HelpRequest => "help-request",
            Category::Seeking => "seeking",
            Category::Offering => "offering",
        }
    }

    /// Identifier carried by buttons on boards posted before the canonical slugs.
    pub fn legacy_slug(self) -> &'static str {
        match self {
            Category::JobOffer => "auftrag",
            Category::PurchaseRequest => "ankauf",
            Category::SaleOffer => "verkauf",
            Category::HelpRequest => "hilfe",
            Category::Seeking => "suche",
            Category::Offering => "biete",
        }
    }

    /// Parse a canonical or legacy slug.
    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.slug() == slug || c.legacy_slug() == slug)
    }

    /// Human-readable label shown on buttons and cards.
    pub fn label(self) -> &'static str {
        match self {
            Category::JobOffer => "Auftrag",
            Category::PurchaseRequest => "Ankauf",
            Category::SaleOffer => "Verkauf",
            Category::HelpRequest => "Hilfe",
            Category::Seeking => "Ich suche",
            Category::Offering => "Ich biete",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Category::JobOffer => "💰",
            Category::PurchaseRequest => "🛒",
            Category::SaleOffer => "📦",
            Category::HelpRequest => "🆘",
            Category::Seeking => "🔍",
            Category::Offering => "🎁",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

// ============================================================================
// Reward
// ============================================================================

/// Answers that mean "no reward", compared case-insensitively.
const NO_REWARD_ANSWERS: [&str; 3] = ["kein", "keine", "none"];

/// Display text of the no-reward sentinel.
pub const NO_REWARD_LABEL: &str = "Keine";

/// Reward offered for a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reward {
    /// The member declined to name a reward.
    None,
    /// Free-text reward, kept verbatim.
    Offered(String),
}

impl Reward {
    /// Interpret a member's answer to the reward prompt.
    pub fn parse(answer: &str) -> Self {
        let normalized = answer.trim().to_lowercase();
        if NO_REWARD_ANSWERS.contains(&normalized.as_str()) {
            Reward::None
        } else {
            Reward::Offered(answer.to_string())
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Reward::None)
    }

    pub fn as_display(&self) -> &str {
        match self {
            Reward::None => NO_REWARD_LABEL,
            Reward::Offered(text) => text,
        }
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a published listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListingId(String);

impl ListingId {
    /// Generate a fresh, time-ordered id.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ListingId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a listing card lives on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRef {
    pub chat_id: String,
    pub message_id: String,
}

// ============================================================================
// Draft & Listing
// ============================================================================

/// Snapshot of a completed creation session, ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingDraft {
    pub creator_id: String,
    pub category: Category,
    pub description: String,
    pub reward: Reward,
    pub anonymous: bool,
}

/// Lifecycle state of a listing.
///
/// The claimant only exists in `Claimed` and interested parties only in
/// `Open`, so leaving `Open` drops the interest set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingStatus {
    Open { interested: BTreeSet<String> },
    Claimed { by: String },
    Closed,
}

impl ListingStatus {
    pub fn open() -> Self {
        ListingStatus::Open {
            interested: BTreeSet::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ListingStatus::Open { .. })
    }

    pub fn claimed_by(&self) -> Option<&str> {
        match self {
            ListingStatus::Claimed { by } => Some(by),
            _ => None,
        }
    }

    /// Interested members; empty unless open.
    pub fn interested(&self) -> impl Iterator<Item = &str> {
        let set = match self {
            ListingStatus::Open { interested } => Some(interested),
            _ => None,
        };
        set.into_iter().flatten().map(String::as_str)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ListingStatus::Open { .. } => "open",
            ListingStatus::Claimed { .. } => "claimed",
            ListingStatus::Closed => "closed",
        }
    }
}

/// A published listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub id: ListingId,
    pub creator_id: String,
    pub category: Category,
    pub description: String,
    pub reward: Reward,
    pub anonymous: bool,
    pub status: ListingStatus,
    /// Board post, once the card has been posted.
    pub post: Option<PostRef>,
    pub created_at: DateTime<Utc>,
}

impl Listing {
    /// Open a new listing from a completed draft.
    pub fn open(id: ListingId, draft: ListingDraft) -> Self {
        Self {
            id,
            creator_id: draft.creator_id,
            category: draft.category,
            description: draft.description,
            reward: draft.reward,
            anonymous: draft.anonymous,
            status: ListingStatus::open(),
            post: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_creator(&self, member_id: &str) -> bool {
        self.creator_id == member_id
    }
}
