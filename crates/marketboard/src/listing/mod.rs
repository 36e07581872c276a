//! Published listings and their lifecycle.

pub mod error;
pub mod model;
pub mod registry;

pub use error::ListingError;
pub use model::{
    Category, Listing, ListingDraft, ListingId, ListingStatus, NO_REWARD_LABEL, PostRef, Reward,
};
pub use registry::{ListingAction, ListingPolicy, ListingRegistry, Transition};
