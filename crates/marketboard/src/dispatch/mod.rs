//! Dispatch of gateway events to the marketplace.
//!
//! ```text
//! ButtonPressed ──► ButtonAction::parse ──┬─ Create ─────► SessionStore::start
//!                                         ├─ Visibility ─► publish ─► ListingRegistry
//!                                         └─ Listing ────► ListingRegistry::apply
//! MessageReceived ──────────────────────────────────────► SessionStore::submit_text
//! ChatDeleted ──────────────────────────────────────────► SessionStore::remove
//! ```

pub mod action;
pub mod handler;
pub mod render;

pub use action::ButtonAction;
pub use handler::{MarketHandler, MarketHandlerConfig, MarketSettings};
