//! Guided listing creation in private workspaces.
//!
//! A session is opened when a member presses a create button and a private
//! workspace has been created for them. The member's first message becomes
//! the description, the second the reward; a visibility button then
//! publishes the listing and the session is removed.

pub mod error;
pub mod state;
pub mod store;

pub use error::SessionError;
pub use state::{CreationSession, SessionState, TextOutcome};
pub use store::SessionStore;
