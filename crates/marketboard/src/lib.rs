//! Marketboard: a marketplace-listing workflow for Discord guilds.
//!
//! Members press a create button on the board, describe their posting in a
//! private channel and publish it as a listing that others can accept, show
//! interest in, or that the creator withdraws or closes.

pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod listing;
pub mod session;
pub mod sync;

/// Build information.
pub mod build_info {
    /// Crate version from Cargo.toml.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
