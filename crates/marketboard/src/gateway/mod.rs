//! Gateway system connecting the marketplace to its chat platform.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Marketboard Core                      │
//! │                                                           │
//! │   MarketHandler ◄── events ──┐                            │
//! │        │                     │                            │
//! │        ▼                     │                            │
//! │   GatewayPlatform ─► GatewayManager ─► request/result     │
//! │                              │          correlation       │
//! └──────────────────────────────┼────────────────────────────┘
//!                                │ GatewayCommand / GatewayEvent
//!                       ┌────────┴────────┐
//!                       │ Discord gateway │
//!                       └─────────────────┘
//! ```
//!
//! - [`GatewayCommand`]: messages from the core to the gateway
//! - [`GatewayEvent`]: messages from the gateway to the core

pub mod manager;
pub mod platform;

// Re-export protocol types from the protocol crate
pub use marketboard_gateway_protocol::{
    ButtonPressedData, ButtonStyle, GatewayCommand, GatewayEvent, InlineButton, InlineKeyboard,
    ListingCard, MessageContent, MessageReceivedData, Sender, capabilities, error_codes,
};

pub use manager::{GatewayHandle, GatewayManager, MessageHandler, Reply, SendError};
pub use platform::{GatewayPlatform, Platform, PlatformError};

// Re-export Discord gateway from the discord crate
#[cfg(feature = "gateway-discord")]
pub use marketboard_gateway_discord::{DiscordConfig, DiscordGateway};
