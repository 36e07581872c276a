use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::dispatch::MarketSettings;
use crate::listing::ListingPolicy;

/// Default time to wait for a gateway command result.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Config (root)
// ============================================================================

/// Runtime configuration, read from the environment.
#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub guild_id: u64,
    pub roles: RolesConfig,
    pub channels: ChannelsConfig,
    pub listings: ListingPolicy,
    /// Age after which unfinished creation sessions are dropped. `None`
    /// keeps them until their workspace is deleted.
    pub session_ttl: Option<Duration>,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolesConfig {
    pub player: String,
    pub admin: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelsConfig {
    pub market: String,
    pub archive: String,
    pub logs: String,
    pub missions: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("environment variable '{name}' has invalid value '{value}': {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: &'static str,
    },
}

impl Config {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars { lookup };

        Ok(Self {
            discord_token: vars.required("DISCORD_TOKEN")?,
            guild_id: vars.parsed("GUILD_ID", "expected a numeric guild id")?,
            roles: RolesConfig {
                player: vars.required("PLAYER_ROLE")?,
                admin: vars.required("ADMIN_ROLE")?,
            },
            channels: ChannelsConfig {
                market: vars.required("CHANNEL_MARKET")?,
                archive: vars.required("CHANNEL_ARCHIVE")?,
                logs: vars.required("CHANNEL_LOGS")?,
                missions: vars.optional("CHANNEL_MISSIONS"),
            },
            listings: ListingPolicy {
                allow_self_accept: vars
                    .flag("ALLOW_SELF_ACCEPT")?
                    .unwrap_or(ListingPolicy::default().allow_self_accept),
            },
            session_ttl: session_ttl(&vars)?,
            request_timeout: Duration::from_secs(
                vars.optional_parsed("REQUEST_TIMEOUT_SECONDS", "expected whole seconds")?
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        })
    }

    /// Roles and channels for the marketplace handler.
    pub fn market_settings(&self) -> MarketSettings {
        MarketSettings {
            player_role: self.roles.player.clone(),
            admin_role: self.roles.admin.clone(),
            market_channel: self.channels.market.clone(),
            missions_channel: self.channels.missions.clone(),
            archive_channel: self.channels.archive.clone(),
            log_channel: self.channels.logs.clone(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"<redacted>")
            .field("guild_id", &self.guild_id)
            .field("roles", &self.roles)
            .field("channels", &self.channels)
            .field("listings", &self.listings)
            .field("session_ttl", &self.session_ttl)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Longest accepted session TTL (one year).
const MAX_SESSION_TTL_MINUTES: u64 = 365 * 24 * 60;

fn session_ttl<F: Fn(&str) -> Option<String>>(
    vars: &Vars<F>,
) -> Result<Option<Duration>, ConfigError> {
    const NAME: &str = "SESSION_TTL_MINUTES";

    let Some(minutes) = vars.optional_parsed::<u64>(NAME, "expected whole minutes")? else {
        return Ok(None);
    };
    if minutes == 0 {
        return Ok(None);
    }
    minutes
        .checked_mul(60)
        .filter(|_| minutes <= MAX_SESSION_TTL_MINUTES)
        .map(|secs| Some(Duration::from_secs(secs)))
        .ok_or_else(|| ConfigError::Invalid {
            name: NAME.to_string(),
            value: minutes.to_string(),
            reason: "at most one year of minutes",
        })
}

// ============================================================================
// Variable access
// ============================================================================

struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.optional(name)
            .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
    }

    fn parsed<T: std::str::FromStr>(
        &self,
        name: &str,
        reason: &'static str,
    ) -> Result<T, ConfigError> {
        let value = self.required(name)?;
        parse_value(name, value, reason)
    }

    fn optional_parsed<T: std::str::FromStr>(
        &self,
        name: &str,
        reason: &'static str,
    ) -> Result<Option<T>, ConfigError> {
        self.optional(name)
            .map(|value| parse_value(name, value, reason))
            .transpose()
    }

    fn flag(&self, name: &str) -> Result<Option<bool>, ConfigError> {
        let Some(value) = self.optional(name) else {
            return Ok(None);
        };
        match value.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::Invalid {
                name: name.to_string(),
                value,
                reason: "expected true or false",
            }),
        }
    }
}

fn parse_value<T: std::str::FromStr>(
    name: &str,
    value: String,
    reason: &'static str,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        name: name.to_string(),
        value,
        reason,
    })
}
