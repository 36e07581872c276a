use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use marketboard::build_info::VERSION;
use marketboard::config::Config;
use marketboard::dispatch::{MarketHandler, MarketHandlerConfig};
use marketboard::gateway::{GatewayManager, GatewayPlatform};
use marketboard::listing::ListingRegistry;
use marketboard::session::SessionStore;

/// Name the Discord gateway is registered under.
const DISCORD_GATEWAY: &str = "discord";

/// How often abandoned sessions are looked for.
const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn run() -> Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    info!(version = VERSION, guild_id = config.guild_id, "Starting marketboard");

    let gateways = GatewayManager::new(config.request_timeout);
    let platform = Arc::new(GatewayPlatform::new(
        gateways.clone(),
        DISCORD_GATEWAY,
        vec![config.roles.admin.clone()],
    ));

    let handler = Arc::new(MarketHandler::new(MarketHandlerConfig {
        sessions: SessionStore::new(),
        listings: ListingRegistry::new(config.listings),
        platform,
        settings: config.market_settings(),
    }));
    gateways.set_handler(handler.clone()).await;

    if let Some(ttl) = config.session_ttl {
        let ttl = chrono::Duration::from_std(ttl).context("session TTL out of range")?;
        spawn_session_expiry(handler.clone(), ttl);
        info!(ttl_minutes = ttl.num_minutes(), "Session expiry enabled");
    }

    #[cfg(feature = "gateway-discord")]
    {
        let mut gateway_task = start_discord_gateway(&gateways, &config).await;
        tokio::select! {
            _ = shutdown_signal() => {}
            _ = &mut gateway_task => warn!("Discord gateway exited"),
        }
    }

    #[cfg(not(feature = "gateway-discord"))]
    anyhow::bail!("no gateway compiled in; enable the `gateway-discord` feature");

    #[cfg(feature = "gateway-discord")]
    {
        gateways.shutdown().await;
        info!("Marketboard stopped");
        Ok(())
    }
}

/// Periodically drop creation sessions older than `ttl`.
fn spawn_session_expiry(handler: Arc<MarketHandler>, ttl: chrono::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EXPIRY_SWEEP_INTERVAL);
        interval.tick().await; // skip immediate tick
        loop {
            interval.tick().await;
            let expired = handler.expire_sessions(ttl).await;
            if expired > 0 {
                info!(expired, remaining = handler.sessions().len(), "Expired creation sessions");
            }
        }
    });
}

/// Start the Discord gateway in a background task.
#[cfg(feature = "gateway-discord")]
async fn start_discord_gateway(
    gateways: &GatewayManager,
    config: &Config,
) -> tokio::task::JoinHandle<()> {
    use marketboard::gateway::{DiscordConfig, DiscordGateway};

    let (cmd_rx, evt_tx) = gateways.register(DISCORD_GATEWAY, vec![]).await;
    let gateway = DiscordGateway::new(DiscordConfig::new(&config.discord_token, config.guild_id));

    let task = tokio::spawn(async move {
        gateway.start(evt_tx, cmd_rx).await;
    });

    info!("Discord gateway started");
    task
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
