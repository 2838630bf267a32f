//! Marketplace Discord bridge
//!
//! Consumes provisioning commands from the backend's durable queue, performs
//! the Discord side effects (private order threads, member enrollment,
//! invites), and reports correlated results on the reverse queue.

mod backend;
mod config;
mod consumer;
mod gateway;
mod handlers;
mod health;
mod manager;
mod router;
mod threads;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use market_nats::{connect, QueueTransport};
use serenity::model::gateway::GatewayIntents;
use serenity::prelude::*;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::backend::BackendClient;
use crate::config::Config;
use crate::consumer::QueueConsumer;
use crate::gateway::SerenityGateway;
use crate::handlers::{BotState, Handler};
use crate::manager::{ConsumerSupervisor, SupervisorConfig};
use crate::router::MessageRouter;
use crate::threads::ThreadOrchestrator;

/// Marketplace Discord Bridge CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/market-bot.toml")]
    config: String,

    /// NATS URL (overrides config file)
    #[arg(long, env = "NATS_URL")]
    nats_url: Option<String>,

    /// Discord bot token (overrides config file)
    #[arg(long, env = "DISCORD_BOT_TOKEN")]
    bot_token: Option<String>,

    /// Queue prefix (overrides config file)
    #[arg(long, env = "MARKET_PREFIX")]
    prefix: Option<String>,

    /// Health check server port
    #[arg(long, env = "HEALTH_CHECK_PORT", default_value = "3001")]
    health_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_bot=debug,market_nats=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting marketplace Discord bridge");

    let args = Args::parse();

    // Load configuration
    let mut config = if std::path::Path::new(&args.config).exists() {
        info!("Loading config from file: {}", args.config);
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, loading from environment");
        Config::from_env()
    };

    if let Some(nats_url) = args.nats_url {
        config.queue.servers = nats_url.split(',').map(|s| s.to_string()).collect();
    }
    if let Some(bot_token) = args.bot_token {
        config.discord.bot_token = bot_token;
    }
    if let Some(prefix) = args.prefix {
        config.queue.prefix = prefix;
    }

    let issues = config.validate();
    if !issues.is_empty() {
        error!("Configuration validation failed:");
        for (field, description) in &issues {
            error!("  {}: {}", field, description);
        }
        anyhow::bail!("Invalid configuration ({} issues)", issues.len());
    }

    info!("Queue prefix: {}", config.queue.prefix);

    // Connect to NATS and make sure both queues exist before going online.
    let nats_client = connect(&config.queue).await?;
    let transport = Arc::new(QueueTransport::new(nats_client, config.queue.clone()));
    transport.ensure_queues().await?;

    // Build serenity client
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord.bot_token, intents)
        .event_handler(Handler)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Discord client: {}", e))?;

    let backend = Arc::new(BackendClient::new(config.backend.base_url.clone()));
    {
        let mut data = client.data.write().await;
        data.insert::<BotState>(Arc::new(BotState {
            backend: Arc::clone(&backend),
        }));
    }

    // Queue consumer: commands flow backend → bot → Discord, responses flow
    // back on the reverse queue.
    let orchestrator = ThreadOrchestrator::new(SerenityGateway::new(client.http.clone()));
    let router = Arc::new(MessageRouter::new(orchestrator, Arc::clone(&transport)));
    let queue_consumer = QueueConsumer::new(
        Arc::clone(&transport),
        router,
        config.queue.consumer.clone(),
    );
    let mut supervisor = ConsumerSupervisor::new(
        queue_consumer,
        Arc::clone(&transport),
        SupervisorConfig::default(),
    );
    supervisor.start();

    // Start health check server
    let health_handle = supervisor.handle();
    let health_port = args.health_port;
    tokio::spawn(async move {
        if let Err(e) = health::start_health_server(health_handle, health_port).await {
            error!("Health server error: {}", e);
        }
    });

    // Graceful shutdown: close all shards on SIGTERM or Ctrl+C.
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.ok();
        }
        info!("Shutdown signal received, stopping Discord client...");
        shard_manager.shutdown_all().await;
    });

    info!("Starting Discord gateway connection...");

    // Start the Discord client (blocks until all shards are stopped)
    client
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Discord client error: {}", e))?;

    // Shards are down; tear down the queue consumer before exiting.
    supervisor.stop().await;

    info!("Marketplace Discord bridge stopped");
    Ok(())
}
