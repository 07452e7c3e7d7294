mod subcommands;


use crate::backend::{BackendClient, OpencodeClient};
use crate::channels::lark::{LarkClient, LongConnection};
use crate::config::{Config, EventMode, load_config};
use crate::gateway::{self, GatewayState};
use crate::relay::{Relay, spawn_session_cleanup};
use crate::session::{FileSessionStore, SessionStore};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Capacity of the channel between event intake and the relay.
const INBOUND_QUEUE: usize = 256;

#[derive(Parser)]
#[command(name = "larkbridge")]
#[command(about = "Relay Feishu/Lark chats to an OpenCode server")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay (default)
    Serve,
    /// Validate configuration and print a redacted summary
    Check,
    /// Check the OpenCode server: health, session creation, one prompt
    Probe {
        /// Prompt to send
        #[arg(long, short = 'p', default_value = "Hello, can you respond with \"test\"?")]
        prompt: String,
        /// Keep the probe session instead of deleting it afterwards
        #[arg(long)]
        keep: bool,
    },
    /// Inspect or prune stored chat sessions
    Sessions {
        #[command(subcommand)]
        cmd: SessionCommands,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// List chat bindings
    List,
    /// Remove bindings idle for more than N days
    Cleanup {
        /// Defaults to SESSION_RETENTION_DAYS
        #[arg(long, short = 'd')]
        days: Option<u32>,
    },
    /// Forget one chat's binding
    Delete { chat_id: String },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await?,
        Commands::Check => subcommands::check_command()?,
        Commands::Probe { prompt, keep } => subcommands::probe_command(&prompt, keep).await?,
        Commands::Sessions { cmd } => subcommands::sessions_command(cmd).await?,
    }

    Ok(())
}

async fn serve() -> Result<()> {
    let config = load_config()?;
    info!(
        "starting larkbridge {} ({} mode)",
        crate::VERSION,
        config.lark.event_mode
    );

    let backend = Arc::new(OpencodeClient::new(&config.opencode));
    info!("checking OpenCode server health at {}", config.opencode.host);
    if !backend.health_check().await {
        anyhow::bail!(
            "OpenCode server at {} is not healthy",
            config.opencode.host
        );
    }
    info!("OpenCode server is healthy");

    let sessions = Arc::new(FileSessionStore::new(&config.storage.data_path)?);
    let known = sessions.all().await?.len();
    info!(
        "session store at {} ({} chat(s))",
        sessions.path().display(),
        known
    );

    let lark = Arc::new(LarkClient::new(config.lark.clone()));
    let bot_open_id = match lark.bot_info().await {
        Ok(bot) => Some(bot.open_id),
        Err(e) => {
            warn!("could not fetch bot identity, accepting any mention: {}", e);
            None
        }
    };

    let relay = Arc::new(
        Relay::new(lark.clone(), backend, sessions.clone())
            .with_bot_open_id(bot_open_id)
            .with_max_processed_events(config.relay.max_processed_events),
    );

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
    let relay_handle = tokio::spawn(relay.run(inbound_rx));
    let cleanup_handle = start_cleanup(&config, sessions);

    let intake_handle = match config.lark.event_mode {
        EventMode::Webhook => {
            let state = GatewayState::new(inbound_tx, config.lark.verification_token.clone());
            gateway::start(&config.server.host, config.server.port, state).await?
        }
        EventMode::LongConnection => {
            let conn = LongConnection::new(lark, inbound_tx);
            info!("Lark bot is running in long-connection mode");
            tokio::spawn(conn.run())
        }
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    intake_handle.abort();
    if let Some(handle) = cleanup_handle {
        handle.abort();
    }
    relay_handle.abort();
    Ok(())
}

fn start_cleanup(
    config: &Config,
    sessions: Arc<FileSessionStore>,
) -> Option<tokio::task::JoinHandle<()>> {
    let hours = config.storage.cleanup_interval_hours;
    if hours == 0 {
        info!("periodic session cleanup disabled");
        return None;
    }
    let store: Arc<dyn SessionStore> = sessions;
    Some(spawn_session_cleanup(
        store,
        config.storage.session_retention_days,
        Duration::from_secs(hours * 3600),
    ))
}
