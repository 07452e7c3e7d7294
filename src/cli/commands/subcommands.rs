use super::SessionCommands;
use crate::backend::{BackendClient, OpencodeClient};
use crate::bus::{ChatInfo, ChatType};
use crate::config::loader::{OPTIONAL_ENV_VARS, REQUIRED_ENV_VARS};
use crate::config::{Config, load_config, load_config_from, missing_required};
use crate::render::render;
use crate::session::{FileSessionStore, SessionStore};
use crate::utils::mask_secret;
use anyhow::Result;
use std::time::Instant;

pub(super) fn check_command() -> Result<()> {
    let lookup = |key: &str| std::env::var(key).ok();

    let missing = missing_required(lookup);
    if !missing.is_empty() {
        println!("Missing required settings:");
        for key in &missing {
            let what = REQUIRED_ENV_VARS
                .iter()
                .find(|(k, _)| k == key)
                .map_or("", |(_, desc)| *desc);
            println!("  ✗ {} ({})", key, what);
        }
        anyhow::bail!("{} required setting(s) missing", missing.len());
    }

    let config = load_config_from(lookup)?;
    config.validate()?;

    for line in config_summary(&config) {
        println!("{}", line);
    }
    let unset: Vec<&str> = OPTIONAL_ENV_VARS
        .iter()
        .copied()
        .filter(|key| lookup(key).is_none_or(|v| v.trim().is_empty()))
        .collect();
    if !unset.is_empty() {
        println!("\nUsing defaults for: {}", unset.join(", "));
    }
    println!("\n✓ Configuration OK");
    Ok(())
}

/// One line per effective setting, secrets masked.
pub(super) fn config_summary(config: &Config) -> Vec<String> {
    let optional_secret = |value: &Option<String>| {
        value
            .as_deref()
            .map_or_else(|| "(not set)".to_string(), |v| mask_secret(v, 4))
    };
    vec![
        format!("Lark app id:        {}", config.lark.app_id),
        format!("Lark app secret:    {}", mask_secret(&config.lark.app_secret, 4)),
        format!("Lark domain:        {}", config.lark.domain),
        format!("Event mode:         {}", config.lark.event_mode),
        format!(
            "Verification token: {}",
            optional_secret(&config.lark.verification_token)
        ),
        format!("Encrypt key:        {}", optional_secret(&config.lark.encrypt_key)),
        format!("OpenCode host:      {}", config.opencode.host),
        format!("OpenCode timeout:   {} ms", config.opencode.timeout_ms),
        format!(
            "OpenCode auth:      {}",
            config
                .opencode
                .basic_auth()
                .map_or_else(|| "none".to_string(), |(user, _)| format!("basic ({})", user))
        ),
        format!("Sessions file:      {}", config.storage.sessions_file().display()),
        format!(
            "Session retention:  {} day(s), cleanup every {} hour(s)",
            config.storage.session_retention_days, config.storage.cleanup_interval_hours
        ),
        format!("Webhook server:     {}:{}", config.server.host, config.server.port),
        format!("Dedup capacity:     {}", config.relay.max_processed_events),
    ]
}

pub(super) async fn probe_command(prompt: &str, keep: bool) -> Result<()> {
    let config = load_config()?;
    let backend = OpencodeClient::new(&config.opencode);

    println!("Probing OpenCode server at {}", config.opencode.host);
    if !backend.health_check().await {
        anyhow::bail!("health check failed");
    }
    println!("  ✓ server is healthy");

    let chat = ChatInfo {
        chat_id: "probe".to_string(),
        chat_type: ChatType::Direct,
        sender_id: String::new(),
        chat_name: None,
        sender_name: Some("larkbridge probe".to_string()),
    };
    let session_id = backend.create_session(&chat).await?;
    println!("  ✓ created session {}", session_id);

    let started = Instant::now();
    let result = backend.send_prompt(&session_id, prompt).await;
    let elapsed = started.elapsed();

    if !keep {
        match backend.delete_session(&session_id).await {
            Ok(true) => println!("  ✓ deleted session {}", session_id),
            Ok(false) => println!("  ! session {} was not deleted", session_id),
            Err(e) => println!("  ! failed to delete session {}: {}", session_id, e),
        }
    }

    let response = result?;
    let payload = render(&response.fragments, response.model_id(), response.usage());
    println!("  ✓ reply in {:.2}s", elapsed.as_secs_f64());
    if !payload.model.is_empty() {
        println!("\nmodel: {}", payload.model);
    }
    if !payload.thinking.is_empty() {
        println!("\n[thinking]\n{}", payload.thinking);
    }
    println!("\n{}", payload.body);
    if !payload.info.is_empty() {
        println!("\n{}", payload.info);
    }
    Ok(())
}

pub(super) async fn sessions_command(cmd: SessionCommands) -> Result<()> {
    let config = load_config()?;
    let store = FileSessionStore::new(&config.storage.data_path)?;

    match cmd {
        SessionCommands::List => {
            let bindings = store.all().await?;
            if bindings.is_empty() {
                println!("No chat sessions in {}", store.path().display());
                return Ok(());
            }
            println!("{:<40} {:<36} LAST USED", "CHAT", "SESSION");
            for (chat_id, binding) in &bindings {
                let session = if binding.session_id.is_empty() {
                    "(pending)"
                } else {
                    binding.session_id.as_str()
                };
                println!(
                    "{:<40} {:<36} {}",
                    chat_id,
                    session,
                    binding.last_used.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            println!("\n{} chat(s)", bindings.len());
        }
        SessionCommands::Cleanup { days } => {
            let days = days.unwrap_or(config.storage.session_retention_days);
            let removed = store.cleanup(days).await?;
            println!("Removed {} binding(s) idle for more than {} day(s)", removed, days);
        }
        SessionCommands::Delete { chat_id } => {
            if store.all().await?.contains_key(&chat_id) {
                store.delete(&chat_id).await?;
                println!("Deleted binding for {}", chat_id);
            } else {
                println!("No binding for {}", chat_id);
            }
        }
    }
    Ok(())
}
