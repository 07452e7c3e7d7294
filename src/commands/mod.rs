//! Slash commands typed into a chat (`/new`, `/reset`, `/help`).
//!
//! Commands run before a query reaches the backend. A query that starts
//! with `/` but names no registered command falls through as a normal query.

pub mod builtin;

use crate::bus::ChatInfo;
use crate::errors::RelayResult;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub use builtin::{HelpCommand, NewSessionCommand, ResetCommand};

/// Operations the relay exposes to commands.
#[async_trait]
pub trait CommandHost: Send + Sync {
    /// Create a fresh backend session for the chat and bind it. Returns the new id.
    async fn create_new_session(&self, chat: &ChatInfo) -> RelayResult<String>;

    /// Forget the chat's binding. The next query creates a new session.
    async fn reset_session(&self, chat_id: &str) -> RelayResult<()>;

    /// Send a plain text card to the chat.
    async fn send_text(&self, chat_id: &str, text: &str) -> RelayResult<()>;
}

/// Where a command was issued and what it can act on.
pub struct CommandContext<'a> {
    pub chat: &'a ChatInfo,
    pub message_id: &'a str,
    pub host: &'a dyn CommandHost,
}

/// One parsed invocation handed to [`Command::execute`].
pub struct Invocation<'a> {
    pub ctx: &'a CommandContext<'a>,
    pub args: &'a [String],
    pub registry: &'a CommandRegistry,
}

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn execute(&self, inv: Invocation<'_>) -> RelayResult<()>;
}

/// Split `/name arg1 arg2` into `("name", ["arg1", "arg2"])`.
///
/// Returns `None` when the trimmed query doesn't start with `/` or has no name.
pub fn parse_command(raw_query: &str) -> Option<(&str, Vec<String>)> {
    let body = raw_query.trim().strip_prefix('/')?;
    let mut parts = body.split_whitespace();
    let name = parts.next()?;
    // "/ new" is not a command
    if body.starts_with(char::is_whitespace) {
        return None;
    }
    Some((name, parts.map(str::to_string).collect()))
}

/// Name → command map, kept in registration order for `help()`.
#[derive(Default)]
pub struct CommandRegistry {
    commands: IndexMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `/new`, `/reset` and `/help`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NewSessionCommand));
        registry.register(Arc::new(ResetCommand));
        registry.register(Arc::new(HelpCommand));
        registry
    }

    pub fn register(&mut self, command: Arc<dyn Command>) {
        let name = command.name().to_string();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            warn!("command registry: rejecting invalid command name {:?}", name);
            return;
        }
        if self.commands.contains_key(&name) {
            warn!("command registry: replacing existing command /{}", name);
        }
        self.commands.insert(name, command);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.commands.get(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Run the command named in `raw_query`, if any.
    ///
    /// `Ok(false)` means the query was not a registered command and should be
    /// treated as a normal prompt. Errors from the command itself propagate.
    pub async fn try_execute(&self, ctx: &CommandContext<'_>, raw_query: &str) -> RelayResult<bool> {
        let Some((name, args)) = parse_command(raw_query) else {
            return Ok(false);
        };
        let Some(command) = self.commands.get(name) else {
            debug!("unknown command /{}, treating as query", name);
            return Ok(false);
        };
        debug!("executing command /{} in chat {}", name, ctx.chat.chat_id);
        command
            .execute(Invocation {
                ctx,
                args: &args,
                registry: self,
            })
            .await?;
        Ok(true)
    }

    pub fn help(&self) -> String {
        let mut lines = vec!["Available commands:".to_string()];
        for command in self.commands.values() {
            lines.push(format!("  /{} - {}", command.name(), command.description()));
        }
        lines.join("\n")
    }
}
