use super::{Command, Invocation};
use crate::errors::RelayResult;
use async_trait::async_trait;
use tracing::info;

pub struct NewSessionCommand;

#[async_trait]
impl Command for NewSessionCommand {
    fn name(&self) -> &str {
        "new"
    }

    fn description(&self) -> &str {
        "Start a new OpenCode session for this chat"
    }

    async fn execute(&self, inv: Invocation<'_>) -> RelayResult<()> {
        let chat = inv.ctx.chat;
        let session_id = inv.ctx.host.create_new_session(chat).await?;
        info!("chat {} switched to new session {}", chat.chat_id, session_id);
        inv.ctx
            .host
            .send_text(&chat.chat_id, &format!("✅ New session created: {}", session_id))
            .await
    }
}

pub struct ResetCommand;

#[async_trait]
impl Command for ResetCommand {
    fn name(&self) -> &str {
        "reset"
    }

    fn description(&self) -> &str {
        "Forget the current session; the next message starts a new one"
    }

    async fn execute(&self, inv: Invocation<'_>) -> RelayResult<()> {
        let chat_id = &inv.ctx.chat.chat_id;
        inv.ctx.host.reset_session(chat_id).await?;
        inv.ctx
            .host
            .send_text(
                chat_id,
                "🔄 Session reset. Your next message starts a new conversation.",
            )
            .await
    }
}

pub struct HelpCommand;

#[async_trait]
impl Command for HelpCommand {
    fn name(&self) -> &str {
        "help"
    }

    fn description(&self) -> &str {
        "List available commands"
    }

    async fn execute(&self, inv: Invocation<'_>) -> RelayResult<()> {
        inv.ctx
            .host
            .send_text(&inv.ctx.chat.chat_id, &inv.registry.help())
            .await
    }
}
