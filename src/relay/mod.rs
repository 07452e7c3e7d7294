//! Per-event conversation flow between the chat platform and the backend.
//!
//! `received → dedup → (command | query) → backend → rendered → delivered`.
//! Terminal outcomes are [`Outcome`] on success, or a
//! [`RelayError`](crate::errors::RelayError) after a best-effort error card
//! has been sent to the chat.

use crate::backend::BackendClient;
use crate::bus::{ChatInfo, ChatType, InboundMessage};
use crate::channels::ChatTransport;
use crate::commands::{CommandContext, CommandHost, CommandRegistry};
use crate::dedup::{DEFAULT_MAX_PROCESSED_EVENTS, EventDeduplicator};
use crate::errors::RelayResult;
use crate::render::{build_error_card, build_response_card, build_text_card, render};
use crate::session::SessionStore;
use crate::utils::regex::RegexPatterns;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const CLARIFYING_PROMPT: &str = "What can I help you with?";
pub const TYPING_REACTION: &str = "Typing";

/// Prune idle per-chat locks once the map grows past this.
const CHAT_LOCK_PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingEventId,
    Duplicate,
    NotText,
    NotAddressed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Dropped(DropReason),
    /// The query was empty; a clarifying prompt was sent.
    Clarified,
    Command,
    Delivered,
}

/// Remove every `@_user_N` marker and trim.
pub fn strip_mentions(text: &str) -> String {
    RegexPatterns::mention_marker()
        .replace_all(text, "")
        .trim()
        .to_string()
}

pub struct Relay {
    transport: Arc<dyn ChatTransport>,
    backend: Arc<dyn BackendClient>,
    sessions: Arc<dyn SessionStore>,
    dedup: EventDeduplicator,
    commands: CommandRegistry,
    bot_open_id: Option<String>,
    chat_locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Relay {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        backend: Arc<dyn BackendClient>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            transport,
            backend,
            sessions,
            dedup: EventDeduplicator::new(DEFAULT_MAX_PROCESSED_EVENTS),
            commands: CommandRegistry::with_builtins(),
            bot_open_id: None,
            chat_locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// The bot's own open id; when set, group mentions must name it.
    #[must_use]
    pub fn with_bot_open_id(mut self, open_id: Option<String>) -> Self {
        self.bot_open_id = open_id.filter(|id| !id.is_empty());
        self
    }

    #[must_use]
    pub fn with_max_processed_events(mut self, max: usize) -> Self {
        self.dedup = EventDeduplicator::new(max);
        self
    }

    #[must_use]
    pub fn with_commands(mut self, commands: CommandRegistry) -> Self {
        self.commands = commands;
        self
    }

    pub fn dedup(&self) -> &EventDeduplicator {
        &self.dedup
    }

    /// Consume inbound messages until the sender side closes.
    pub async fn run(self: Arc<Self>, mut inbound_rx: mpsc::Receiver<InboundMessage>) {
        while let Some(msg) = inbound_rx.recv().await {
            self.clone().dispatch(msg);
        }
        debug!("inbound channel closed");
    }

    /// Handle one event on its own task. Failures are logged, never propagated.
    pub fn dispatch(self: Arc<Self>, msg: InboundMessage) -> JoinHandle<()> {
        tokio::spawn(async move {
            let event_id = msg.event_id.clone();
            match self.handle_event(msg).await {
                Ok(outcome) => debug!("event {} finished: {:?}", event_id, outcome),
                Err(e) => error!("event {} failed: {}", event_id, e),
            }
        })
    }

    fn is_addressed(&self, msg: &InboundMessage) -> bool {
        if msg.chat_type == ChatType::Direct {
            return true;
        }
        if !msg.mentions.is_empty() {
            return match &self.bot_open_id {
                Some(bot) => msg.mentions.iter().any(|m| &m.open_id == bot),
                None => true,
            };
        }
        RegexPatterns::mention_marker().is_match(&msg.text)
    }

    fn chat_lock(&self, chat_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .chat_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks.len() > CHAT_LOCK_PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks.entry(chat_id.to_string()).or_default().clone()
    }

    async fn enrich(&self, mut chat: ChatInfo) -> ChatInfo {
        let chat_name = self.transport.get_chat_metadata(&chat.chat_id);
        let sender_name = async {
            if chat.sender_id.is_empty() {
                Ok(None)
            } else {
                self.transport.get_user_metadata(&chat.sender_id).await
            }
        };
        let (chat_name, sender_name) = tokio::join!(chat_name, sender_name);
        match chat_name {
            Ok(name) => chat.chat_name = name,
            Err(e) => warn!("failed to get chat info for {}: {}", chat.chat_id, e),
        }
        match sender_name {
            Ok(name) => chat.sender_name = name,
            Err(e) => warn!("failed to get user info for {}: {}", chat.sender_id, e),
        }
        chat
    }

    pub async fn handle_event(&self, msg: InboundMessage) -> RelayResult<Outcome> {
        if msg.event_id.is_empty() {
            debug!("event without id, dropping");
            return Ok(Outcome::Dropped(DropReason::MissingEventId));
        }
        if !self.dedup.should_process(&msg.event_id) {
            return Ok(Outcome::Dropped(DropReason::Duplicate));
        }
        if !msg.is_text() {
            debug!("ignoring {} message {}", msg.message_type, msg.message_id);
            return Ok(Outcome::Dropped(DropReason::NotText));
        }
        if !self.is_addressed(&msg) {
            debug!("bot not mentioned in group {}, skipping", msg.chat_id);
            return Ok(Outcome::Dropped(DropReason::NotAddressed));
        }

        let query = strip_mentions(&msg.text);
        if query.is_empty() {
            self.send_text(&msg.chat_id, CLARIFYING_PROMPT).await?;
            return Ok(Outcome::Clarified);
        }

        let chat = self.enrich(ChatInfo::from_message(&msg)).await;
        match self.process_query(&chat, &msg.message_id, &query).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let card = build_error_card(&e.user_message());
                if let Err(send_err) = self.transport.reply_to_message(&msg.message_id, &card).await {
                    warn!("failed to send error card to {}: {}", chat.chat_id, send_err);
                }
                Err(e)
            }
        }
    }

    async fn process_query(&self, chat: &ChatInfo, message_id: &str, query: &str) -> RelayResult<Outcome> {
        let session_id = {
            let lock = self.chat_lock(&chat.chat_id);
            let _guard = lock.lock().await;

            let ctx = CommandContext {
                chat,
                message_id,
                host: self,
            };
            if self.commands.try_execute(&ctx, query).await? {
                return Ok(Outcome::Command);
            }
            self.resolve_session(chat).await?
        };
        debug!("chat {} using session {}", chat.chat_id, session_id);

        if let Err(e) = self.transport.add_reaction(message_id, TYPING_REACTION).await {
            warn!("failed to add reaction to {}: {}", message_id, e);
        }

        let response = self.backend.send_prompt(&session_id, query).await?;
        let payload = render(&response.fragments, response.model_id(), response.usage());
        self.transport
            .reply_to_message(message_id, &build_response_card(&payload))
            .await?;
        info!("replied to {} in chat {}", message_id, chat.chat_id);
        Ok(Outcome::Delivered)
    }

    /// Bound session for the chat, creating one on the backend if needed.
    /// Callers hold the chat lock.
    async fn resolve_session(&self, chat: &ChatInfo) -> RelayResult<String> {
        let existing = self.sessions.get_or_create(&chat.chat_id).await?;
        if !existing.is_empty() {
            return Ok(existing);
        }
        info!("creating backend session for chat {}", chat.chat_id);
        let session_id = self.backend.create_session(chat).await?;
        self.sessions
            .set_session_id(&chat.chat_id, &session_id)
            .await?;
        Ok(session_id)
    }
}

#[async_trait]
impl CommandHost for Relay {
    async fn create_new_session(&self, chat: &ChatInfo) -> RelayResult<String> {
        let session_id = self.backend.create_session(chat).await?;
        self.sessions
            .set_session_id(&chat.chat_id, &session_id)
            .await?;
        Ok(session_id)
    }

    async fn reset_session(&self, chat_id: &str) -> RelayResult<()> {
        let previous = self
            .sessions
            .all()
            .await?
            .remove(chat_id)
            .map(|b| b.session_id)
            .filter(|id| !id.is_empty());
        self.sessions.delete(chat_id).await?;
        if let Some(session_id) = previous {
            match self.backend.delete_session(&session_id).await {
                Ok(true) => debug!("deleted backend session {}", session_id),
                Ok(false) => debug!("backend did not confirm deleting {}", session_id),
                Err(e) => warn!("failed to delete backend session {}: {}", session_id, e),
            }
        }
        Ok(())
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> RelayResult<()> {
        self.transport
            .send_message(chat_id, &build_text_card(text))
            .await
            .map(|_| ())
    }
}

/// Periodically drop session bindings idle for more than `max_age_days`.
pub fn spawn_session_cleanup(
    sessions: Arc<dyn SessionStore>,
    max_age_days: u32,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match sessions.cleanup(max_age_days).await {
                Ok(0) => debug!("session cleanup: nothing to remove"),
                Ok(n) => info!("session cleanup removed {} binding(s)", n),
                Err(e) => error!("session cleanup failed: {}", e),
            }
        }
    })
}
