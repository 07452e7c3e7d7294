// Shared test helpers; not all items used by every test binary.
#![allow(unused)]

use async_trait::async_trait;
use larkbridge::backend::{AssistantInfo, BackendClient, PromptResponse};
use larkbridge::bus::{ChatInfo, ChatType, InboundMessage, Mention};
use larkbridge::channels::ChatTransport;
use larkbridge::errors::{RelayError, RelayResult};
use larkbridge::relay::Relay;
use larkbridge::render::{Card, ResponseFragment};
use larkbridge::session::FileSessionStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// One outbound call made through the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Send { chat_id: String, content: String },
    Reply { message_id: String, content: String },
    Reaction { message_id: String, emoji: String },
}

impl Outbound {
    pub fn content(&self) -> &str {
        match self {
            Self::Send { content, .. } | Self::Reply { content, .. } => content,
            Self::Reaction { .. } => "",
        }
    }
}

#[derive(Default)]
pub struct MockTransport {
    pub calls: Mutex<Vec<Outbound>>,
    pub fail_reactions: bool,
}

impl MockTransport {
    pub fn calls(&self) -> Vec<Outbound> {
        self.calls.lock().unwrap().clone()
    }

    /// Sends and replies only; reactions are excluded.
    pub fn messages(&self) -> Vec<Outbound> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, Outbound::Reaction { .. }))
            .collect()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_message(&self, chat_id: &str, card: &Card) -> RelayResult<String> {
        self.calls.lock().unwrap().push(Outbound::Send {
            chat_id: chat_id.to_string(),
            content: card.to_content(),
        });
        Ok("om_sent".to_string())
    }

    async fn reply_to_message(&self, message_id: &str, card: &Card) -> RelayResult<String> {
        self.calls.lock().unwrap().push(Outbound::Reply {
            message_id: message_id.to_string(),
            content: card.to_content(),
        });
        Ok("om_reply".to_string())
    }

    async fn get_chat_metadata(&self, _chat_id: &str) -> RelayResult<Option<String>> {
        Ok(Some("Platform Team".to_string()))
    }

    async fn get_user_metadata(&self, _user_id: &str) -> RelayResult<Option<String>> {
        Ok(Some("Alice".to_string()))
    }

    async fn add_reaction(&self, message_id: &str, emoji: &str) -> RelayResult<()> {
        if self.fail_reactions {
            return Err(RelayError::transport("reaction rejected"));
        }
        self.calls.lock().unwrap().push(Outbound::Reaction {
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        });
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateSession { title: String },
    Prompt { session_id: String, text: String },
    Delete { session_id: String },
}

/// Backend that answers prompts from a queue, falling back to an echo.
#[derive(Default)]
pub struct MockBackend {
    pub calls: Mutex<Vec<BackendCall>>,
    responses: Mutex<VecDeque<RelayResult<PromptResponse>>>,
    sessions_created: Mutex<usize>,
}

impl MockBackend {
    pub fn with_responses(responses: Vec<RelayResult<PromptResponse>>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Prompt { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn sessions_created(&self) -> usize {
        *self.sessions_created.lock().unwrap()
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn create_session(&self, chat: &ChatInfo) -> RelayResult<String> {
        self.calls.lock().unwrap().push(BackendCall::CreateSession {
            title: chat.title(),
        });
        let mut n = self.sessions_created.lock().unwrap();
        *n += 1;
        Ok(format!("ses_{}", n))
    }

    async fn send_system_prompt(&self, _session_id: &str, _text: &str) -> RelayResult<()> {
        Ok(())
    }

    async fn send_prompt(&self, session_id: &str, text: &str) -> RelayResult<PromptResponse> {
        self.calls.lock().unwrap().push(BackendCall::Prompt {
            session_id: session_id.to_string(),
            text: text.to_string(),
        });
        let scripted = self.responses.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(text_reply(&format!("echo: {}", text))))
    }

    async fn delete_session(&self, session_id: &str) -> RelayResult<bool> {
        self.calls.lock().unwrap().push(BackendCall::Delete {
            session_id: session_id.to_string(),
        });
        Ok(true)
    }

    async fn health_check(&self) -> bool {
        true
    }
}

pub fn text_reply(text: &str) -> PromptResponse {
    PromptResponse {
        info: Some(AssistantInfo {
            model_id: "mock-model".to_string(),
            usage: None,
        }),
        fragments: vec![ResponseFragment::Text(text.to_string())],
    }
}

pub struct Harness {
    pub relay: Arc<Relay>,
    pub transport: Arc<MockTransport>,
    pub backend: Arc<MockBackend>,
    pub store: Arc<FileSessionStore>,
    pub dir: TempDir,
}

pub fn harness(backend: MockBackend) -> Harness {
    harness_with(MockTransport::default(), backend)
}

pub fn harness_with(transport: MockTransport, backend: MockBackend) -> Harness {
    let dir = TempDir::new().expect("create temp dir");
    let transport = Arc::new(transport);
    let backend = Arc::new(backend);
    let store = Arc::new(FileSessionStore::new(dir.path()).expect("open session store"));
    let relay = Arc::new(
        Relay::new(transport.clone(), backend.clone(), store.clone())
            .with_bot_open_id(Some("ou_bot".to_string())),
    );
    Harness {
        relay,
        transport,
        backend,
        store,
        dir,
    }
}

pub fn direct_message(event_id: &str, text: &str) -> InboundMessage {
    InboundMessage {
        event_id: event_id.to_string(),
        chat_id: "oc_direct".to_string(),
        chat_type: ChatType::Direct,
        message_id: format!("om_{}", event_id),
        message_type: "text".to_string(),
        text: text.to_string(),
        mentions: vec![],
        sender_id: "ou_alice".to_string(),
    }
}

pub fn group_message(event_id: &str, text: &str, mentions_bot: bool) -> InboundMessage {
    let mentions = if mentions_bot {
        vec![Mention {
            key: "@_user_1".to_string(),
            open_id: "ou_bot".to_string(),
            name: "larkbridge".to_string(),
        }]
    } else {
        vec![]
    };
    InboundMessage {
        event_id: event_id.to_string(),
        chat_id: "oc_group".to_string(),
        chat_type: ChatType::Group,
        message_id: format!("om_{}", event_id),
        message_type: "text".to_string(),
        text: text.to_string(),
        mentions,
        sender_id: "ou_alice".to_string(),
    }
}
