pub mod opencode;

use crate::bus::ChatInfo;
use crate::errors::RelayResult;
use crate::render::{ResponseFragment, Usage};
use async_trait::async_trait;

pub use opencode::OpencodeClient;

/// Metadata the backend attaches to an assistant reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantInfo {
    pub model_id: String,
    /// `None` when the backend reported no token counts.
    pub usage: Option<Usage>,
}

/// A decoded assistant reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptResponse {
    pub info: Option<AssistantInfo>,
    pub fragments: Vec<ResponseFragment>,
}

impl PromptResponse {
    pub fn model_id(&self) -> &str {
        self.info.as_ref().map_or("", |i| i.model_id.as_str())
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.info.as_ref().and_then(|i| i.usage.as_ref())
    }
}

/// Conversational backend that owns sessions and produces replies.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Create a session titled after the chat and prime it with the system prompt.
    async fn create_session(&self, chat: &ChatInfo) -> RelayResult<String>;

    /// Add context to a session without asking for a reply.
    async fn send_system_prompt(&self, session_id: &str, text: &str) -> RelayResult<()>;

    async fn send_prompt(&self, session_id: &str, text: &str) -> RelayResult<PromptResponse>;

    /// Returns `false` when the backend did not confirm the deletion.
    async fn delete_session(&self, session_id: &str) -> RelayResult<bool>;

    async fn health_check(&self) -> bool;
}
