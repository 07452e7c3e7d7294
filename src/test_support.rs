//! In-crate fakes for the transport and backend seams.

use crate::backend::{BackendClient, PromptResponse};
use crate::bus::ChatInfo;
use crate::channels::ChatTransport;
use crate::errors::RelayResult;
use crate::render::{Card, ResponseFragment};
use async_trait::async_trait;
use std::sync::Mutex;

/// Records the content of every card sent or replied.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(&self, _chat_id: &str, card: &Card) -> RelayResult<String> {
        self.sent.lock().unwrap().push(card.to_content());
        Ok("om_out".into())
    }
    async fn reply_to_message(&self, _message_id: &str, card: &Card) -> RelayResult<String> {
        self.sent.lock().unwrap().push(card.to_content());
        Ok("om_out".into())
    }
    async fn get_chat_metadata(&self, _chat_id: &str) -> RelayResult<Option<String>> {
        Ok(None)
    }
    async fn get_user_metadata(&self, _user_id: &str) -> RelayResult<Option<String>> {
        Ok(None)
    }
    async fn add_reaction(&self, _message_id: &str, _emoji: &str) -> RelayResult<()> {
        Ok(())
    }
}

/// Always hands out `ses_1` and answers `echo: <prompt>`.
pub struct EchoBackend;

#[async_trait]
impl BackendClient for EchoBackend {
    async fn create_session(&self, _chat: &ChatInfo) -> RelayResult<String> {
        Ok("ses_1".into())
    }
    async fn send_system_prompt(&self, _session_id: &str, _text: &str) -> RelayResult<()> {
        Ok(())
    }
    async fn send_prompt(&self, _session_id: &str, text: &str) -> RelayResult<PromptResponse> {
        Ok(PromptResponse {
            info: None,
            fragments: vec![ResponseFragment::Text(format!("echo: {}", text))],
        })
    }
    async fn delete_session(&self, _session_id: &str) -> RelayResult<bool> {
        Ok(true)
    }
    async fn health_check(&self) -> bool {
        true
    }
}
