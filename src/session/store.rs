use crate::errors::RelayResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One chat's backend session, as persisted on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBinding {
    /// Empty until the first backend session has been created.
    pub session_id: String,
    pub last_used: DateTime<Utc>,
}

impl ChatBinding {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            last_used: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_used = Utc::now();
    }
}

/// Storage for chat → backend session bindings.
///
/// Keyed by the platform chat id. Implementations persist every mutation
/// before returning.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the bound session id, or `""` after creating an empty binding.
    async fn get_or_create(&self, chat_id: &str) -> RelayResult<String>;

    async fn set_session_id(&self, chat_id: &str, session_id: &str) -> RelayResult<()>;

    async fn delete(&self, chat_id: &str) -> RelayResult<()>;

    /// Remove bindings idle for more than `max_age_days`. Returns how many were removed.
    async fn cleanup(&self, max_age_days: u32) -> RelayResult<usize>;

    async fn all(&self) -> RelayResult<BTreeMap<String, ChatBinding>>;
}
