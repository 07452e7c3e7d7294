use crate::errors::RelayResult;
use crate::render::Card;
use async_trait::async_trait;

/// Outbound side of a chat platform.
///
/// The message-sending calls return the platform id of the created message.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, chat_id: &str, card: &Card) -> RelayResult<String>;

    /// Reply to `message_id` in the same conversation (not in a thread).
    async fn reply_to_message(&self, message_id: &str, card: &Card) -> RelayResult<String>;

    /// Display name of a chat, if the platform reports one.
    async fn get_chat_metadata(&self, chat_id: &str) -> RelayResult<Option<String>>;

    /// Display name of a user, if the platform reports one.
    async fn get_user_metadata(&self, user_id: &str) -> RelayResult<Option<String>>;

    async fn add_reaction(&self, message_id: &str, emoji: &str) -> RelayResult<()>;
}
