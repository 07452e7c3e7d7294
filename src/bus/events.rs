use serde::{Deserialize, Serialize};

/// Whether a conversation is one-to-one with the bot or a multi-member group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Direct,
    Group,
}

impl ChatType {
    /// Map the platform's `chat_type` field (`p2p`, `group`, `topic_group`, ...).
    pub fn from_platform(raw: &str) -> Self {
        if raw == "p2p" {
            Self::Direct
        } else {
            Self::Group
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "p2p",
            Self::Group => "group",
        }
    }
}

/// A structured mention attached to a message. `key` is the marker that
/// appears in the text (`@_user_1`), `open_id` the mentioned user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub key: String,
    pub open_id: String,
    pub name: String,
}

/// Normalized view of one platform message event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub event_id: String,
    pub chat_id: String,
    pub chat_type: ChatType,
    pub message_id: String,
    /// Platform message type (`text`, `image`, `post`, ...).
    pub message_type: String,
    pub text: String,
    pub mentions: Vec<Mention>,
    pub sender_id: String,
}

impl InboundMessage {
    pub fn is_text(&self) -> bool {
        self.message_type == "text"
    }
}

/// Chat context handed to commands and to backend session creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInfo {
    pub chat_id: String,
    pub chat_type: ChatType,
    pub sender_id: String,
    pub chat_name: Option<String>,
    pub sender_name: Option<String>,
}

impl ChatInfo {
    pub fn from_message(msg: &InboundMessage) -> Self {
        Self {
            chat_id: msg.chat_id.clone(),
            chat_type: msg.chat_type,
            sender_id: msg.sender_id.clone(),
            chat_name: None,
            sender_name: None,
        }
    }

    /// Human-readable label used as the backend session title.
    pub fn title(&self) -> String {
        match (self.chat_type, &self.chat_name, &self.sender_name) {
            (ChatType::Group, Some(chat), _) => format!("Lark: {}", chat),
            (_, _, Some(sender)) => format!("Lark: {}", sender),
            _ => format!("Lark: {}", self.chat_id),
        }
    }
}
