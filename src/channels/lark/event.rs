use crate::bus::{ChatType, InboundMessage, Mention};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

pub const MESSAGE_RECEIVE_EVENT: &str = "im.message.receive_v1";

/// What an inbound event envelope turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum LarkEvent {
    /// Endpoint ownership check; answer with the challenge.
    UrlVerification { challenge: String },
    Message(Box<InboundMessage>),
    /// Anything we don't act on.
    Other { event_type: String },
}

/// Why an event envelope was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventRejection {
    #[error(
        "encrypted event payloads are not supported; clear the Encrypt Key in the app console"
    )]
    Encrypted,
    #[error("event verification token mismatch")]
    TokenMismatch,
    #[error("malformed message event: {0}")]
    Malformed(String),
}

#[derive(Deserialize, Default)]
struct UserId {
    #[serde(default)]
    open_id: String,
}

#[derive(Deserialize)]
struct WireSender {
    #[serde(default)]
    sender_id: UserId,
}

#[derive(Deserialize)]
struct WireMention {
    #[serde(default)]
    key: String,
    #[serde(default)]
    id: UserId,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    chat_id: String,
    #[serde(default)]
    chat_type: String,
    #[serde(default)]
    message_type: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    mentions: Vec<WireMention>,
}

#[derive(Deserialize)]
struct WireMessageEvent {
    sender: Option<WireSender>,
    message: Option<WireMessage>,
}

/// Pull the text out of a message `content` string (`{"text": "..."}`).
/// Content that isn't JSON is taken as the text itself.
pub fn parse_content(content: &str) -> String {
    match serde_json::from_str::<Value>(content) {
        Ok(v) => v
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Err(_) => content.to_string(),
    }
}

fn check_token(expected: Option<&str>, got: Option<&str>) -> Result<(), EventRejection> {
    match expected {
        Some(expected) if !expected.is_empty() && got != Some(expected) => {
            Err(EventRejection::TokenMismatch)
        }
        _ => Ok(()),
    }
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// Classify a decoded event body.
///
/// Encrypted bodies are rejected. When `verification_token` is set, the
/// envelope's token must match it.
pub fn parse_event(
    body: &Value,
    verification_token: Option<&str>,
) -> Result<LarkEvent, EventRejection> {
    if body.get("encrypt").is_some() {
        return Err(EventRejection::Encrypted);
    }

    if str_at(body, "/type") == Some("url_verification") {
        check_token(verification_token, str_at(body, "/token"))?;
        let challenge = str_at(body, "/challenge").unwrap_or_default().to_string();
        return Ok(LarkEvent::UrlVerification { challenge });
    }

    // Schema 2.0 keeps metadata under `header`; 1.0 envelopes are not acted on.
    let Some(header) = body.get("header") else {
        check_token(verification_token, str_at(body, "/token"))?;
        let event_type = str_at(body, "/event/type").unwrap_or_default().to_string();
        debug!("ignoring schema 1.0 event {}", event_type);
        return Ok(LarkEvent::Other { event_type });
    };
    check_token(verification_token, str_at(header, "/token"))?;

    let event_type = str_at(header, "/event_type").unwrap_or_default().to_string();
    if event_type != MESSAGE_RECEIVE_EVENT {
        return Ok(LarkEvent::Other { event_type });
    }

    let event: WireMessageEvent = serde_json::from_value(body.get("event").cloned().unwrap_or_default())
        .map_err(|e| EventRejection::Malformed(e.to_string()))?;
    let Some(message) = event.message else {
        debug!("message event without a message body");
        return Ok(LarkEvent::Other { event_type });
    };

    Ok(LarkEvent::Message(Box::new(InboundMessage {
        event_id: str_at(header, "/event_id").unwrap_or_default().to_string(),
        chat_id: message.chat_id,
        chat_type: ChatType::from_platform(&message.chat_type),
        message_id: message.message_id,
        text: parse_content(&message.content),
        message_type: message.message_type,
        mentions: message
            .mentions
            .into_iter()
            .map(|m| Mention {
                key: m.key,
                open_id: m.id.open_id,
                name: m.name,
            })
            .collect(),
        sender_id: event.sender.map(|s| s.sender_id.open_id).unwrap_or_default(),
    })))
}
