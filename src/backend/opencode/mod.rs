use crate::backend::{AssistantInfo, BackendClient, PromptResponse};
use crate::bus::ChatInfo;
use crate::config::OpencodeConfig;
use crate::errors::{RelayError, RelayResult};
use crate::render::{ResponseFragment, ToolStatus, Usage};
use crate::utils::http::http_client;
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sent once per new session. The `feishu` tool it names is an OpenCode
/// plugin installed on the server side, not part of this crate.
pub const SYSTEM_PROMPT: &str = "You are an AI assistant integrated with Feishu/Lark.
You can access chat history using the 'feishu' tool to get context.

When users ask about recent messages, use the feishu tool to retrieve them.
Always include sender information when referencing messages.

You are working in a collaborative environment. Be helpful, concise, and provide clear answers.";

/// REST client for an OpenCode server.
pub struct OpencodeClient {
    base_url: String,
    client: Client,
    auth: Option<(String, String)>,
    system_prompt: String,
}

impl OpencodeClient {
    pub fn new(config: &OpencodeConfig) -> Self {
        Self {
            base_url: config.host.trim_end_matches('/').to_string(),
            client: http_client(config.timeout()),
            auth: config.basic_auth(),
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    /// Unauthenticated client against `base_url`, used by tests.
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client(timeout),
            auth: None,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.auth = Some((username.to_string(), password.to_string()));
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.auth {
            Some((user, pass)) => req.basic_auth(user, Some(pass)),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> RelayResult<reqwest::Response> {
        let resp = req
            .send()
            .await
            .map_err(|e| RelayError::backend(format!("{} failed: {}", what, e)))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(RelayError::backend(format!(
            "{} failed: HTTP {}: {}",
            what,
            status.as_u16(),
            body.trim()
        )))
    }

    async fn post_message(
        &self,
        session_id: &str,
        text: &str,
        no_reply: bool,
    ) -> RelayResult<reqwest::Response> {
        let mut body = json!({
            "parts": [{"type": "text", "text": text}],
        });
        if no_reply {
            body["noReply"] = json!(true);
        }
        let req = self
            .request(Method::POST, &format!("/session/{}/message", session_id))
            .json(&body);
        self.send(req, "send prompt").await
    }
}

#[derive(Deserialize)]
struct WireSession {
    #[serde(default)]
    id: String,
}

#[derive(Deserialize)]
struct WireReply {
    info: Option<WireInfo>,
    parts: Option<Vec<WirePart>>,
}

#[derive(Deserialize)]
struct WireInfo {
    #[serde(rename = "modelID", default)]
    model_id: String,
    tokens: Option<WireTokens>,
    cost: Option<f64>,
    time: Option<WireTime>,
}

#[derive(Deserialize)]
struct WireTokens {
    #[serde(default)]
    input: u64,
    #[serde(default)]
    output: u64,
}

#[derive(Deserialize)]
struct WireTime {
    created: Option<u64>,
    completed: Option<u64>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WirePart {
    Text {
        #[serde(default)]
        text: String,
    },
    Reasoning {
        #[serde(default)]
        text: String,
    },
    Tool {
        #[serde(default)]
        tool: String,
        state: Option<WireToolState>,
    },
    File {
        filename: Option<String>,
        url: Option<String>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct WireToolState {
    #[serde(default)]
    status: String,
    output: Option<String>,
    error: Option<String>,
}

impl WirePart {
    fn into_fragment(self) -> Option<ResponseFragment> {
        match self {
            Self::Text { text } => Some(ResponseFragment::Text(text)),
            Self::Reasoning { text } => Some(ResponseFragment::Reasoning(text)),
            Self::Tool { tool, state } => {
                let state = state.unwrap_or(WireToolState {
                    status: String::new(),
                    output: None,
                    error: None,
                });
                Some(ResponseFragment::ToolInvocation {
                    name: tool,
                    status: ToolStatus::from_wire(&state.status),
                    output: state.output,
                    error: state.error,
                })
            }
            Self::File { filename, url } => Some(ResponseFragment::FileRef { filename, url }),
            Self::Other => None,
        }
    }
}

impl WireInfo {
    fn into_info(self) -> AssistantInfo {
        let elapsed = self.time.and_then(|t| match (t.created, t.completed) {
            (Some(created), Some(completed)) if completed >= created => {
                Some(Duration::from_millis(completed - created))
            }
            _ => None,
        });
        AssistantInfo {
            model_id: self.model_id,
            usage: self.tokens.map(|t| Usage {
                input_tokens: t.input,
                output_tokens: t.output,
                cost: self.cost,
                elapsed,
            }),
        }
    }
}

/// Decode a `POST /session/{id}/message` reply body.
pub fn decode_reply(body: &str) -> RelayResult<PromptResponse> {
    if body.trim().is_empty() {
        return Err(RelayError::backend("No response from OpenCode"));
    }
    let reply: WireReply = serde_json::from_str(body)
        .map_err(|e| RelayError::backend(format!("invalid OpenCode response: {}", e)))?;
    if reply.info.is_none() && reply.parts.is_none() {
        return Err(RelayError::backend(
            "OpenCode returned empty or invalid response. Check server configuration.",
        ));
    }
    Ok(PromptResponse {
        info: reply.info.map(WireInfo::into_info),
        fragments: reply
            .parts
            .unwrap_or_default()
            .into_iter()
            .filter_map(WirePart::into_fragment)
            .collect(),
    })
}

#[async_trait]
impl BackendClient for OpencodeClient {
    async fn create_session(&self, chat: &ChatInfo) -> RelayResult<String> {
        let req = self
            .request(Method::POST, "/session")
            .json(&json!({"title": chat.title()}));
        let resp = self.send(req, "create session").await?;
        let session: WireSession = resp
            .json()
            .await
            .map_err(|e| RelayError::backend(format!("invalid create session response: {}", e)))?;
        if session.id.is_empty() {
            return Err(RelayError::backend(
                "Failed to create session: No data returned",
            ));
        }
        info!("created OpenCode session {} for chat {}", session.id, chat.chat_id);

        self.send_system_prompt(&session.id, &self.system_prompt)
            .await?;
        Ok(session.id)
    }

    async fn send_system_prompt(&self, session_id: &str, text: &str) -> RelayResult<()> {
        self.post_message(session_id, text, true).await?;
        debug!("system prompt set for session {}", session_id);
        Ok(())
    }

    async fn send_prompt(&self, session_id: &str, text: &str) -> RelayResult<PromptResponse> {
        debug!("sending prompt to session {}", session_id);
        let resp = self.post_message(session_id, text, false).await?;
        let body = resp
            .text()
            .await
            .map_err(|e| RelayError::backend(format!("failed to read response: {}", e)))?;
        decode_reply(&body)
    }

    async fn delete_session(&self, session_id: &str) -> RelayResult<bool> {
        let resp = self
            .request(Method::DELETE, &format!("/session/{}", session_id))
            .send()
            .await
            .map_err(|e| RelayError::backend(format!("delete session failed: {}", e)))?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => {
                let confirmed = resp
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                Ok(confirmed)
            }
            s => Err(RelayError::backend(format!(
                "delete session failed: HTTP {}",
                s.as_u16()
            ))),
        }
    }

    async fn health_check(&self) -> bool {
        match self.send(self.request(Method::GET, "/session"), "health check").await {
            Ok(_) => true,
            Err(e) => {
                warn!("OpenCode health check failed: {}", e);
                false
            }
        }
    }
}
