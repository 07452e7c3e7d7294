//! Feishu / Lark open platform.
//!
//! [`LarkClient`] wraps the REST API used for replies and metadata.
//! Inbound events arrive either as webhook posts ([`event`]) or over the
//! long connection ([`ws`]).

pub mod event;
pub mod frame;
pub mod ws;

use crate::channels::base::ChatTransport;
use crate::config::LarkConfig;
use crate::errors::{RelayError, RelayResult};
use crate::render::Card;
use crate::utils::http::default_http_client;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub use event::{EventRejection, LarkEvent, parse_event};
pub use ws::LongConnection;

/// Refresh the tenant token this long before the platform says it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    tenant_access_token: String,
    #[serde(default)]
    expire: u64,
}

/// Bot identity reported by `bot/v3/info`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotInfo {
    #[serde(default)]
    pub open_id: String,
    #[serde(default)]
    pub app_name: String,
}

pub struct LarkClient {
    config: LarkConfig,
    client: Client,
    token: Mutex<Option<CachedToken>>,
}

impl LarkClient {
    pub fn new(config: LarkConfig) -> Self {
        Self {
            config,
            client: default_http_client(),
            token: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LarkConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.domain.trim_end_matches('/'), path)
    }

    /// Tenant access token, fetched on first use and cached until near expiry.
    pub async fn tenant_token(&self) -> RelayResult<String> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref()
            && Instant::now() < cached.expires_at
        {
            return Ok(cached.value.clone());
        }

        debug!("refreshing Lark tenant access token");
        let resp: TokenResponse = self
            .client
            .post(self.url("/open-apis/auth/v3/tenant_access_token/internal"))
            .json(&json!({
                "app_id": self.config.app_id,
                "app_secret": self.config.app_secret,
            }))
            .send()
            .await
            .context("tenant token request failed")
            .map_err(transport)?
            .json()
            .await
            .context("invalid tenant token response")
            .map_err(transport)?;

        if resp.code != 0 || resp.tenant_access_token.is_empty() {
            return Err(RelayError::Transport(format!(
                "tenant token rejected (code {}): {}",
                resp.code, resp.msg
            )));
        }

        let ttl = Duration::from_secs(resp.expire).saturating_sub(TOKEN_REFRESH_MARGIN);
        let value = resp.tenant_access_token;
        *guard = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now() + ttl,
        });
        Ok(value)
    }

    /// Authorized call returning the decoded body. A non-zero `code` is an error.
    async fn api(&self, method: Method, path: &str, body: Option<Value>) -> RelayResult<Value> {
        let token = self.tenant_token().await?;
        let mut req = self
            .client
            .request(method, self.url(path))
            .bearer_auth(token);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("request to {} failed", path))
            .map_err(transport)?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .with_context(|| format!("failed to read response from {}", path))
            .map_err(transport)?;
        let value: Value = serde_json::from_str(&text).map_err(|_| {
            RelayError::Transport(format!(
                "{} returned HTTP {} with a non-JSON body",
                path,
                status.as_u16()
            ))
        })?;
        check_code(path, &value)?;
        if !status.is_success() {
            return Err(RelayError::Transport(format!(
                "{} returned HTTP {}",
                path,
                status.as_u16()
            )));
        }
        Ok(value)
    }

    pub async fn bot_info(&self) -> RelayResult<BotInfo> {
        let value = self.api(Method::GET, "/open-apis/bot/v3/info", None).await?;
        let bot: BotInfo = serde_json::from_value(value.get("bot").cloned().unwrap_or_default())
            .map_err(|e| RelayError::transport(format!("invalid bot info: {}", e)))?;
        info!("Lark bot identity: {} ({})", bot.app_name, bot.open_id);
        Ok(bot)
    }
}

fn transport(e: anyhow::Error) -> RelayError {
    RelayError::transport(format!("{:#}", e))
}

fn check_code(path: &str, value: &Value) -> RelayResult<()> {
    let code = value.get("code").and_then(Value::as_i64).unwrap_or(0);
    if code == 0 {
        return Ok(());
    }
    let msg = value.get("msg").and_then(Value::as_str).unwrap_or("");
    Err(RelayError::Transport(format!(
        "{} failed (code {}): {}",
        path, code, msg
    )))
}

fn message_id_of(value: &Value) -> String {
    value
        .pointer("/data/message_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl ChatTransport for LarkClient {
    async fn send_message(&self, chat_id: &str, card: &Card) -> RelayResult<String> {
        let body = json!({
            "receive_id": chat_id,
            "msg_type": "interactive",
            "content": card.to_content(),
        });
        let value = self
            .api(
                Method::POST,
                "/open-apis/im/v1/messages?receive_id_type=chat_id",
                Some(body),
            )
            .await?;
        Ok(message_id_of(&value))
    }

    async fn reply_to_message(&self, message_id: &str, card: &Card) -> RelayResult<String> {
        let body = json!({
            "msg_type": "interactive",
            "content": card.to_content(),
            "reply_in_thread": false,
        });
        let path = format!("/open-apis/im/v1/messages/{}/reply", message_id);
        let value = self.api(Method::POST, &path, Some(body)).await?;
        Ok(message_id_of(&value))
    }

    async fn get_chat_metadata(&self, chat_id: &str) -> RelayResult<Option<String>> {
        let path = format!("/open-apis/im/v1/chats/{}?user_id_type=open_id", chat_id);
        let value = self.api(Method::GET, &path, None).await?;
        Ok(value
            .pointer("/data/name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }

    async fn get_user_metadata(&self, user_id: &str) -> RelayResult<Option<String>> {
        let path = format!(
            "/open-apis/contact/v3/users/{}?user_id_type=open_id&department_id_type=open_department_id",
            user_id
        );
        let value = self.api(Method::GET, &path, None).await?;
        Ok(value
            .pointer("/data/user/name")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }

    async fn add_reaction(&self, message_id: &str, emoji: &str) -> RelayResult<()> {
        let path = format!("/open-apis/im/v1/messages/{}/reactions", message_id);
        self.api(
            Method::POST,
            &path,
            Some(json!({"reaction_type": {"emoji_type": emoji}})),
        )
        .await?;
        Ok(())
    }
}
