//! Long-connection event delivery.
//!
//! The bot asks the platform for a WebSocket URL, then receives events as
//! protobuf [`Frame`]s. Data frames are acknowledged once their (possibly
//! multi-part) payload is complete; the client pings on the interval the
//! server hands out and reconnects with exponential backoff.

use super::LarkClient;
use super::event::{LarkEvent, parse_event};
use super::frame::{
    Frame, HEADER_MESSAGE_ID, HEADER_SEQ, HEADER_SUM, METHOD_CONTROL, METHOD_DATA,
    PayloadAssembler, TYPE_EVENT, TYPE_PONG,
};
use crate::bus::InboundMessage;
use crate::errors::{RelayError, RelayResult};
use crate::utils::http::exponential_backoff_delay;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);
const FRAGMENT_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientConfig {
    #[serde(default)]
    pub reconnect_count: i64,
    #[serde(default)]
    pub reconnect_interval: u64,
    #[serde(default)]
    pub reconnect_nonce: u64,
    #[serde(default)]
    pub ping_interval: u64,
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    pub service_id: i32,
    pub config: ClientConfig,
}

#[derive(Deserialize)]
struct EndpointData {
    #[serde(rename = "URL", default)]
    url: String,
    #[serde(rename = "ClientConfig", default)]
    client_config: ClientConfig,
}

/// Read `service_id` from the query string of the WebSocket URL.
pub fn service_id_from_url(raw: &str) -> i32 {
    url::Url::parse(raw)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "service_id")
                .and_then(|(_, v)| v.parse().ok())
        })
        .unwrap_or(0)
}

/// Decodes frames into inbound messages and builds the replies to send back.
pub struct FrameHandler {
    assembler: PayloadAssembler,
    inbound_tx: mpsc::Sender<InboundMessage>,
    verification_token: Option<String>,
    ping_interval: Duration,
}

/// What the connection loop should do after a frame.
pub enum FrameOutcome {
    Nothing,
    Reply(Box<Frame>),
    /// The consumer of inbound messages has gone away.
    Shutdown,
}

impl FrameHandler {
    pub fn new(
        inbound_tx: mpsc::Sender<InboundMessage>,
        verification_token: Option<String>,
        ping_interval: Duration,
    ) -> Self {
        Self {
            assembler: PayloadAssembler::new(FRAGMENT_TTL),
            inbound_tx,
            verification_token,
            ping_interval,
        }
    }

    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    pub async fn handle(&mut self, frame: Frame) -> FrameOutcome {
        match frame.method {
            METHOD_CONTROL => {
                self.handle_control(&frame);
                FrameOutcome::Nothing
            }
            METHOD_DATA => self.handle_data(frame).await,
            other => {
                debug!("ignoring frame with unknown method {}", other);
                FrameOutcome::Nothing
            }
        }
    }

    fn handle_control(&mut self, frame: &Frame) {
        if frame.frame_type() != TYPE_PONG {
            return;
        }
        let Some(payload) = frame.payload.as_deref() else {
            return;
        };
        if let Ok(config) = serde_json::from_slice::<ClientConfig>(payload)
            && config.ping_interval > 0
        {
            let interval = Duration::from_secs(config.ping_interval);
            if interval != self.ping_interval {
                debug!("server set ping interval to {:?}", interval);
                self.ping_interval = interval;
            }
        }
    }

    async fn handle_data(&mut self, frame: Frame) -> FrameOutcome {
        let started = Instant::now();
        let message_id = frame.header(HEADER_MESSAGE_ID).unwrap_or_default().to_string();
        let sum = frame
            .header(HEADER_SUM)
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        let seq = frame
            .header(HEADER_SEQ)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let data = frame.payload.clone().unwrap_or_default();

        let Some(payload) = self.assembler.push(&message_id, sum, seq, data) else {
            return FrameOutcome::Nothing;
        };

        if frame.frame_type() == TYPE_EVENT {
            match serde_json::from_slice::<Value>(&payload) {
                Ok(body) => match parse_event(&body, self.verification_token.as_deref()) {
                    Ok(LarkEvent::Message(msg)) => {
                        if self.inbound_tx.send(*msg).await.is_err() {
                            return FrameOutcome::Shutdown;
                        }
                    }
                    Ok(LarkEvent::Other { event_type }) => {
                        debug!("ignoring event {}", event_type);
                    }
                    Ok(LarkEvent::UrlVerification { .. }) => {}
                    Err(e) => warn!("rejected long-connection event: {}", e),
                },
                Err(e) => warn!("event payload is not JSON: {}", e),
            }
        }

        FrameOutcome::Reply(Box::new(frame.ack(started.elapsed())))
    }
}

pub struct LongConnection {
    client: Arc<LarkClient>,
    inbound_tx: mpsc::Sender<InboundMessage>,
}

impl LongConnection {
    pub fn new(client: Arc<LarkClient>, inbound_tx: mpsc::Sender<InboundMessage>) -> Self {
        Self { client, inbound_tx }
    }

    /// Ask the platform for a WebSocket URL.
    pub async fn endpoint(&self) -> RelayResult<Endpoint> {
        let config = self.client.config();
        let url = format!(
            "{}/callback/ws/endpoint",
            config.domain.trim_end_matches('/')
        );
        let value: Value = self
            .client
            .http()
            .post(url)
            .header("locale", "zh")
            .json(&json!({"AppID": config.app_id, "AppSecret": config.app_secret}))
            .send()
            .await
            .map_err(|e| RelayError::transport(format!("endpoint request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| RelayError::transport(format!("invalid endpoint response: {}", e)))?;

        let code = value.get("code").and_then(Value::as_i64).unwrap_or(0);
        if code != 0 {
            let msg = value.get("msg").and_then(Value::as_str).unwrap_or("");
            return Err(RelayError::Transport(format!(
                "endpoint rejected (code {}): {}",
                code, msg
            )));
        }
        let data: EndpointData = serde_json::from_value(value.get("data").cloned().unwrap_or_default())
            .map_err(|e| RelayError::transport(format!("invalid endpoint data: {}", e)))?;
        if data.url.is_empty() {
            return Err(RelayError::transport("endpoint response has no URL"));
        }
        Ok(Endpoint {
            service_id: service_id_from_url(&data.url),
            url: data.url,
            config: data.client_config,
        })
    }

    /// Keep a connection open until the inbound receiver is dropped.
    pub async fn run(self) {
        let mut attempt = 0u32;
        loop {
            match self.connect_once().await {
                Ok(true) => {
                    info!("inbound channel closed, stopping long connection");
                    return;
                }
                Ok(false) => {
                    attempt = 0;
                    info!("long connection closed by server, reconnecting");
                }
                Err(e) => {
                    error!("long connection error: {}", e);
                    let delay = exponential_backoff_delay(attempt, 2, 60);
                    attempt = attempt.saturating_add(1);
                    warn!("retrying long connection in {} seconds...", delay);
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                }
            }
        }
    }

    /// One connection lifetime. `Ok(true)` means shut down for good.
    async fn connect_once(&self) -> RelayResult<bool> {
        let endpoint = self.endpoint().await?;
        let ping_interval = match endpoint.config.ping_interval {
            0 => DEFAULT_PING_INTERVAL,
            secs => Duration::from_secs(secs),
        };

        let (stream, _) = tokio_tungstenite::connect_async(endpoint.url.as_str())
            .await
            .map_err(|e| RelayError::transport(format!("WebSocket connect failed: {}", e)))?;
        info!("Lark long connection established");
        let (mut write, mut read) = stream.split();

        let mut handler = FrameHandler::new(
            self.inbound_tx.clone(),
            self.client.config().verification_token.clone(),
            ping_interval,
        );
        let mut ping = tokio::time::interval(ping_interval);
        ping.tick().await;

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    let frame = Frame::ping(endpoint.service_id);
                    write
                        .send(Message::Binary(frame.to_bytes().into()))
                        .await
                        .map_err(|e| RelayError::transport(format!("ping failed: {}", e)))?;
                }
                msg = read.next() => {
                    let Some(msg) = msg else {
                        return Ok(false);
                    };
                    match msg.map_err(|e| RelayError::transport(format!("WebSocket error: {}", e)))? {
                        Message::Binary(bytes) => {
                            let frame = match Frame::from_bytes(&bytes) {
                                Ok(f) => f,
                                Err(e) => {
                                    warn!("undecodable frame: {}", e);
                                    continue;
                                }
                            };
                            let before = handler.ping_interval();
                            match handler.handle(frame).await {
                                FrameOutcome::Nothing => {}
                                FrameOutcome::Reply(reply) => {
                                    write
                                        .send(Message::Binary(reply.to_bytes().into()))
                                        .await
                                        .map_err(|e| RelayError::transport(format!("ack failed: {}", e)))?;
                                }
                                FrameOutcome::Shutdown => return Ok(true),
                            }
                            if handler.ping_interval() != before {
                                ping = tokio::time::interval(handler.ping_interval());
                                ping.tick().await;
                            }
                        }
                        Message::Ping(data) => {
                            write
                                .send(Message::Pong(data))
                                .await
                                .map_err(|e| RelayError::transport(format!("pong failed: {}", e)))?;
                        }
                        Message::Close(_) => return Ok(false),
                        _ => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests;
