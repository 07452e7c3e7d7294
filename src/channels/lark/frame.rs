//! Binary frames exchanged over the long connection.

use prost::Message;
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const METHOD_CONTROL: i32 = 0;
pub const METHOD_DATA: i32 = 1;

pub const HEADER_TYPE: &str = "type";
pub const HEADER_MESSAGE_ID: &str = "message_id";
pub const HEADER_SUM: &str = "sum";
pub const HEADER_SEQ: &str = "seq";
pub const HEADER_BIZ_RT: &str = "biz_rt";

pub const TYPE_PING: &str = "ping";
pub const TYPE_PONG: &str = "pong";
pub const TYPE_EVENT: &str = "event";

#[derive(Clone, PartialEq, Message)]
pub struct Header {
    #[prost(string, required, tag = "1")]
    pub key: String,
    #[prost(string, required, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Frame {
    #[prost(uint64, required, tag = "1")]
    pub seq_id: u64,
    #[prost(uint64, required, tag = "2")]
    pub log_id: u64,
    #[prost(int32, required, tag = "3")]
    pub service: i32,
    #[prost(int32, required, tag = "4")]
    pub method: i32,
    #[prost(message, repeated, tag = "5")]
    pub headers: Vec<Header>,
    #[prost(string, optional, tag = "6")]
    pub payload_encoding: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub payload_type: Option<String>,
    #[prost(bytes = "vec", optional, tag = "8")]
    pub payload: Option<Vec<u8>>,
    #[prost(string, optional, tag = "9")]
    pub log_id_new: Option<String>,
}

impl Frame {
    pub fn ping(service_id: i32) -> Self {
        Self {
            service: service_id,
            method: METHOD_CONTROL,
            headers: vec![Header {
                key: HEADER_TYPE.into(),
                value: TYPE_PING.into(),
            }],
            ..Default::default()
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key == key)
            .map(|h| h.value.as_str())
    }

    pub fn frame_type(&self) -> &str {
        self.header(HEADER_TYPE).unwrap_or_default()
    }

    pub fn set_header(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(h) = self.headers.iter_mut().find(|h| h.key == key) {
            h.value = value;
        } else {
            self.headers.push(Header {
                key: key.to_string(),
                value,
            });
        }
    }

    /// The acknowledgement for a data frame: same frame, `{"code":200}` payload.
    pub fn ack(&self, elapsed: Duration) -> Self {
        let mut ack = self.clone();
        ack.set_header(HEADER_BIZ_RT, elapsed.as_millis().to_string());
        ack.payload = Some(br#"{"code":200}"#.to_vec());
        ack
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, prost::DecodeError> {
        Self::decode(bytes)
    }
}

/// Collects the parts of payloads split across several data frames.
pub struct PayloadAssembler {
    pending: HashMap<String, Pending>,
    ttl: Duration,
}

struct Pending {
    parts: Vec<Option<Vec<u8>>>,
    started: Instant,
}

impl PayloadAssembler {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            ttl,
        }
    }

    /// Add one part. Returns the full payload once every part has arrived.
    ///
    /// Single-part payloads (`sum` of 1 or absent) are returned immediately.
    pub fn push(&mut self, message_id: &str, sum: usize, seq: usize, data: Vec<u8>) -> Option<Vec<u8>> {
        if sum <= 1 {
            return Some(data);
        }
        if seq >= sum {
            return None;
        }

        let now = Instant::now();
        let ttl = self.ttl;
        self.pending.retain(|_, p| now.duration_since(p.started) < ttl);

        let entry = self
            .pending
            .entry(message_id.to_string())
            .or_insert_with(|| Pending {
                parts: vec![None; sum],
                started: now,
            });
        if entry.parts.len() != sum {
            entry.parts = vec![None; sum];
        }
        entry.parts[seq] = Some(data);

        if entry.parts.iter().all(Option::is_some) {
            let parts = self.pending.remove(message_id)?.parts;
            return Some(parts.into_iter().flatten().flatten().collect());
        }
        None
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
