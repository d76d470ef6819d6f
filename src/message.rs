use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `{event, channel?, data}` envelope exchanged with a transport.
///
/// The same shape is used for outbound requests (subscribe, whispers) and
/// inbound deliveries, which is what the Pusher protocol puts on the wire and
/// what a Socket.io adapter receives as `(channel, data)` for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            channel: None,
            data,
        }
    }

    pub fn on_channel(event: impl Into<String>, channel: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            channel: Some(channel.into()),
            data,
        }
    }

    /// Pusher servers encode `data` as a JSON string; unwrap it when possible.
    pub(crate) fn decode_data(mut self) -> Self {
        if let Value::String(raw) = &self.data {
            if let Ok(decoded) = serde_json::from_str::<Value>(raw) {
                self.data = decoded;
            }
        }
        self
    }
}

/// Connection data received after establishing connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionData {
    pub socket_id: String,
    #[serde(default)]
    pub activity_timeout: Option<u64>,
}

/// Error data structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub code: Option<u32>,
    pub message: String,
}

/// Subscribe message structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SubscribeMessage {
    pub event: String,
    pub data: SubscribeData,
}

/// Subscribe data structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SubscribeData {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
}
