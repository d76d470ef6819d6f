use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::channel::listeners::ListenerTable;
use crate::channel::{CLIENT_EVENT_PREFIX, Callback, Channel, PresenceChannel, PrivateChannel};
use crate::formatter::EventFormatter;
use crate::message::Frame;
use crate::options::EchoOptions;
use crate::transport::Transport;

pub const SUBSCRIBE_EVENT: &str = "subscribe";
pub const UNSUBSCRIBE_EVENT: &str = "unsubscribe";
pub const CONNECT_EVENT: &str = "connect";
pub const CLIENT_EVENT: &str = "client event";
pub const PRESENCE_SUBSCRIBED_EVENT: &str = "presence:subscribed";
pub const PRESENCE_JOINING_EVENT: &str = "presence:joining";
pub const PRESENCE_LEAVING_EVENT: &str = "presence:leaving";

/// A channel on a Socket.io connection.
pub struct SocketIoChannel {
    name: String,
    transport: Arc<dyn Transport>,
    auth: Value,
    formatter: EventFormatter,
    listeners: ListenerTable,
}

impl SocketIoChannel {
    pub fn new(transport: Arc<dyn Transport>, name: &str, options: &EchoOptions) -> Self {
        Self {
            name: name.to_string(),
            listeners: ListenerTable::new(name, Arc::clone(&transport)),
            transport,
            auth: options.auth.to_value(),
            formatter: EventFormatter::new(options.namespace.as_deref()),
        }
    }

    fn emit(&self, event: &str, data: Value) {
        if let Err(e) = self.transport.send(Frame::new(event, data)) {
            warn!("Failed to emit {} for channel {}: {}", event, self.name, e);
        }
    }
}

fn user_info(member: &Value) -> Value {
    member.get("user_info").cloned().unwrap_or(Value::Null)
}

impl Channel for SocketIoChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(&self) {
        debug!("Subscribing to {}", self.name);
        self.emit(
            SUBSCRIBE_EVENT,
            json!({ "channel": self.name, "auth": self.auth }),
        );
    }

    fn unsubscribe(&self) {
        self.unbind();
        debug!("Unsubscribing from {}", self.name);
        self.emit(
            UNSUBSCRIBE_EVENT,
            json!({ "channel": self.name, "auth": self.auth }),
        );
    }

    fn listen(&self, event: &str, callback: Callback) -> &dyn Channel {
        self.listeners.on(&self.formatter.format(event), callback);
        self
    }

    fn stop_listening(&self, event: &str, callback: Option<&Callback>) -> &dyn Channel {
        self.listeners
            .unbind_event(&self.formatter.format(event), callback);
        self
    }

    fn subscribed(&self, callback: Callback) -> &dyn Channel {
        // socket-level connect, not addressed to a channel
        self.listeners.on_connection(CONNECT_EVENT, callback);
        self
    }

    /// Socket.io reports no channel-level errors.
    fn error(&self, _callback: Callback) -> &dyn Channel {
        self
    }

    fn unbind(&self) {
        self.listeners.unbind();
    }
}

impl PrivateChannel for SocketIoChannel {
    fn whisper(&self, event: &str, data: Value) -> &dyn PrivateChannel {
        self.emit(
            CLIENT_EVENT,
            json!({
                "channel": self.name,
                "event": format!("{CLIENT_EVENT_PREFIX}{event}"),
                "data": data,
            }),
        );
        self
    }
}

impl PresenceChannel for SocketIoChannel {
    fn here(&self, callback: Callback) -> &dyn PresenceChannel {
        self.listeners.on(
            PRESENCE_SUBSCRIBED_EVENT,
            Arc::new(move |members: &Value| {
                let members = members
                    .as_array()
                    .map(|members| members.iter().map(user_info).collect())
                    .unwrap_or_default();
                callback(&Value::Array(members));
            }),
        );
        self
    }

    fn joining(&self, callback: Callback) -> &dyn PresenceChannel {
        self.listeners.on(
            PRESENCE_JOINING_EVENT,
            Arc::new(move |member: &Value| callback(&user_info(member))),
        );
        self
    }

    fn leaving(&self, callback: Callback) -> &dyn PresenceChannel {
        self.listeners.on(
            PRESENCE_LEAVING_EVENT,
            Arc::new(move |member: &Value| callback(&user_info(member))),
        );
        self
    }
}
