use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::channel::listeners::ListenerTable;
use crate::channel::{
    CLIENT_EVENT_PREFIX, Callback, Channel, EventCallback, ListenToAll, PresenceChannel,
    PrivateChannel,
};
use crate::formatter::EventFormatter;
use crate::message::Frame;
use crate::options::EchoOptions;
use crate::transport::{ALL_EVENTS, HandlerId, Transport};

pub const SUBSCRIBE_EVENT: &str = "pusher:subscribe";
pub const UNSUBSCRIBE_EVENT: &str = "pusher:unsubscribe";
pub const SUBSCRIPTION_SUCCEEDED_EVENT: &str = "pusher:subscription_succeeded";
pub const SUBSCRIPTION_ERROR_EVENT: &str = "pusher:subscription_error";
pub const MEMBER_ADDED_EVENT: &str = "pusher:member_added";
pub const MEMBER_REMOVED_EVENT: &str = "pusher:member_removed";

/// A channel on a Pusher-protocol connection (Pusher, Reverb).
///
/// Serves public, private and presence channels alike; the connector hands
/// it out behind the trait matching the requested visibility.
pub struct PusherChannel {
    name: String,
    transport: Arc<dyn Transport>,
    formatter: EventFormatter,
    listeners: ListenerTable,
    global: Mutex<Vec<(EventCallback, HandlerId)>>,
}

impl PusherChannel {
    pub fn new(transport: Arc<dyn Transport>, name: &str, options: &EchoOptions) -> Self {
        Self {
            name: name.to_string(),
            listeners: ListenerTable::new(name, Arc::clone(&transport)),
            transport,
            formatter: EventFormatter::new(options.namespace.as_deref()),
            global: Mutex::new(Vec::new()),
        }
    }

    fn send(&self, frame: Frame) {
        if let Err(e) = self.transport.send(frame) {
            warn!("Failed to send frame for channel {}: {}", self.name, e);
        }
    }
}

fn member_info(member: &Value) -> Value {
    member.get("info").cloned().unwrap_or(Value::Null)
}

impl Channel for PusherChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(&self) {
        debug!("Subscribing to {}", self.name);
        self.send(Frame::new(SUBSCRIBE_EVENT, json!({ "channel": self.name })));
    }

    fn unsubscribe(&self) {
        self.unbind();
        debug!("Unsubscribing from {}", self.name);
        self.send(Frame::new(UNSUBSCRIBE_EVENT, json!({ "channel": self.name })));
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
        self.listeners.on(SUBSCRIPTION_SUCCEEDED_EVENT, callback);
        self
    }

    fn error(&self, callback: Callback) -> &dyn Channel {
        self.listeners.on(SUBSCRIPTION_ERROR_EVENT, callback);
        self
    }

    fn unbind(&self) {
        self.listeners.unbind();
        self.stop_listening_to_all(None);
    }

    fn as_listen_to_all(&self) -> Option<&dyn ListenToAll> {
        Some(self)
    }
}

impl PrivateChannel for PusherChannel {
    fn whisper(&self, event: &str, data: Value) -> &dyn PrivateChannel {
        self.send(Frame::on_channel(
            format!("{CLIENT_EVENT_PREFIX}{event}"),
            self.name.as_str(),
            data,
        ));
        self
    }
}

impl PresenceChannel for PusherChannel {
    fn here(&self, callback: Callback) -> &dyn PresenceChannel {
        self.listeners.on(
            SUBSCRIPTION_SUCCEEDED_EVENT,
            Arc::new(move |data: &Value| {
                let members = data
                    .get("members")
                    .and_then(Value::as_object)
                    .map(|members| members.values().cloned().collect())
                    .unwrap_or_default();
                callback(&Value::Array(members));
            }),
        );
        self
    }

    fn joining(&self, callback: Callback) -> &dyn PresenceChannel {
        self.listeners.on(
            MEMBER_ADDED_EVENT,
            Arc::new(move |member: &Value| callback(&member_info(member))),
        );
        self
    }

    fn leaving(&self, callback: Callback) -> &dyn PresenceChannel {
        self.listeners.on(
            MEMBER_REMOVED_EVENT,
            Arc::new(move |member: &Value| callback(&member_info(member))),
        );
        self
    }
}

impl ListenToAll for PusherChannel {
    fn listen_to_all(&self, callback: EventCallback) {
        let channel = self.name.clone();
        let formatter = self.formatter.clone();
        let cb = Arc::clone(&callback);

        let id = self.transport.on(
            ALL_EVENTS,
            Arc::new(move |frame: &Frame| {
                if frame.channel.as_deref() != Some(channel.as_str())
                    || frame.event.starts_with("pusher:")
                    || frame.event.starts_with("pusher_internal:")
                {
                    return;
                }
                cb(&formatter.strip(&frame.event), &frame.data);
            }),
        );

        self.global
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((callback, id));
    }

    fn stop_listening_to_all(&self, callback: Option<&EventCallback>) {
        let removed: Vec<HandlerId> = {
            let mut global = self.global.lock().unwrap_or_else(PoisonError::into_inner);
            let (removed, kept): (Vec<_>, Vec<_>) = global
                .drain(..)
                .partition(|(cb, _)| callback.is_none_or(|target| Arc::ptr_eq(cb, target)));
            *global = kept;
            removed.into_iter().map(|(_, id)| id).collect()
        };

        for id in removed {
            self.transport.remove_listener(ALL_EVENTS, id);
        }
    }
}
