//! Channel contracts and their per-transport implementations.
//!
//! A channel is obtained from a [`Connector`](crate::Connector) and shared
//! behind an `Arc`; every method takes `&self` and returns the channel again
//! so calls can be chained.

use std::sync::Arc;

use serde_json::Value;

mod listeners;
pub mod null;
pub mod pusher;
pub mod socketio;

pub use null::NullChannel;
pub use pusher::PusherChannel;
pub use socketio::SocketIoChannel;

/// Callback for an event payload.
pub type Callback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Callback receiving the event name along with the payload.
pub type EventCallback = Arc<dyn Fn(&str, &Value) + Send + Sync>;

pub const PRIVATE_PREFIX: &str = "private-";
pub const PRESENCE_PREFIX: &str = "presence-";
pub const CLIENT_EVENT_PREFIX: &str = "client-";

/// Laravel's database notification broadcast event.
pub const NOTIFICATION_EVENT: &str =
    ".Illuminate\\Notifications\\Events\\BroadcastNotificationCreated";

/// Wrap a closure as a [`Callback`].
///
/// Keep a clone of the returned `Arc` to pass to `stop_listening` later;
/// callbacks are matched by identity.
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as an [`EventCallback`].
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(&str, &Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A named subscription scope delivering server events.
pub trait Channel: Send + Sync {
    /// Wire name, including any `private-` / `presence-` prefix.
    fn name(&self) -> &str;

    /// Send the subscribe request. Safe to repeat.
    fn subscribe(&self);

    /// Unbind every handler and send the unsubscribe request.
    fn unsubscribe(&self);

    /// Listen for `event`, namespaced through the channel's formatter.
    fn listen(&self, event: &str, callback: Callback) -> &dyn Channel;

    /// Remove `callback` from `event`, or every callback when `None`.
    fn stop_listening(&self, event: &str, callback: Option<&Callback>) -> &dyn Channel;

    /// Called whenever the transport confirms the subscription.
    fn subscribed(&self, callback: Callback) -> &dyn Channel;

    /// Called on subscription errors, where the transport reports them.
    fn error(&self, callback: Callback) -> &dyn Channel;

    /// Unbind every transport-level handler held by this channel.
    fn unbind(&self);

    /// Wildcard listening, for transports that support it.
    fn as_listen_to_all(&self) -> Option<&dyn ListenToAll> {
        None
    }

    fn notification(&self, callback: Callback) -> &dyn Channel {
        self.listen(NOTIFICATION_EVENT, callback)
    }

    fn stop_listening_for_notification(&self, callback: Option<&Callback>) -> &dyn Channel {
        self.stop_listening(NOTIFICATION_EVENT, callback)
    }

    /// Listen for a client event sent with `whisper`.
    fn listen_for_whisper(&self, event: &str, callback: Callback) -> &dyn Channel {
        self.listen(&format!(".{CLIENT_EVENT_PREFIX}{event}"), callback)
    }

    fn stop_listening_for_whisper(&self, event: &str, callback: Option<&Callback>) -> &dyn Channel {
        self.stop_listening(&format!(".{CLIENT_EVENT_PREFIX}{event}"), callback)
    }
}

/// A channel requiring authorization; adds client events.
pub trait PrivateChannel: Channel {
    /// Send a client event to the other subscribers.
    fn whisper(&self, event: &str, data: Value) -> &dyn PrivateChannel;
}

/// A private channel that also tracks its members.
pub trait PresenceChannel: PrivateChannel {
    /// Receives the full member list once the channel is joined.
    fn here(&self, callback: Callback) -> &dyn PresenceChannel;

    /// Receives each member joining after us.
    fn joining(&self, callback: Callback) -> &dyn PresenceChannel;

    /// Receives each member leaving.
    fn leaving(&self, callback: Callback) -> &dyn PresenceChannel;
}

/// Optional capability: observe every event on a channel.
pub trait ListenToAll: Send + Sync {
    fn listen_to_all(&self, callback: EventCallback);

    /// Remove `callback`, or every wildcard listener when `None`.
    fn stop_listening_to_all(&self, callback: Option<&EventCallback>);
}

pub(crate) fn private_name(name: &str) -> String {
    format!("{PRIVATE_PREFIX}{name}")
}

pub(crate) fn presence_name(name: &str) -> String {
    format!("{PRESENCE_PREFIX}{name}")
}
