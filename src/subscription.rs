//! Reference-counted channel subscriptions shared by independent consumers.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, warn};

use crate::channel::{
    Callback, Channel, PresenceChannel, PrivateChannel, presence_name, private_name,
};
use crate::context::EchoContext;
use crate::error::EchoError;

/// Callback receiving the payload and the event name it arrived under.
pub type SubscriptionCallback = Arc<dyn Fn(&Value, &str) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    Public,
    #[default]
    Private,
    Presence,
}

/// A logical channel: base name plus visibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId {
    name: String,
    visibility: Visibility,
}

impl ChannelId {
    pub fn new(name: impl Into<String>, visibility: Visibility) -> Self {
        Self {
            name: name.into(),
            visibility,
        }
    }

    pub fn public(name: impl Into<String>) -> Self {
        Self::new(name, Visibility::Public)
    }

    pub fn private(name: impl Into<String>) -> Self {
        Self::new(name, Visibility::Private)
    }

    pub fn presence(name: impl Into<String>) -> Self {
        Self::new(name, Visibility::Presence)
    }

    /// The private channel Laravel broadcasts model events on.
    pub fn model(model: &str, identifier: impl fmt::Display) -> Self {
        Self::private(format!("{model}.{identifier}"))
    }

    /// Base name without visibility prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Key of the channel on the connector, prefix included.
    pub fn id(&self) -> String {
        match self.visibility {
            Visibility::Public => self.name.clone(),
            Visibility::Private => private_name(&self.name),
            Visibility::Presence => presence_name(&self.name),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// A subscribed channel as handed out by the facade for its visibility.
#[derive(Clone)]
pub enum Connection {
    Public(Arc<dyn Channel>),
    Private(Arc<dyn PrivateChannel>),
    Presence(Arc<dyn PresenceChannel>),
}

impl Connection {
    pub fn name(&self) -> &str {
        match self {
            Self::Public(channel) => channel.name(),
            Self::Private(channel) => channel.name(),
            Self::Presence(channel) => channel.name(),
        }
    }

    pub fn listen(&self, event: &str, callback: Callback) {
        match self {
            Self::Public(channel) => {
                channel.listen(event, callback);
            }
            Self::Private(channel) => {
                channel.listen(event, callback);
            }
            Self::Presence(channel) => {
                channel.listen(event, callback);
            }
        }
    }

    pub fn stop_listening(&self, event: &str, callback: Option<&Callback>) {
        match self {
            Self::Public(channel) => {
                channel.stop_listening(event, callback);
            }
            Self::Private(channel) => {
                channel.stop_listening(event, callback);
            }
            Self::Presence(channel) => {
                channel.stop_listening(event, callback);
            }
        }
    }

    pub fn as_private(&self) -> Option<&Arc<dyn PrivateChannel>> {
        match self {
            Self::Private(channel) => Some(channel),
            _ => None,
        }
    }

    pub fn as_presence(&self) -> Option<&Arc<dyn PresenceChannel>> {
        match self {
            Self::Presence(channel) => Some(channel),
            _ => None,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Public(_) => "Public",
            Self::Private(_) => "Private",
            Self::Presence(_) => "Presence",
        };
        f.debug_tuple(kind).field(&self.name()).finish()
    }
}

struct Record {
    count: usize,
    connection: Connection,
}

#[derive(Default)]
struct Records {
    generation: u64,
    entries: HashMap<String, Record>,
}

/// A counted hold on a channel.
///
/// Tied to the registry generation it was taken in; releasing it after the
/// registry was cleared does nothing.
#[derive(Debug, Clone)]
pub struct Hold {
    connection: Connection,
    generation: u64,
}

impl Hold {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn into_connection(self) -> Connection {
        self.connection
    }
}

/// Counts holders per channel so the transport subscription is made once
/// and torn down when the last holder releases it.
///
/// Subscribing and leaving both run under the registry lock, so a resolve
/// never observes a channel that is halfway through being left.
#[derive(Default)]
pub struct SubscriptionRegistry {
    records: Mutex<Records>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped by every [`clear`](Self::clear).
    pub fn generation(&self) -> u64 {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generation
    }

    /// Reuse the record for `channel`, or subscribe through `subscribe`.
    ///
    /// A failed subscription is logged and yields `None`; no record is kept.
    pub fn resolve(
        &self,
        channel: &ChannelId,
        subscribe: impl FnOnce(&ChannelId) -> Result<Connection, EchoError>,
    ) -> Option<Hold> {
        let id = channel.id();
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = records.generation;

        if let Some(record) = records.entries.get_mut(&id) {
            record.count += 1;
            debug!("Reusing subscription to {} ({} holders)", id, record.count);
            return Some(Hold {
                connection: record.connection.clone(),
                generation,
            });
        }

        match subscribe(channel) {
            Ok(connection) => {
                records.entries.insert(
                    id,
                    Record {
                        count: 1,
                        connection: connection.clone(),
                    },
                );
                Some(Hold {
                    connection,
                    generation,
                })
            }
            Err(e) => {
                warn!("Failed to subscribe to channel: {}: {}", id, e);
                None
            }
        }
    }

    /// Drop one holder taken in `generation`.
    ///
    /// When that was the last holder the record is removed and `leave` runs
    /// before the lock is released. Returns `true` if `leave` ran.
    pub fn release(
        &self,
        channel: &ChannelId,
        generation: u64,
        leave: impl FnOnce(&ChannelId),
    ) -> bool {
        let id = channel.id();
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);

        if generation != records.generation {
            debug!("Ignoring release of {} held before the last reset", id);
            return false;
        }

        let Some(record) = records.entries.get_mut(&id) else {
            warn!("Release of {} without a matching resolve", id);
            return false;
        };

        record.count = record.count.saturating_sub(1);
        if record.count > 0 {
            return false;
        }

        records.entries.remove(&id);
        leave(channel);
        true
    }

    /// Current number of holders for `channel`.
    pub fn count(&self, channel: &ChannelId) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(&channel.id())
            .map_or(0, |record| record.count)
    }

    /// Forget every record and invalidate all outstanding holds.
    pub fn clear(&self) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.entries.clear();
        records.generation += 1;
    }
}

/// One consumer's hold on a channel plus its event listeners.
///
/// Created by [`EchoContext::subscribe`]; dropping it stops listening and
/// releases the hold, leaving the channel once nobody else holds it.
pub struct EchoSubscription {
    context: Arc<EchoContext>,
    channel: ChannelId,
    connection: Option<Connection>,
    listeners: Vec<(String, Callback)>,
    listening: bool,
    generation: Option<u64>,
}

impl EchoSubscription {
    pub(crate) fn new(
        context: Arc<EchoContext>,
        channel: ChannelId,
        events: Vec<String>,
        callback: SubscriptionCallback,
    ) -> Result<Self, EchoError> {
        let hold = context.hold(&channel)?;

        let listeners = events
            .into_iter()
            .map(|event| {
                let callback = Arc::clone(&callback);
                let name = event.clone();
                let listener: Callback =
                    Arc::new(move |payload: &Value| callback(payload, name.as_str()));
                (event, listener)
            })
            .collect();

        let mut subscription = Self {
            context,
            channel,
            generation: hold.as_ref().map(Hold::generation),
            connection: hold.map(Hold::into_connection),
            listeners,
            listening: false,
        };
        subscription.listen();
        Ok(subscription)
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel
    }

    /// `None` when the subscription could not be made.
    pub fn channel(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    pub fn listen(&mut self) {
        let Some(connection) = &self.connection else {
            return;
        };
        if self.listening || self.generation.is_none() {
            return;
        }

        for (event, listener) in &self.listeners {
            connection.listen(event, Arc::clone(listener));
        }
        self.listening = true;
    }

    /// Stop the callbacks without giving up the channel.
    pub fn stop_listening(&mut self) {
        let Some(connection) = &self.connection else {
            return;
        };
        if !self.listening {
            return;
        }

        for (event, listener) in &self.listeners {
            connection.stop_listening(event, Some(listener));
        }
        self.listening = false;
    }

    /// Release this hold; the channel is left once no holder remains.
    pub fn leave_channel(&mut self) {
        self.tear_down(false);
    }

    /// Like [`leave_channel`](Self::leave_channel), but the final release
    /// also leaves the private and presence variants.
    pub fn leave(&mut self) {
        self.tear_down(true);
    }

    fn tear_down(&mut self, leave_all: bool) {
        self.stop_listening();

        let Some(generation) = self.generation.take() else {
            return;
        };

        if let Err(e) = self
            .context
            .release_hold(&self.channel, generation, leave_all)
        {
            warn!("Failed to release {}: {}", self.channel, e);
        }
    }
}

impl Drop for EchoSubscription {
    fn drop(&mut self) {
        self.tear_down(false);
    }
}
