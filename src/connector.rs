//! Connectors own a transport and the channels subscribed over it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::channel::{
    Callback, Channel, PresenceChannel, PrivateChannel, presence_name, private_name,
};
use crate::connection::ConnectionStatus;
use crate::error::EchoError;
use crate::message::Frame;
use crate::options::EchoOptions;
use crate::transport::{RECONNECT_EVENT, Transport};

pub mod null;
pub mod pusher;
pub mod socketio;

pub use null::NullConnector;
pub use pusher::PusherConnector;
pub use socketio::SocketIoConnector;

/// A per-transport adapter tracking at most one channel per name.
pub trait Connector: Send + Sync {
    /// Open the transport connection.
    ///
    /// Called once by [`Echo::new`](crate::Echo::new); calling it again after
    /// [`disconnect`](Self::disconnect) reopens the transport and replays the
    /// subscriptions of every channel still tracked.
    fn connect(&self) -> Result<(), EchoError>;

    /// Get the tracked channel or create, subscribe and track a new one.
    fn channel(&self, name: &str) -> Result<Arc<dyn Channel>, EchoError>;

    /// Same as [`channel`](Self::channel) for `private-{name}`.
    fn private_channel(&self, name: &str) -> Result<Arc<dyn PrivateChannel>, EchoError>;

    /// Same as [`channel`](Self::channel) for `presence-{name}`.
    fn presence_channel(&self, name: &str) -> Result<Arc<dyn PresenceChannel>, EchoError>;

    fn listen(
        &self,
        name: &str,
        event: &str,
        callback: Callback,
    ) -> Result<Arc<dyn Channel>, EchoError> {
        let channel = self.channel(name)?;
        channel.listen(event, callback);
        Ok(channel)
    }

    /// Leave `name` along with its private and presence variants.
    fn leave(&self, name: &str) {
        for channel in [name.to_string(), private_name(name), presence_name(name)] {
            self.leave_channel(&channel);
        }
    }

    /// Unsubscribe and forget exactly the channel keyed by `name`.
    fn leave_channel(&self, name: &str);

    fn leave_all_channels(&self) {
        for name in self.channel_names() {
            self.leave_channel(&name);
        }
    }

    /// Names of every tracked channel.
    fn channel_names(&self) -> Vec<String>;

    fn socket_id(&self) -> Option<String>;

    fn status(&self) -> ConnectionStatus;

    /// Close the transport. Tracked channels stay tracked.
    fn disconnect(&self);
}

/// Channel name to channel map shared by the connectors.
///
/// Subscribe and unsubscribe requests are sent with the map locked, so the
/// transport sees them in the same order as the map changes.
pub(crate) struct ChannelRegistry<C> {
    channels: Mutex<HashMap<String, Arc<C>>>,
}

impl<C: Channel> ChannelRegistry<C> {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the tracked channel, or tracks and subscribes a new one.
    pub fn get_or_create(&self, name: &str, make: impl FnOnce() -> C) -> Arc<C> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = channels.get(name) {
            return Arc::clone(existing);
        }

        let channel = Arc::new(make());
        channel.subscribe();
        channels.insert(name.to_string(), Arc::clone(&channel));
        channel
    }

    pub fn names(&self) -> Vec<String> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Replay the subscribe request of every tracked channel.
    pub fn resubscribe_all(&self) {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        for channel in channels.values() {
            channel.subscribe();
        }
    }

    pub fn leave(&self, name: &str) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(channel) = channels.remove(name) {
            debug!("Leaving channel {}", name);
            channel.unsubscribe();
        }
    }
}

/// Transport slot and channel registry behind the socket-based connectors.
pub(crate) struct TransportCore<C> {
    options: EchoOptions,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    registry: Arc<ChannelRegistry<C>>,
}

impl<C: Channel + 'static> TransportCore<C> {
    pub fn new(options: EchoOptions) -> Self {
        Self {
            options,
            transport: Mutex::new(None),
            registry: Arc::new(ChannelRegistry::new()),
        }
    }

    pub fn options(&self) -> &EchoOptions {
        &self.options
    }

    pub fn connect(
        &self,
        acquire: impl FnOnce(&EchoOptions) -> Result<Arc<dyn Transport>, EchoError>,
    ) -> Result<(), EchoError> {
        let mut slot = self.transport.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(transport) = slot.as_ref() {
            let was_down = transport.status() == ConnectionStatus::Disconnected;
            transport.connect()?;
            if was_down {
                info!("Transport reopened, replaying channel subscriptions");
                self.registry.resubscribe_all();
            }
            return Ok(());
        }

        let transport = acquire(&self.options)?;
        transport.connect()?;

        let registry = Arc::downgrade(&self.registry);
        transport.on(
            RECONNECT_EVENT,
            Arc::new(move |_frame: &Frame| {
                if let Some(registry) = registry.upgrade() {
                    info!("Transport reconnected, replaying channel subscriptions");
                    registry.resubscribe_all();
                }
            }),
        );

        *slot = Some(transport);
        Ok(())
    }

    pub fn transport(&self) -> Result<Arc<dyn Transport>, EchoError> {
        self.transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| EchoError::NotConnected("connect() has not been called".to_string()))
    }

    pub fn channel(
        &self,
        name: &str,
        make: impl FnOnce(Arc<dyn Transport>, &str, &EchoOptions) -> C,
    ) -> Result<Arc<C>, EchoError> {
        let transport = self.transport()?;
        Ok(self
            .registry
            .get_or_create(name, || make(transport, name, &self.options)))
    }

    pub fn leave_channel(&self, name: &str) {
        self.registry.leave(name);
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn socket_id(&self) -> Option<String> {
        self.transport().ok().and_then(|t| t.socket_id())
    }

    pub fn status(&self) -> ConnectionStatus {
        self.transport()
            .map_or(ConnectionStatus::Uninitialized, |t| t.status())
    }

    pub fn disconnect(&self) {
        if let Ok(transport) = self.transport() {
            transport.disconnect();
        }
    }
}
