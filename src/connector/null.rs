use std::sync::{Arc, Mutex, PoisonError};

use crate::channel::{
    Channel, NullChannel, PresenceChannel, PrivateChannel, presence_name, private_name,
};
use crate::connection::ConnectionStatus;
use crate::connector::{ChannelRegistry, Connector};
use crate::error::EchoError;
use crate::options::EchoOptions;

pub const FAKE_SOCKET_ID: &str = "fake-socket-id";

/// Connector that talks to nothing; for tests and server-side rendering.
pub struct NullConnector {
    options: EchoOptions,
    status: Mutex<ConnectionStatus>,
    registry: ChannelRegistry<NullChannel>,
}

impl NullConnector {
    pub fn new(options: EchoOptions) -> Self {
        Self {
            options,
            status: Mutex::new(ConnectionStatus::Uninitialized),
            registry: ChannelRegistry::new(),
        }
    }

    pub fn options(&self) -> &EchoOptions {
        &self.options
    }

    fn null_channel(&self, name: &str) -> Arc<NullChannel> {
        self.registry.get_or_create(name, || NullChannel::new(name))
    }

    fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

impl Connector for NullConnector {
    fn connect(&self) -> Result<(), EchoError> {
        self.set_status(ConnectionStatus::Connected);
        Ok(())
    }

    fn channel(&self, name: &str) -> Result<Arc<dyn Channel>, EchoError> {
        Ok(self.null_channel(name))
    }

    fn private_channel(&self, name: &str) -> Result<Arc<dyn PrivateChannel>, EchoError> {
        Ok(self.null_channel(&private_name(name)))
    }

    fn presence_channel(&self, name: &str) -> Result<Arc<dyn PresenceChannel>, EchoError> {
        Ok(self.null_channel(&presence_name(name)))
    }

    fn leave_channel(&self, name: &str) {
        self.registry.leave(name);
    }

    fn channel_names(&self) -> Vec<String> {
        self.registry.names()
    }

    fn socket_id(&self) -> Option<String> {
        Some(FAKE_SOCKET_ID.to_string())
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn disconnect(&self) {
        self.set_status(ConnectionStatus::Disconnected);
    }
}
