use std::sync::Arc;

use crate::channel::{
    Channel, PresenceChannel, PrivateChannel, SocketIoChannel, presence_name, private_name,
};
use crate::connection::ConnectionStatus;
use crate::connector::{Connector, TransportCore};
use crate::error::EchoError;
use crate::options::EchoOptions;
use crate::transport::Transport;

/// Connector for a Socket.io server (laravel-echo-server and friends).
///
/// There is no bundled Socket.io client: supply one through
/// [`EchoOptions::with_client`].
pub struct SocketIoConnector {
    core: TransportCore<SocketIoChannel>,
}

impl SocketIoConnector {
    pub fn new(options: EchoOptions) -> Self {
        Self {
            core: TransportCore::new(options),
        }
    }

    pub fn options(&self) -> &EchoOptions {
        self.core.options()
    }

    fn socket_channel(&self, name: &str) -> Result<Arc<SocketIoChannel>, EchoError> {
        self.core.channel(name, SocketIoChannel::new)
    }
}

fn acquire(options: &EchoOptions) -> Result<Arc<dyn Transport>, EchoError> {
    options.client.clone().ok_or_else(|| {
        EchoError::MissingTransport(
            "Socket.io client not found. Should be passed via EchoOptions::with_client".to_string(),
        )
    })
}

impl Connector for SocketIoConnector {
    fn connect(&self) -> Result<(), EchoError> {
        self.core.connect(acquire)
    }

    fn channel(&self, name: &str) -> Result<Arc<dyn Channel>, EchoError> {
        Ok(self.socket_channel(name)?)
    }

    fn private_channel(&self, name: &str) -> Result<Arc<dyn PrivateChannel>, EchoError> {
        Ok(self.socket_channel(&private_name(name))?)
    }

    fn presence_channel(&self, name: &str) -> Result<Arc<dyn PresenceChannel>, EchoError> {
        Ok(self.socket_channel(&presence_name(name))?)
    }

    fn leave_channel(&self, name: &str) {
        self.core.leave_channel(name);
    }

    fn channel_names(&self) -> Vec<String> {
        self.core.channel_names()
    }

    fn socket_id(&self) -> Option<String> {
        self.core.socket_id()
    }

    fn status(&self) -> ConnectionStatus {
        self.core.status()
    }

    fn disconnect(&self) {
        self.core.disconnect();
    }
}
