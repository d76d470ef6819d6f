use std::sync::Arc;

use crate::channel::{
    Channel, PresenceChannel, PrivateChannel, PusherChannel, presence_name, private_name,
};
use crate::client::PusherClient;
use crate::connection::ConnectionStatus;
use crate::connector::{Connector, TransportCore};
use crate::error::EchoError;
use crate::options::EchoOptions;
use crate::transport::Transport;

/// Connector for Pusher-protocol servers, used by `pusher` and `reverb`.
///
/// Uses `options.client` when given, otherwise opens a [`PusherClient`].
pub struct PusherConnector {
    core: TransportCore<PusherChannel>,
}

impl PusherConnector {
    pub fn new(options: EchoOptions) -> Self {
        Self {
            core: TransportCore::new(options),
        }
    }

    pub fn options(&self) -> &EchoOptions {
        self.core.options()
    }

    fn pusher_channel(&self, name: &str) -> Result<Arc<PusherChannel>, EchoError> {
        self.core.channel(name, PusherChannel::new)
    }
}

fn acquire(options: &EchoOptions) -> Result<Arc<dyn Transport>, EchoError> {
    if let Some(client) = &options.client {
        return Ok(Arc::clone(client));
    }
    Ok(Arc::new(PusherClient::new(options)?))
}

impl Connector for PusherConnector {
    fn connect(&self) -> Result<(), EchoError> {
        self.core.connect(acquire)
    }

    fn channel(&self, name: &str) -> Result<Arc<dyn Channel>, EchoError> {
        Ok(self.pusher_channel(name)?)
    }

    fn private_channel(&self, name: &str) -> Result<Arc<dyn PrivateChannel>, EchoError> {
        Ok(self.pusher_channel(&private_name(name))?)
    }

    fn presence_channel(&self, name: &str) -> Result<Arc<dyn PresenceChannel>, EchoError> {
        Ok(self.pusher_channel(&presence_name(name))?)
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
