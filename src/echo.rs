use std::sync::Arc;

use tracing::debug;

use crate::channel::{Callback, Channel, PresenceChannel, PrivateChannel};
use crate::connection::ConnectionStatus;
use crate::connector::{Connector, NullConnector, PusherConnector, SocketIoConnector};
use crate::error::EchoError;
use crate::options::{Broadcaster, EchoOptions};

/// Built-in broadcaster names.
pub const BROADCASTERS: [&str; 4] = ["pusher", "reverb", "socket.io", "null"];

/// Entry point wrapping exactly one [`Connector`].
///
/// ```no_run
/// use echo_rs::{Echo, EchoOptions, callback};
///
/// # async fn example() -> Result<(), echo_rs::EchoError> {
/// let echo = Echo::new(
///     EchoOptions::new("reverb")
///         .with_key("app-key")
///         .with_ws_host("localhost")
///         .with_ws_port(8080)
///         .with_force_tls(false),
/// )?;
///
/// echo.channel("orders")?.listen(
///     "OrderShipped",
///     callback(|order| println!("shipped: {order}")),
/// );
/// # Ok(())
/// # }
/// ```
pub struct Echo {
    options: EchoOptions,
    connector: Arc<dyn Connector>,
}

/// Pick the connector for the configured broadcaster.
fn resolve_connector(options: &EchoOptions) -> Result<Arc<dyn Connector>, EchoError> {
    match &options.broadcaster {
        Broadcaster::Named(name) => match name.as_str() {
            "pusher" | "reverb" => Ok(Arc::new(PusherConnector::new(options.clone()))),
            "socket.io" => Ok(Arc::new(SocketIoConnector::new(options.clone()))),
            "null" => Ok(Arc::new(NullConnector::new(options.clone()))),
            other => Err(EchoError::UnsupportedBroadcaster(other.to_string())),
        },
        Broadcaster::Factory(factory) => factory(options),
        Broadcaster::Instance(connector) => Ok(Arc::clone(connector)),
    }
}

impl Echo {
    /// Validate the broadcaster, build its connector and connect it.
    pub fn new(options: EchoOptions) -> Result<Self, EchoError> {
        let connector = resolve_connector(&options)?;
        debug!("Connecting {:?} broadcaster", options.broadcaster);
        connector.connect()?;

        Ok(Self { options, connector })
    }

    pub fn options(&self) -> &EchoOptions {
        &self.options
    }

    /// The underlying connector.
    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    pub fn channel(&self, name: &str) -> Result<Arc<dyn Channel>, EchoError> {
        self.connector.channel(name)
    }

    pub fn private(&self, name: &str) -> Result<Arc<dyn PrivateChannel>, EchoError> {
        self.connector.private_channel(name)
    }

    /// Join a presence channel.
    pub fn join(&self, name: &str) -> Result<Arc<dyn PresenceChannel>, EchoError> {
        self.connector.presence_channel(name)
    }

    /// Listen for an event on a public channel.
    pub fn listen(
        &self,
        channel: &str,
        event: &str,
        callback: Callback,
    ) -> Result<Arc<dyn Channel>, EchoError> {
        self.connector.listen(channel, event, callback)
    }

    /// Leave `name` and its private and presence variants.
    pub fn leave(&self, name: &str) {
        self.connector.leave(name);
    }

    /// Leave exactly the channel named `name`.
    pub fn leave_channel(&self, name: &str) {
        self.connector.leave_channel(name);
    }

    pub fn leave_all_channels(&self) {
        self.connector.leave_all_channels();
    }

    pub fn socket_id(&self) -> Option<String> {
        self.connector.socket_id()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connector.status()
    }

    /// Reopen the connection after [`disconnect`](Self::disconnect).
    pub fn connect(&self) -> Result<(), EchoError> {
        self.connector.connect()
    }

    pub fn disconnect(&self) {
        self.connector.disconnect();
    }
}
