use std::fmt;
use std::sync::Arc;

use crate::connection::ConnectionStatus;
use crate::error::EchoError;
use crate::message::Frame;

/// Local event raised by a transport after it re-establishes a session.
pub const RECONNECT_EVENT: &str = "reconnect";

/// Handlers registered for this event receive every inbound frame.
pub const ALL_EVENTS: &str = "*";

/// Callback bound on a transport for a single event name.
pub type FrameHandler = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Identifies one handler binding so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);

impl HandlerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// Minimal capability set the connectors need from a transport client.
///
/// All methods are synchronous. Implementations that perform network I/O
/// queue outbound frames and deliver inbound frames from their own tasks.
pub trait Transport: Send + Sync {
    /// Open the connection. Calling it while already connected must be harmless.
    fn connect(&self) -> Result<(), EchoError>;

    /// Queue a frame for delivery.
    fn send(&self, frame: Frame) -> Result<(), EchoError>;

    /// Bind a handler for an inbound event name.
    fn on(&self, event: &str, handler: FrameHandler) -> HandlerId;

    /// Remove a handler previously returned by [`Transport::on`].
    fn remove_listener(&self, event: &str, id: HandlerId);

    /// The server-assigned connection identifier, once known.
    fn socket_id(&self) -> Option<String>;

    fn status(&self) -> ConnectionStatus;

    fn disconnect(&self);
}
