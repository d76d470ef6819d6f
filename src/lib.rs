// src/lib.rs

//! Client-side broadcasting for Laravel applications.
//!
//! [`Echo`] subscribes to public, private and presence channels over a
//! Pusher-protocol websocket (Pusher or Reverb), a caller supplied Socket.io
//! transport, or a no-op connector. [`EchoContext`] holds one shared instance
//! and reference-counts channel subscriptions between independent consumers.

pub mod auth;
pub mod channel;
pub mod client;
pub mod connection;
pub mod connector;
pub mod context;
pub mod echo;
pub mod error;
pub mod event;
pub mod formatter;
pub mod message;
pub mod options;
pub mod subscription;
pub mod transport;

pub use auth::{Authorizer, ChannelAuth, EndpointAuthorizer};
pub use channel::{
    Callback, Channel, EventCallback, ListenToAll, PresenceChannel, PrivateChannel, callback,
    event_callback,
};
pub use client::PusherClient;
pub use connection::ConnectionStatus;
pub use connector::{Connector, NullConnector, PusherConnector, SocketIoConnector};
pub use context::EchoContext;
pub use echo::{BROADCASTERS, Echo};
pub use error::EchoError;
pub use event::HandlerRegistry;
pub use formatter::EventFormatter;
pub use message::Frame;
pub use options::{AuthOptions, Broadcaster, ConnectorFactory, EchoOptions};
pub use subscription::{
    ChannelId, Connection, EchoSubscription, Hold, SubscriptionCallback, SubscriptionRegistry,
    Visibility,
};
pub use transport::{FrameHandler, HandlerId, Transport};
