use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Map, Value, json};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::auth::{Authorizer, EndpointAuthorizer};
use crate::channel::pusher::{
    MEMBER_ADDED_EVENT, MEMBER_REMOVED_EVENT, SUBSCRIBE_EVENT, SUBSCRIPTION_ERROR_EVENT,
    SUBSCRIPTION_SUCCEEDED_EVENT, UNSUBSCRIBE_EVENT,
};
use crate::channel::{PRESENCE_PREFIX, PRIVATE_PREFIX};
use crate::connection::{ConnectionStatus, OutboundQueue};
use crate::error::EchoError;
use crate::event::HandlerRegistry;
use crate::message::{ConnectionData, ErrorData, Frame, SubscribeData, SubscribeMessage};
use crate::options::EchoOptions;
use crate::transport::{FrameHandler, HandlerId, RECONNECT_EVENT, Transport};

const PROTOCOL_VERSION: u8 = 7;
const CLIENT_NAME: &str = "echo-rs";
const DEFAULT_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub const CONNECTION_ESTABLISHED_EVENT: &str = "pusher:connection_established";
pub const ERROR_EVENT: &str = "pusher:error";

/// Pusher-protocol WebSocket client for Pusher and Laravel Reverb.
///
/// Runs one background task per connection that owns the socket, reconnects
/// with exponential backoff and raises [`RECONNECT_EVENT`] after every
/// re-established session. Must be connected from within a Tokio runtime.
pub struct PusherClient {
    url: Url,
    authorizer: Arc<dyn Authorizer>,
    shared: Arc<Shared>,
    control: Mutex<Option<Control>>,
}

struct Control {
    queue: OutboundQueue,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Shared {
    handlers: HandlerRegistry,
    socket_id: Mutex<Option<String>>,
    status: Mutex<ConnectionStatus>,
    members: Mutex<HashMap<String, Map<String, Value>>>,
}

impl Shared {
    fn set_status(&self, status: ConnectionStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn set_socket_id(&self, socket_id: Option<String>) {
        *self.socket_id.lock().unwrap_or_else(PoisonError::into_inner) = socket_id;
    }

    fn reset_session(&self, status: ConnectionStatus) {
        self.set_socket_id(None);
        self.set_status(status);
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Turn protocol-internal frames into the events channels bind to.
    ///
    /// Keeps the member list of each presence channel along the way.
    fn translate(&self, frame: Frame) -> Option<Frame> {
        let channel = frame.channel.clone().unwrap_or_default();

        match frame.event.as_str() {
            "pusher_internal:subscription_succeeded" => {
                let Some(presence) = frame.data.get("presence") else {
                    return Some(Frame::on_channel(
                        SUBSCRIPTION_SUCCEEDED_EVENT,
                        channel,
                        frame.data,
                    ));
                };

                let members = presence
                    .get("hash")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let count = presence
                    .get("count")
                    .cloned()
                    .unwrap_or_else(|| json!(members.len()));

                self.members
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(channel.clone(), members.clone());

                Some(Frame::on_channel(
                    SUBSCRIPTION_SUCCEEDED_EVENT,
                    channel,
                    json!({ "members": members, "count": count }),
                ))
            }
            "pusher_internal:member_added" => {
                let id = member_id(frame.data.get("user_id")?);
                let info = frame.data.get("user_info").cloned().unwrap_or(Value::Null);

                self.members
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(channel.clone())
                    .or_default()
                    .insert(id.clone(), info.clone());

                Some(Frame::on_channel(
                    MEMBER_ADDED_EVENT,
                    channel,
                    json!({ "id": id, "info": info }),
                ))
            }
            "pusher_internal:member_removed" => {
                let id = member_id(frame.data.get("user_id")?);
                let info = self
                    .members
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_mut(&channel)
                    .and_then(|members| members.remove(&id))?;

                Some(Frame::on_channel(
                    MEMBER_REMOVED_EVENT,
                    channel,
                    json!({ "id": id, "info": info }),
                ))
            }
            _ => Some(frame),
        }
    }

    fn forget_members(&self, channel: &str) {
        self.members
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(channel);
    }
}

fn member_id(value: &Value) -> String {
    match value {
        Value::String(id) => id.clone(),
        other => other.to_string(),
    }
}

/// 1s, 2s, 4s ... capped at 30s.
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(5)).min(MAX_BACKOFF)
}

enum SessionEnd {
    Shutdown,
    Refused,
}

impl PusherClient {
    /// Build a client from the connection options.
    ///
    /// Private and presence subscriptions are authorized through
    /// `options.authorizer`, or the auth endpoint resolved against the
    /// WebSocket host.
    pub fn new(options: &EchoOptions) -> Result<Self, EchoError> {
        let secure = options.use_tls();
        let host = options.resolved_ws_host();
        let port = options.port();
        let key = options.key.clone().unwrap_or_default();
        let path = options.ws_path.as_deref().unwrap_or("").trim_end_matches('/');

        let scheme = if secure { "wss" } else { "ws" };
        let url = Url::parse(&format!(
            "{}://{}:{}{}/app/{}?protocol={}&client={}&version={}&flash=false",
            scheme,
            host,
            port,
            path,
            key,
            PROTOCOL_VERSION,
            CLIENT_NAME,
            env!("CARGO_PKG_VERSION")
        ))?;

        let authorizer: Arc<dyn Authorizer> = match &options.authorizer {
            Some(authorizer) => Arc::clone(authorizer),
            None => {
                let http_scheme = if secure { "https" } else { "http" };
                let base = Url::parse(&format!("{}://{}:{}", http_scheme, host, port))?;
                Arc::new(EndpointAuthorizer::resolve(
                    &base,
                    &options.auth_endpoint,
                    options.auth.clone(),
                )?)
            }
        };

        Ok(Self {
            url,
            authorizer,
            shared: Arc::new(Shared::default()),
            control: Mutex::new(None),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for PusherClient {
    fn connect(&self) -> Result<(), EchoError> {
        let mut control = self.control.lock().unwrap_or_else(PoisonError::into_inner);

        if control
            .as_ref()
            .is_some_and(|c| !c.task.is_finished() && !c.queue.is_closed())
        {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            EchoError::MissingTransport(
                "PusherClient needs a Tokio runtime; connect from within one or pass a pre-built client via EchoOptions::with_client"
                    .to_string(),
            )
        })?;

        let (queue, outbound) = OutboundQueue::new();
        let (shutdown, shutdown_rx) = watch::channel(false);

        info!("Connecting to {}", self.url);
        self.shared.reset_session(ConnectionStatus::Connecting);

        let task = runtime.spawn(run(
            self.url.clone(),
            Arc::clone(&self.shared),
            Arc::clone(&self.authorizer),
            outbound,
            shutdown_rx,
        ));

        *control = Some(Control {
            queue,
            shutdown,
            task,
        });
        Ok(())
    }

    fn send(&self, frame: Frame) -> Result<(), EchoError> {
        match &*self.control.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(control) => control.queue.send(frame),
            None => Err(EchoError::ConnectionError("Not connected".to_string())),
        }
    }

    fn on(&self, event: &str, handler: FrameHandler) -> HandlerId {
        self.shared.handlers.add(event, handler)
    }

    fn remove_listener(&self, event: &str, id: HandlerId) {
        self.shared.handlers.remove(event, id);
    }

    fn socket_id(&self) -> Option<String> {
        self.shared
            .socket_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn status(&self) -> ConnectionStatus {
        *self
            .shared
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn disconnect(&self) {
        let control = self
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(control) = control {
            info!("Disconnecting from {}", self.url);
            if control.shutdown.send(true).is_err() {
                debug!("Connection task already stopped");
            }
        }
        self.shared.reset_session(ConnectionStatus::Disconnected);
    }
}

/// Connection supervisor: keeps a session alive until shut down.
async fn run(
    url: Url,
    shared: Arc<Shared>,
    authorizer: Arc<dyn Authorizer>,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    let mut connected_before = false;

    loop {
        let result = session(
            &url,
            &shared,
            authorizer.as_ref(),
            &mut outbound,
            &mut shutdown,
            &mut connected_before,
            &mut attempt,
        )
        .await;

        match result {
            Ok(SessionEnd::Shutdown) => break,
            Ok(SessionEnd::Refused) => {
                error!("Server refused the connection, not reconnecting");
                break;
            }
            Err(e) => warn!("Connection to {} lost: {}", url, e),
        }

        if *shutdown.borrow() {
            break;
        }

        shared.reset_session(if connected_before {
            ConnectionStatus::Reconnecting
        } else {
            ConnectionStatus::Connecting
        });

        let delay = backoff(attempt);
        attempt = attempt.saturating_add(1);
        debug!("Reconnecting in {:?}", delay);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    shared.reset_session(ConnectionStatus::Disconnected);
}

/// One WebSocket session, from handshake until the socket closes.
async fn session(
    url: &Url,
    shared: &Shared,
    authorizer: &dyn Authorizer,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    shutdown: &mut watch::Receiver<bool>,
    connected_before: &mut bool,
    attempt: &mut u32,
) -> Result<SessionEnd, EchoError> {
    if *shutdown.borrow_and_update() {
        return Ok(SessionEnd::Shutdown);
    }

    let (ws_stream, response) = connect_async(url.as_str()).await.map_err(|e| {
        error!("Failed to connect to WebSocket server: {}", e);
        e
    })?;

    debug!("Connected to WebSocket server. Response: {:?}", response);

    let (mut sink, mut stream) = ws_stream.split();
    let mut socket_id: Option<String> = None;
    let mut ping = interval_at(
        Instant::now() + DEFAULT_ACTIVITY_TIMEOUT,
        DEFAULT_ACTIVITY_TIMEOUT,
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    warn!("Error sending close frame: {}", e);
                }
                return Ok(SessionEnd::Shutdown);
            }
            frame = outbound.recv(), if socket_id.is_some() => {
                let Some(frame) = frame else {
                    return Ok(SessionEnd::Shutdown);
                };
                let id = socket_id.as_deref().unwrap_or_default();
                if let Some(text) = encode_outbound(frame, id, authorizer, shared).await {
                    trace!("Sending message: {}", text);
                    sink.send(Message::Text(text)).await?;
                }
            }
            _ = ping.tick(), if socket_id.is_some() => {
                trace!("Sending activity ping");
                let ping_message = json!({ "event": "pusher:ping", "data": {} });
                sink.send(Message::Text(ping_message.to_string())).await?;
            }
            message = stream.next() => {
                let message = match message {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Err(EchoError::ConnectionError("Stream ended".to_string()));
                    }
                };

                match message {
                    Message::Text(text) => {
                        trace!("Received message: {}", text);

                        let frame = match serde_json::from_str::<Frame>(&text) {
                            Ok(frame) => frame.decode_data(),
                            Err(e) => {
                                debug!("Ignoring unparseable message {}: {}", text, e);
                                continue;
                            }
                        };

                        match frame.event.as_str() {
                            CONNECTION_ESTABLISHED_EVENT => {
                                let data: ConnectionData =
                                    serde_json::from_value(frame.data.clone())?;
                                info!("Connection established with socket ID: {}", data.socket_id);

                                let period = data
                                    .activity_timeout
                                    .map_or(DEFAULT_ACTIVITY_TIMEOUT, Duration::from_secs);
                                ping = interval_at(Instant::now() + period, period);

                                socket_id = Some(data.socket_id.clone());
                                shared.set_socket_id(Some(data.socket_id.clone()));
                                shared.set_status(ConnectionStatus::Connected);
                                *attempt = 0;

                                shared.handlers.dispatch(&frame);
                                if *connected_before {
                                    shared.handlers.dispatch(&Frame::new(
                                        RECONNECT_EVENT,
                                        json!({ "socket_id": data.socket_id }),
                                    ));
                                }
                                *connected_before = true;
                            }
                            "pusher:ping" => {
                                let pong = json!({ "event": "pusher:pong", "data": {} });
                                sink.send(Message::Text(pong.to_string())).await?;
                            }
                            "pusher:pong" => trace!("Received pong"),
                            ERROR_EVENT => {
                                let code = match serde_json::from_value::<ErrorData>(
                                    frame.data.clone(),
                                ) {
                                    Ok(error_data) => {
                                        error!(
                                            "Reverb error: {} (code: {:?})",
                                            error_data.message, error_data.code
                                        );
                                        error_data.code
                                    }
                                    Err(_) => None,
                                };
                                shared.handlers.dispatch(&frame);

                                // 4000-4099: the server asks us not to reconnect
                                if code.is_some_and(|c| (4000..4100).contains(&c)) {
                                    return Ok(SessionEnd::Refused);
                                }
                            }
                            _ => {
                                if let Some(frame) = shared.translate(frame) {
                                    debug!("Event {} on {:?}", frame.event, frame.channel);
                                    shared.handlers.dispatch(&frame);
                                }
                            }
                        }
                    }
                    Message::Ping(data) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            error!("Failed to send pong: {}", e);
                        }
                    }
                    Message::Close(reason) => {
                        return Err(EchoError::ConnectionError(format!(
                            "Closed by server: {:?}",
                            reason
                        )));
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Serialize an outbound frame, authorizing subscriptions that need it.
async fn encode_outbound(
    frame: Frame,
    socket_id: &str,
    authorizer: &dyn Authorizer,
    shared: &Shared,
) -> Option<String> {
    if frame.event == SUBSCRIBE_EVENT {
        let channel = frame
            .data
            .get("channel")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let (auth, channel_data) =
            if channel.starts_with(PRIVATE_PREFIX) || channel.starts_with(PRESENCE_PREFIX) {
                match authorizer.authorize(socket_id, &channel).await {
                    Ok(auth) => (Some(auth.auth), auth.channel_data),
                    Err(e) => {
                        warn!("Failed to authorize {}: {}", channel, e);
                        shared.handlers.dispatch(&Frame::on_channel(
                            SUBSCRIPTION_ERROR_EVENT,
                            channel,
                            json!({ "type": "AuthError", "error": e.to_string() }),
                        ));
                        return None;
                    }
                }
            } else {
                (None, None)
            };

        let message = SubscribeMessage {
            event: SUBSCRIBE_EVENT.to_string(),
            data: SubscribeData {
                channel,
                auth,
                channel_data,
            },
        };
        return encode(&message);
    }

    if frame.event == UNSUBSCRIBE_EVENT {
        if let Some(channel) = frame.data.get("channel").and_then(Value::as_str) {
            shared.forget_members(channel);
        }
    }

    encode(&frame)
}

fn encode<T: serde::Serialize>(message: &T) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!("Failed to encode outbound message: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ChannelAuth;
    use async_trait::async_trait;

    struct StaticAuthorizer;

    #[async_trait]
    impl Authorizer for StaticAuthorizer {
        async fn authorize(
            &self,
            socket_id: &str,
            channel: &str,
        ) -> Result<ChannelAuth, EchoError> {
            if channel.ends_with("forbidden") {
                return Err(EchoError::AuthError("403".to_string()));
            }
            Ok(ChannelAuth {
                auth: format!("key:{socket_id}:{channel}"),
                channel_data: channel
                    .starts_with(PRESENCE_PREFIX)
                    .then(|| r#"{"user_id":1}"#.to_string()),
            })
        }
    }

    #[test]
    fn builds_url_from_options() {
        let options = EchoOptions::new("reverb")
            .with_key("app-key")
            .with_ws_host("localhost")
            .with_ws_port(8080)
            .with_force_tls(false);

        let client = PusherClient::new(&options).unwrap();
        assert_eq!(client.url().scheme(), "ws");
        assert_eq!(client.url().port(), Some(8080));
        assert_eq!(client.url().path(), "/app/app-key");
        assert!(client.url().query().unwrap().contains("protocol=7"));
        assert_eq!(client.status(), ConnectionStatus::Uninitialized);
    }

    #[test]
    fn connect_without_runtime_is_a_missing_transport() {
        let client = PusherClient::new(&EchoOptions::new("pusher").with_key("k")).unwrap();
        assert!(matches!(
            client.connect(),
            Err(EchoError::MissingTransport(_))
        ));
        assert!(client.send(Frame::new("pusher:ping", json!({}))).is_err());
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        assert_eq!(backoff(0), Duration::from_secs(1));
        assert_eq!(backoff(1), Duration::from_secs(2));
        assert_eq!(backoff(4), Duration::from_secs(16));
        assert_eq!(backoff(5), MAX_BACKOFF);
        assert_eq!(backoff(40), MAX_BACKOFF);
    }

    #[test]
    fn translates_presence_lifecycle() {
        let shared = Shared::default();

        let joined = shared
            .translate(Frame::on_channel(
                "pusher_internal:subscription_succeeded",
                "presence-room",
                json!({"presence": {"ids": ["1"], "hash": {"1": {"name": "Ada"}}, "count": 1}}),
            ))
            .unwrap();
        assert_eq!(joined.event, SUBSCRIPTION_SUCCEEDED_EVENT);
        assert_eq!(joined.data["members"], json!({"1": {"name": "Ada"}}));

        let added = shared
            .translate(Frame::on_channel(
                "pusher_internal:member_added",
                "presence-room",
                json!({"user_id": 2, "user_info": {"name": "Grace"}}),
            ))
            .unwrap();
        assert_eq!(added.event, MEMBER_ADDED_EVENT);
        assert_eq!(added.data, json!({"id": "2", "info": {"name": "Grace"}}));

        let removed = shared
            .translate(Frame::on_channel(
                "pusher_internal:member_removed",
                "presence-room",
                json!({"user_id": "2"}),
            ))
            .unwrap();
        assert_eq!(removed.event, MEMBER_REMOVED_EVENT);
        assert_eq!(removed.data["info"], json!({"name": "Grace"}));

        assert!(
            shared
                .translate(Frame::on_channel(
                    "pusher_internal:member_removed",
                    "presence-room",
                    json!({"user_id": "2"}),
                ))
                .is_none()
        );
    }

    #[test]
    fn public_subscription_succeeded_keeps_payload() {
        let shared = Shared::default();
        let frame = shared
            .translate(Frame::on_channel(
                "pusher_internal:subscription_succeeded",
                "orders",
                json!({}),
            ))
            .unwrap();
        assert_eq!(frame.event, SUBSCRIPTION_SUCCEEDED_EVENT);
        assert_eq!(frame.channel.as_deref(), Some("orders"));
    }

    #[tokio::test]
    async fn authorizes_private_subscriptions() {
        let shared = Shared::default();
        let text = encode_outbound(
            Frame::new(SUBSCRIBE_EVENT, json!({"channel": "presence-room"})),
            "123.456",
            &StaticAuthorizer,
            &shared,
        )
        .await
        .unwrap();

        let sent: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(sent["data"]["auth"], "key:123.456:presence-room");
        assert_eq!(sent["data"]["channel_data"], r#"{"user_id":1}"#);
    }

    #[tokio::test]
    async fn public_subscriptions_skip_auth() {
        let shared = Shared::default();
        let text = encode_outbound(
            Frame::new(SUBSCRIBE_EVENT, json!({"channel": "orders"})),
            "123.456",
            &StaticAuthorizer,
            &shared,
        )
        .await
        .unwrap();

        let sent: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(sent, json!({"event": "pusher:subscribe", "data": {"channel": "orders"}}));
    }

    #[tokio::test]
    async fn failed_auth_raises_subscription_error() {
        let shared = Shared::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        shared.handlers.add(
            SUBSCRIPTION_ERROR_EVENT,
            Arc::new(move |frame: &Frame| seen_clone.lock().unwrap().push(frame.clone())),
        );

        let text = encode_outbound(
            Frame::new(SUBSCRIBE_EVENT, json!({"channel": "private-forbidden"})),
            "1.2",
            &StaticAuthorizer,
            &shared,
        )
        .await;

        assert!(text.is_none());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].channel.as_deref(), Some("private-forbidden"));
        assert_eq!(seen[0].data["type"], "AuthError");
    }

    #[tokio::test]
    async fn disconnect_before_handshake_stops_the_task() {
        let options = EchoOptions::new("reverb")
            .with_key("k")
            .with_ws_host("127.0.0.1")
            .with_ws_port(9)
            .with_force_tls(false);
        let client = PusherClient::new(&options).unwrap();

        client.connect().unwrap();
        client.connect().unwrap();
        assert!(client.send(Frame::new("pusher:ping", json!({}))).is_ok());

        client.disconnect();
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert!(client.socket_id().is_none());
        assert!(client.send(Frame::new("pusher:ping", json!({}))).is_err());
    }
}
