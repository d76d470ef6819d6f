#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use echo_rs::{
    Callback, Channel, ConnectionStatus, Connector, EchoError, EchoOptions, Frame, FrameHandler,
    HandlerId, HandlerRegistry, NullConnector, PresenceChannel, PrivateChannel, Transport,
    callback,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory transport recording outbound frames and delivering inbound
/// ones synchronously through [`FakeTransport::trigger`].
#[derive(Default)]
pub struct FakeTransport {
    handlers: HandlerRegistry,
    sent: Mutex<Vec<Frame>>,
    removed: Mutex<Vec<String>>,
    connects: AtomicUsize,
    status: Mutex<ConnectionStatus>,
    socket_id: Mutex<Option<String>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn trigger(&self, event: &str, channel: Option<&str>, data: Value) {
        let frame = match channel {
            Some(channel) => Frame::on_channel(event, channel, data),
            None => Frame::new(event, data),
        };
        self.handlers.dispatch(&frame);
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_named(&self, event: &str) -> Vec<Frame> {
        self.sent()
            .into_iter()
            .filter(|frame| frame.event == event)
            .collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.count(event)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn set_socket_id(&self, socket_id: &str) {
        *self.socket_id.lock().unwrap() = Some(socket_id.to_string());
    }
}

impl Transport for FakeTransport {
    fn connect(&self) -> Result<(), EchoError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.status.lock().unwrap() = ConnectionStatus::Connected;
        Ok(())
    }

    fn send(&self, frame: Frame) -> Result<(), EchoError> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    fn on(&self, event: &str, handler: FrameHandler) -> HandlerId {
        self.handlers.add(event, handler)
    }

    fn remove_listener(&self, event: &str, id: HandlerId) {
        self.removed.lock().unwrap().push(event.to_string());
        self.handlers.remove(event, id);
    }

    fn socket_id(&self) -> Option<String> {
        self.socket_id.lock().unwrap().clone()
    }

    fn status(&self) -> ConnectionStatus {
        *self.status.lock().unwrap()
    }

    fn disconnect(&self) {
        *self.status.lock().unwrap() = ConnectionStatus::Disconnected;
    }
}

/// Connector over [`NullConnector`] that records every call it receives.
pub struct RecordingConnector {
    inner: NullConnector,
    calls: Mutex<Vec<String>>,
    failing: AtomicBool,
    leave_delay: Mutex<Duration>,
}

impl RecordingConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: NullConnector::new(EchoOptions::new("null")),
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            leave_delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Make every channel request fail from now on.
    pub fn fail_subscriptions(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Make every `leave_channel` call block for `delay` before it runs.
    pub fn delay_leaves(&self, delay: Duration) {
        *self.leave_delay.lock().unwrap() = delay;
    }

    fn record(&self, call: String) -> Result<(), EchoError> {
        self.calls.lock().unwrap().push(call);
        if self.failing.load(Ordering::SeqCst) {
            return Err(EchoError::SubscriptionError("refused".to_string()));
        }
        Ok(())
    }
}

impl Connector for RecordingConnector {
    fn connect(&self) -> Result<(), EchoError> {
        self.calls.lock().unwrap().push("connect".to_string());
        self.inner.connect()
    }

    fn channel(&self, name: &str) -> Result<Arc<dyn Channel>, EchoError> {
        self.record(format!("channel:{name}"))?;
        self.inner.channel(name)
    }

    fn private_channel(&self, name: &str) -> Result<Arc<dyn PrivateChannel>, EchoError> {
        self.record(format!("private:{name}"))?;
        self.inner.private_channel(name)
    }

    fn presence_channel(&self, name: &str) -> Result<Arc<dyn PresenceChannel>, EchoError> {
        self.record(format!("presence:{name}"))?;
        self.inner.presence_channel(name)
    }

    fn leave_channel(&self, name: &str) {
        let delay = *self.leave_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.calls.lock().unwrap().push(format!("leave_channel:{name}"));
        self.inner.leave_channel(name);
    }

    fn channel_names(&self) -> Vec<String> {
        self.inner.channel_names()
    }

    fn socket_id(&self) -> Option<String> {
        self.inner.socket_id()
    }

    fn status(&self) -> ConnectionStatus {
        self.inner.status()
    }

    fn disconnect(&self) {
        self.calls.lock().unwrap().push("disconnect".to_string());
        self.inner.disconnect();
    }
}

/// A callback appending every payload it receives to `log` under `tag`.
pub fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> Callback {
    let log = Arc::clone(log);
    let tag = tag.to_string();
    callback(move |data: &Value| log.lock().unwrap().push(format!("{tag}:{data}")))
}
