use std::fmt;

use tokio::sync::mpsc;

use crate::error::EchoError;
use crate::message::Frame;

/// Lifecycle of a connector's transport.
///
/// `Uninitialized -> Connecting -> Connected <-> Reconnecting`, with
/// `Disconnected` reachable from any live state through an explicit
/// disconnect. Only a new `connect()` leaves `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Uninitialized,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        };
        f.write_str(label)
    }
}

/// Sending half of the WebSocket client's outbound frame queue.
pub(crate) struct OutboundQueue {
    sender: mpsc::UnboundedSender<Frame>,
}

impl OutboundQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn send(&self, frame: Frame) -> Result<(), EchoError> {
        self.sender
            .send(frame)
            .map_err(|e| EchoError::SendError(e.to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn queue_rejects_frames_once_receiver_is_gone() {
        let (queue, receiver) = OutboundQueue::new();
        assert!(queue.send(Frame::new("pusher:ping", json!({}))).is_ok());

        drop(receiver);
        assert!(queue.is_closed());
        assert!(matches!(
            queue.send(Frame::new("pusher:ping", json!({}))),
            Err(EchoError::SendError(_))
        ));
    }

    #[test]
    fn default_status_is_uninitialized() {
        assert_eq!(ConnectionStatus::default(), ConnectionStatus::Uninitialized);
        assert!(!ConnectionStatus::Reconnecting.is_connected());
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
    }
}
