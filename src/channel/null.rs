use serde_json::Value;

use crate::channel::{Callback, Channel, PresenceChannel, PrivateChannel};

/// A channel that never receives anything; used by the `null` broadcaster.
#[derive(Debug, Clone)]
pub struct NullChannel {
    name: String,
}

impl NullChannel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Channel for NullChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscribe(&self) {}

    fn unsubscribe(&self) {}

    fn listen(&self, _event: &str, _callback: Callback) -> &dyn Channel {
        self
    }

    fn stop_listening(&self, _event: &str, _callback: Option<&Callback>) -> &dyn Channel {
        self
    }

    fn subscribed(&self, _callback: Callback) -> &dyn Channel {
        self
    }

    fn error(&self, _callback: Callback) -> &dyn Channel {
        self
    }

    fn unbind(&self) {}
}

impl PrivateChannel for NullChannel {
    fn whisper(&self, _event: &str, _data: Value) -> &dyn PrivateChannel {
        self
    }
}

impl PresenceChannel for NullChannel {
    fn here(&self, _callback: Callback) -> &dyn PresenceChannel {
        self
    }

    fn joining(&self, _callback: Callback) -> &dyn PresenceChannel {
        self
    }

    fn leaving(&self, _callback: Callback) -> &dyn PresenceChannel {
        self
    }
}
