use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::trace;

use crate::message::Frame;
use crate::transport::{ALL_EVENTS, FrameHandler, HandlerId};

/// Event name to handler table for [`Transport`](crate::Transport) implementations.
///
/// Handlers for an event run in registration order. Handlers bound to
/// [`ALL_EVENTS`] run after the named ones for every dispatched frame.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(HandlerId, FrameHandler)>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, event: &str, handler: FrameHandler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Returns `true` if the handler was bound.
    pub fn remove(&self, event: &str, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(bound) = handlers.get_mut(event) else {
            return false;
        };

        let before = bound.len();
        bound.retain(|(handler_id, _)| *handler_id != id);
        let removed = bound.len() != before;

        if bound.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    pub fn count(&self, event: &str) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Invoke every handler bound for the frame's event, then the wildcard ones.
    ///
    /// Handlers are called outside the lock so they may bind or unbind freely.
    pub fn dispatch(&self, frame: &Frame) {
        let snapshot: Vec<FrameHandler> = {
            let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            let named = handlers.get(frame.event.as_str()).into_iter().flatten();
            let wildcard = handlers.get(ALL_EVENTS).into_iter().flatten();
            named.chain(wildcard).map(|(_, h)| h.clone()).collect()
        };

        trace!(event = %frame.event, handlers = snapshot.len(), "Dispatching frame");

        for handler in snapshot {
            handler(frame);
        }
    }
}
