use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::channel::Callback;
use crate::message::Frame;
use crate::transport::{FrameHandler, HandlerId, Transport};

#[derive(Default)]
struct Tables {
    listeners: HashMap<String, Vec<Callback>>,
    bound: HashMap<String, HandlerId>,
}

/// Per-channel bookkeeping of application callbacks.
///
/// Exactly one transport handler is bound per event name no matter how many
/// callbacks are registered for it; it fans the payload out to the callbacks
/// in registration order.
pub(crate) struct ListenerTable {
    channel: String,
    transport: Arc<dyn Transport>,
    tables: Arc<Mutex<Tables>>,
}

impl ListenerTable {
    pub fn new(channel: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            channel: channel.to_string(),
            transport,
            tables: Arc::new(Mutex::new(Tables::default())),
        }
    }

    /// Register for frames addressed to this channel.
    pub fn on(&self, event: &str, callback: Callback) {
        self.bind(event, callback, true);
    }

    /// Register for a connection-wide event that carries no channel name.
    pub fn on_connection(&self, event: &str, callback: Callback) {
        self.bind(event, callback, false);
    }

    fn bind(&self, event: &str, callback: Callback, scoped: bool) {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);

        tables
            .listeners
            .entry(event.to_string())
            .or_default()
            .push(callback);

        if !tables.bound.contains_key(event) {
            let id = self.transport.on(event, self.handler(event, scoped));
            tables.bound.insert(event.to_string(), id);
        }
    }

    fn handler(&self, event: &str, scoped: bool) -> FrameHandler {
        let tables = Arc::downgrade(&self.tables);
        let channel = self.channel.clone();
        let event = event.to_string();

        Arc::new(move |frame: &Frame| {
            if scoped && frame.channel.as_deref() != Some(channel.as_str()) {
                return;
            }
            let Some(tables) = tables.upgrade() else {
                return;
            };

            let snapshot = tables
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .listeners
                .get(&event)
                .cloned()
                .unwrap_or_default();

            for callback in snapshot {
                // skip callbacks removed by an earlier one in this dispatch
                let active = tables
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .listeners
                    .get(&event)
                    .is_some_and(|list| list.iter().any(|cb| Arc::ptr_eq(cb, &callback)));

                if active {
                    callback(&frame.data);
                }
            }
        })
    }

    /// Remove one callback, or all of them when `callback` is `None`.
    ///
    /// The transport handler goes away with the last callback.
    pub fn unbind_event(&self, event: &str, callback: Option<&Callback>) {
        let handler = {
            let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);

            if let Some(callback) = callback {
                if let Some(list) = tables.listeners.get_mut(event) {
                    list.retain(|cb| !Arc::ptr_eq(cb, callback));
                }
            }

            let empty = tables.listeners.get(event).is_none_or(Vec::is_empty);
            if callback.is_none() || empty {
                tables.listeners.remove(event);
                tables.bound.remove(event)
            } else {
                None
            }
        };

        if let Some(id) = handler {
            self.transport.remove_listener(event, id);
        }
    }

    pub fn unbind(&self) {
        let bound: Vec<(String, HandlerId)> = {
            let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
            tables.listeners.clear();
            tables.bound.drain().collect()
        };

        for (event, id) in bound {
            self.transport.remove_listener(&event, id);
        }
    }

    #[cfg(test)]
    pub fn listener_count(&self, event: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .listeners
            .get(event)
            .map_or(0, Vec::len)
    }

    #[cfg(test)]
    pub fn is_bound(&self, event: &str) -> bool {
        self.tables.lock().unwrap().bound.contains_key(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionStatus;
    use crate::error::EchoError;
    use crate::event::HandlerRegistry;
    use serde_json::{Value, json};

    #[derive(Default)]
    struct LoopbackTransport {
        handlers: HandlerRegistry,
        removed: Mutex<Vec<String>>,
    }

    impl Transport for LoopbackTransport {
        fn connect(&self) -> Result<(), EchoError> {
            Ok(())
        }
        fn send(&self, _frame: Frame) -> Result<(), EchoError> {
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
            None
        }
        fn status(&self) -> ConnectionStatus {
            ConnectionStatus::Connected
        }
        fn disconnect(&self) {}
    }

    fn table() -> (Arc<LoopbackTransport>, ListenerTable) {
        let transport = Arc::new(LoopbackTransport::default());
        let table = ListenerTable::new("orders", transport.clone());
        (transport, table)
    }

    fn counter(hits: &Arc<Mutex<Vec<Value>>>) -> Callback {
        let hits = Arc::clone(hits);
        Arc::new(move |data: &Value| hits.lock().unwrap().push(data.clone()))
    }

    #[test]
    fn binds_one_transport_handler_per_event() {
        let (transport, table) = table();
        let hits = Arc::new(Mutex::new(Vec::new()));

        table.on("shipped", counter(&hits));
        table.on("shipped", counter(&hits));

        assert_eq!(transport.handlers.count("shipped"), 1);
        assert_eq!(table.listener_count("shipped"), 2);
    }

    #[test]
    fn ignores_frames_for_other_channels() {
        let (transport, table) = table();
        let hits = Arc::new(Mutex::new(Vec::new()));
        table.on("shipped", counter(&hits));

        transport
            .handlers
            .dispatch(&Frame::on_channel("shipped", "invoices", json!(1)));
        transport
            .handlers
            .dispatch(&Frame::on_channel("shipped", "orders", json!(2)));

        assert_eq!(*hits.lock().unwrap(), vec![json!(2)]);
    }

    #[test]
    fn connection_events_ignore_channel_scope() {
        let (transport, table) = table();
        let hits = Arc::new(Mutex::new(Vec::new()));
        table.on_connection("connect", counter(&hits));

        transport.handlers.dispatch(&Frame::new("connect", json!(null)));
        assert_eq!(hits.lock().unwrap().len(), 1);
    }

    #[test]
    fn last_removal_unbinds_transport_handler() {
        let (transport, table) = table();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let first = counter(&hits);
        let second = counter(&hits);

        table.on("shipped", first.clone());
        table.on("shipped", second.clone());

        table.unbind_event("shipped", Some(&first));
        assert!(table.is_bound("shipped"));
        assert!(transport.removed.lock().unwrap().is_empty());

        table.unbind_event("shipped", Some(&second));
        assert!(!table.is_bound("shipped"));
        assert_eq!(*transport.removed.lock().unwrap(), vec!["shipped"]);
        assert_eq!(transport.handlers.count("shipped"), 0);
    }

    #[test]
    fn callback_removed_mid_dispatch_is_skipped() {
        let transport = Arc::new(LoopbackTransport::default());
        let table = Arc::new(ListenerTable::new("orders", transport.clone()));
        let hits = Arc::new(Mutex::new(Vec::new()));
        let victim = counter(&hits);

        let remover: Callback = {
            let table = Arc::downgrade(&table);
            let victim = victim.clone();
            Arc::new(move |_: &Value| {
                if let Some(table) = table.upgrade() {
                    table.unbind_event("shipped", Some(&victim));
                }
            })
        };

        table.on("shipped", remover);
        table.on("shipped", victim);

        transport
            .handlers
            .dispatch(&Frame::on_channel("shipped", "orders", json!(1)));
        assert!(hits.lock().unwrap().is_empty());
    }

    #[test]
    fn unbind_removes_everything() {
        let (transport, table) = table();
        let hits = Arc::new(Mutex::new(Vec::new()));
        table.on("a", counter(&hits));
        table.on("b", counter(&hits));

        table.unbind();

        let mut removed = transport.removed.lock().unwrap().clone();
        removed.sort();
        assert_eq!(removed, vec!["a", "b"]);
        assert_eq!(table.listener_count("a"), 0);
    }
}
