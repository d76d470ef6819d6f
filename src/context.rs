use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::echo::Echo;
use crate::error::EchoError;
use crate::options::EchoOptions;
use crate::subscription::{
    ChannelId, Connection, EchoSubscription, Hold, SubscriptionCallback, SubscriptionRegistry,
    Visibility,
};

/// Caller-owned Echo configuration, lazily built instance and subscription
/// counts, shared by every consumer that should reuse the same connection.
#[derive(Default)]
pub struct EchoContext {
    config: Mutex<Option<EchoOptions>>,
    instance: Mutex<Option<Arc<Echo>>>,
    subscriptions: SubscriptionRegistry,
}

impl EchoContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the configuration, filling unset fields from the environment.
    ///
    /// Any instance built from a previous configuration is disconnected and
    /// its subscription counts are dropped. Holds taken before this call no
    /// longer count against the new instance.
    pub fn configure(&self, options: EchoOptions) {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(options.with_env_defaults());

        // the old instance must be gone before the registry resets, or a
        // concurrent resolve could count a hold against it
        let previous = self
            .instance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.subscriptions.clear();

        if let Some(previous) = previous {
            info!("Echo reconfigured, disconnecting the previous instance");
            previous.disconnect();
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The shared instance, built on first use.
    pub fn echo(&self) -> Result<Arc<Echo>, EchoError> {
        let mut instance = self.instance.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(echo) = instance.as_ref() {
            return Ok(Arc::clone(echo));
        }

        let options = self
            .config
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(EchoError::NotConfigured)?;

        debug!("Creating Echo instance");
        let echo = Arc::new(Echo::new(options)?);
        *instance = Some(Arc::clone(&echo));
        Ok(echo)
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    /// Take a hold on `channel`, subscribing on the first one.
    ///
    /// `Ok(None)` means the connector could not produce the channel.
    pub fn resolve(&self, channel: &ChannelId) -> Result<Option<Connection>, EchoError> {
        Ok(self.hold(channel)?.map(Hold::into_connection))
    }

    /// Like [`resolve`](Self::resolve), keeping the generation of the hold.
    pub(crate) fn hold(&self, channel: &ChannelId) -> Result<Option<Hold>, EchoError> {
        self.echo()?;

        // the instance is fetched again under the registry lock so a
        // concurrent configure cannot pair a new record with an old instance
        Ok(self.subscriptions.resolve(channel, |channel| {
            let echo = self.echo()?;
            match channel.visibility() {
                Visibility::Presence => echo.join(channel.name()).map(Connection::Presence),
                Visibility::Private => echo.private(channel.name()).map(Connection::Private),
                Visibility::Public => echo.channel(channel.name()).map(Connection::Public),
            }
        }))
    }

    /// Give up a hold on `channel`; the last one leaves it.
    ///
    /// With `leave_all` the final release leaves every visibility variant of
    /// the base name instead of just this channel.
    pub fn release(&self, channel: &ChannelId, leave_all: bool) -> Result<(), EchoError> {
        if !self.is_configured() {
            return Err(EchoError::NotConfigured);
        }
        self.release_hold(channel, self.subscriptions.generation(), leave_all)
    }

    /// Release a hold taken in `generation`; stale holds are ignored.
    pub(crate) fn release_hold(
        &self,
        channel: &ChannelId,
        generation: u64,
        leave_all: bool,
    ) -> Result<(), EchoError> {
        let mut failure = None;

        self.subscriptions
            .release(channel, generation, |channel| match self.echo() {
                Ok(echo) if leave_all => echo.leave(channel.name()),
                Ok(echo) => echo.leave_channel(&channel.id()),
                Err(e) => failure = Some(e),
            });

        failure.map_or(Ok(()), Err)
    }

    /// Hold `channel` and call `callback` for each of `events`.
    pub fn subscribe<F>(
        self: &Arc<Self>,
        channel: ChannelId,
        events: &[&str],
        callback: F,
    ) -> Result<EchoSubscription, EchoError>
    where
        F: Fn(&serde_json::Value, &str) + Send + Sync + 'static,
    {
        let callback: SubscriptionCallback = Arc::new(callback);
        EchoSubscription::new(
            Arc::clone(self),
            channel,
            events.iter().map(|e| e.to_string()).collect(),
            callback,
        )
    }

    /// Listen for Eloquent model events on `private-{model}.{identifier}`.
    ///
    /// Event names are taken as fully qualified (`.UserUpdated`).
    pub fn subscribe_model<F>(
        self: &Arc<Self>,
        model: &str,
        identifier: impl fmt::Display,
        events: &[&str],
        callback: F,
    ) -> Result<EchoSubscription, EchoError>
    where
        F: Fn(&serde_json::Value, &str) + Send + Sync + 'static,
    {
        let events: Vec<String> = events
            .iter()
            .map(|e| {
                if e.starts_with('.') {
                    e.to_string()
                } else {
                    format!(".{e}")
                }
            })
            .collect();

        let callback: SubscriptionCallback = Arc::new(callback);
        EchoSubscription::new(
            Arc::clone(self),
            ChannelId::model(model, identifier),
            events,
            callback,
        )
    }
}

impl fmt::Debug for EchoContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EchoContext")
            .field("configured", &self.is_configured())
            .finish_non_exhaustive()
    }
}
