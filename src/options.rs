use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::auth::Authorizer;
use crate::connector::Connector;
use crate::error::EchoError;
use crate::transport::Transport;

pub const DEFAULT_NAMESPACE: &str = "App.Events";
pub const DEFAULT_AUTH_ENDPOINT: &str = "/broadcasting/auth";

/// Builds a connector from the options it will be handed.
pub type ConnectorFactory =
    Arc<dyn Fn(&EchoOptions) -> Result<Arc<dyn Connector>, EchoError> + Send + Sync>;

/// Selects the connector an [`Echo`](crate::Echo) instance wraps.
///
/// Names are validated when the facade is constructed, not here, so a
/// configuration file can carry any string.
#[derive(Clone)]
pub enum Broadcaster {
    /// One of `pusher`, `reverb`, `socket.io`, `null`.
    Named(String),
    /// A custom connector type, constructed with the options.
    Factory(ConnectorFactory),
    /// An already constructed custom connector.
    Instance(Arc<dyn Connector>),
}

impl Broadcaster {
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&EchoOptions) -> Result<Arc<dyn Connector>, EchoError> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(factory))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            _ => None,
        }
    }
}

impl From<&str> for Broadcaster {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for Broadcaster {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
            Self::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for Broadcaster {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::Named)
    }
}

/// Opaque credentials forwarded to the auth endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuthOptions {
    pub headers: HashMap<String, String>,
    pub params: HashMap<String, String>,
}

impl AuthOptions {
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "headers": self.headers,
            "params": self.params,
        })
    }
}

/// Configuration for [`Echo`](crate::Echo) and its connector.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoOptions {
    pub broadcaster: Broadcaster,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
    /// Socket.io server location.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub ws_host: Option<String>,
    #[serde(default)]
    pub ws_port: Option<u16>,
    #[serde(default)]
    pub wss_port: Option<u16>,
    #[serde(default)]
    pub ws_path: Option<String>,
    #[serde(default, rename = "forceTLS")]
    pub force_tls: Option<bool>,
    #[serde(default)]
    pub encrypted: Option<bool>,
    #[serde(default)]
    pub enabled_transports: Vec<String>,
    #[serde(default = "default_auth_endpoint")]
    pub auth_endpoint: String,
    #[serde(default)]
    pub auth: AuthOptions,
    #[serde(default = "default_namespace")]
    pub namespace: Option<String>,
    #[serde(skip)]
    pub authorizer: Option<Arc<dyn Authorizer>>,
    #[serde(skip)]
    pub client: Option<Arc<dyn Transport>>,
    /// Unrecognized keys, passed through to the connector untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_auth_endpoint() -> String {
    DEFAULT_AUTH_ENDPOINT.to_string()
}

fn default_namespace() -> Option<String> {
    Some(DEFAULT_NAMESPACE.to_string())
}

impl EchoOptions {
    pub fn new(broadcaster: impl Into<Broadcaster>) -> Self {
        Self {
            broadcaster: broadcaster.into(),
            key: None,
            cluster: None,
            host: None,
            ws_host: None,
            ws_port: None,
            wss_port: None,
            ws_path: None,
            force_tls: None,
            encrypted: None,
            enabled_transports: Vec::new(),
            auth_endpoint: default_auth_endpoint(),
            auth: AuthOptions::default(),
            namespace: default_namespace(),
            authorizer: None,
            client: None,
            extra: Map::new(),
        }
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.to_string());
        self
    }

    pub fn with_cluster(mut self, cluster: &str) -> Self {
        self.cluster = Some(cluster.to_string());
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    pub fn with_ws_host(mut self, host: &str) -> Self {
        self.ws_host = Some(host.to_string());
        self
    }

    pub fn with_ws_port(mut self, port: u16) -> Self {
        self.ws_port = Some(port);
        self
    }

    pub fn with_wss_port(mut self, port: u16) -> Self {
        self.wss_port = Some(port);
        self
    }

    pub fn with_force_tls(mut self, force_tls: bool) -> Self {
        self.force_tls = Some(force_tls);
        self
    }

    pub fn with_auth_endpoint(mut self, endpoint: &str) -> Self {
        self.auth_endpoint = endpoint.to_string();
        self
    }

    pub fn with_auth_header(mut self, name: &str, value: &str) -> Self {
        self.auth.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_namespace(mut self, namespace: Option<&str>) -> Self {
        self.namespace = namespace.map(str::to_string);
        self
    }

    /// Use a pre-built transport client instead of constructing one.
    pub fn with_client(mut self, client: Arc<dyn Transport>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }

    /// TLS unless explicitly turned off through `forceTLS` or `encrypted`.
    pub fn use_tls(&self) -> bool {
        self.force_tls.or(self.encrypted).unwrap_or(true)
    }

    pub fn port(&self) -> u16 {
        if self.use_tls() {
            self.wss_port.unwrap_or(443)
        } else {
            self.ws_port.unwrap_or(80)
        }
    }

    pub fn resolved_ws_host(&self) -> String {
        match (&self.ws_host, &self.cluster) {
            (Some(host), _) => host.clone(),
            (None, Some(cluster)) => format!("ws-{cluster}.pusher.com"),
            (None, None) => "ws-mt1.pusher.com".to_string(),
        }
    }

    /// Fill unset fields with the per-broadcaster defaults from the environment.
    pub fn with_env_defaults(self) -> Self {
        self.with_defaults_from(|name| std::env::var(name).ok())
    }

    /// Fill unset fields with per-broadcaster defaults read through `lookup`.
    ///
    /// Explicitly configured values are never overwritten.
    pub fn with_defaults_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let Some(name) = self.broadcaster.name().map(str::to_string) else {
            return self;
        };

        match name.as_str() {
            "reverb" => {
                let port = lookup("REVERB_PORT").and_then(|p| p.parse().ok());
                self.key = self.key.or_else(|| lookup("REVERB_APP_KEY"));
                self.ws_host = self.ws_host.or_else(|| lookup("REVERB_HOST"));
                self.ws_port = self.ws_port.or(port);
                self.wss_port = self.wss_port.or(port);
                if self.force_tls.is_none() {
                    let scheme = lookup("REVERB_SCHEME").unwrap_or_else(|| "https".to_string());
                    self.force_tls = Some(scheme == "https");
                }
                self.default_transports();
            }
            "pusher" => {
                let port = lookup("PUSHER_PORT").and_then(|p| p.parse().ok());
                self.key = self.key.or_else(|| lookup("PUSHER_APP_KEY"));
                self.cluster = self.cluster.or_else(|| lookup("PUSHER_APP_CLUSTER"));
                self.ws_host = self.ws_host.or_else(|| lookup("PUSHER_HOST"));
                self.ws_port = self.ws_port.or(port);
                self.wss_port = self.wss_port.or(port);
                self.force_tls = self.force_tls.or(Some(true));
                self.default_transports();
            }
            "socket.io" => {
                self.host = self.host.or_else(|| lookup("SOCKET_IO_HOST"));
            }
            _ => {}
        }

        self
    }

    fn default_transports(&mut self) {
        if self.enabled_transports.is_empty() {
            self.enabled_transports = vec!["ws".to_string(), "wss".to_string()];
        }
    }
}

impl fmt::Debug for EchoOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EchoOptions")
            .field("broadcaster", &self.broadcaster)
            .field("key", &self.key)
            .field("cluster", &self.cluster)
            .field("host", &self.host)
            .field("ws_host", &self.ws_host)
            .field("ws_port", &self.ws_port)
            .field("wss_port", &self.wss_port)
            .field("ws_path", &self.ws_path)
            .field("force_tls", &self.force_tls)
            .field("encrypted", &self.encrypted)
            .field("enabled_transports", &self.enabled_transports)
            .field("auth_endpoint", &self.auth_endpoint)
            .field("namespace", &self.namespace)
            .field("authorizer", &self.authorizer.is_some())
            .field("client", &self.client.is_some())
            .field("extra", &self.extra)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_camel_case_options() {
        let options: EchoOptions = serde_json::from_value(json!({
            "broadcaster": "reverb",
            "key": "app-key",
            "wsHost": "localhost",
            "wsPort": 8080,
            "forceTLS": false,
            "enabledTransports": ["ws"],
            "auth": {"headers": {"Authorization": "Bearer token"}},
            "activityTimeout": 120
        }))
        .unwrap();

        assert_eq!(options.broadcaster.name(), Some("reverb"));
        assert_eq!(options.ws_host.as_deref(), Some("localhost"));
        assert_eq!(options.port(), 8080);
        assert!(!options.use_tls());
        assert_eq!(options.auth_endpoint, DEFAULT_AUTH_ENDPOINT);
        assert_eq!(options.namespace.as_deref(), Some(DEFAULT_NAMESPACE));
        assert_eq!(
            options.auth.headers.get("Authorization").map(String::as_str),
            Some("Bearer token")
        );
        assert_eq!(options.extra.get("activityTimeout"), Some(&json!(120)));
    }

    #[test]
    fn null_namespace_disables_prefixing() {
        let options: EchoOptions =
            serde_json::from_value(json!({"broadcaster": "null", "namespace": null})).unwrap();
        assert_eq!(options.namespace, None);
    }

    #[test]
    fn reverb_defaults_fill_only_unset_fields() {
        let env = |name: &str| match name {
            "REVERB_APP_KEY" => Some("env-key".to_string()),
            "REVERB_HOST" => Some("reverb.test".to_string()),
            "REVERB_PORT" => Some("8080".to_string()),
            "REVERB_SCHEME" => Some("http".to_string()),
            _ => None,
        };

        let options = EchoOptions::new("reverb")
            .with_key("explicit-key")
            .with_defaults_from(env);

        assert_eq!(options.key.as_deref(), Some("explicit-key"));
        assert_eq!(options.ws_host.as_deref(), Some("reverb.test"));
        assert_eq!(options.force_tls, Some(false));
        assert_eq!(options.port(), 8080);
        assert_eq!(options.enabled_transports, vec!["ws", "wss"]);
    }

    #[test]
    fn pusher_defaults_force_tls() {
        let options = EchoOptions::new("pusher")
            .with_defaults_from(|name| (name == "PUSHER_APP_CLUSTER").then(|| "eu".to_string()));

        assert_eq!(options.force_tls, Some(true));
        assert_eq!(options.resolved_ws_host(), "ws-eu.pusher.com");
        assert_eq!(options.port(), 443);
    }

    #[test]
    fn socket_io_defaults_read_host() {
        let options = EchoOptions::new("socket.io")
            .with_defaults_from(|name| (name == "SOCKET_IO_HOST").then(|| "io.test".to_string()));
        assert_eq!(options.host.as_deref(), Some("io.test"));
        assert!(options.enabled_transports.is_empty());
    }
}
