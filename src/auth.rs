use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::EchoError;
use crate::options::AuthOptions;

/// Auth payload returned for a private or presence subscription.
///
/// Both fields are passed to the server untouched.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelAuth {
    pub auth: String,
    #[serde(default)]
    pub channel_data: Option<String>,
}

/// Produces the auth payload for a channel subscription.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, socket_id: &str, channel: &str) -> Result<ChannelAuth, EchoError>;
}

/// Posts `socket_id` and `channel_name` to an HTTP auth endpoint.
pub struct EndpointAuthorizer {
    endpoint: Url,
    auth: AuthOptions,
    http_client: HttpClient,
}

impl EndpointAuthorizer {
    pub fn new(endpoint: Url, auth: AuthOptions) -> Self {
        Self {
            endpoint,
            auth,
            http_client: HttpClient::new(),
        }
    }

    /// Resolve `endpoint` against `base` unless it is already absolute.
    pub fn resolve(base: &Url, endpoint: &str, auth: AuthOptions) -> Result<Self, EchoError> {
        let endpoint = match Url::parse(endpoint) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => base.join(endpoint)?,
            Err(e) => return Err(e.into()),
        };
        Ok(Self::new(endpoint, auth))
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Authorizer for EndpointAuthorizer {
    async fn authorize(&self, socket_id: &str, channel: &str) -> Result<ChannelAuth, EchoError> {
        let mut form: HashMap<&str, &str> = HashMap::new();
        form.insert("socket_id", socket_id);
        form.insert("channel_name", channel);
        for (key, value) in &self.auth.params {
            form.insert(key.as_str(), value.as_str());
        }

        let mut request = self.http_client.post(self.endpoint.clone()).form(&form);
        for (name, value) in &self.auth.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!("Authorizing {} at {}", channel, self.endpoint);

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(EchoError::AuthError(format!(
                "Authentication failed for {}: {}",
                channel, status
            )));
        }

        response
            .json::<ChannelAuth>()
            .await
            .map_err(|e| EchoError::AuthError(format!("Malformed auth response: {}", e)))
    }
}
