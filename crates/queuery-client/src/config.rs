//! Client configuration and resolution.

use std::time::Duration;

use crate::types::{QueueryError, QueueryResult};

/// Environment variable holding the service endpoint.
pub const ENDPOINT_ENV: &str = "QUEUERY_ENDPOINT";
/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "QUEUERY_TOKEN";
/// Environment variable holding the API token secret.
pub const TOKEN_SECRET_ENV: &str = "QUEUERY_TOKEN_SECRET";

/// Default wait timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: i64 = 300;

/// Resolve the service endpoint.
pub fn resolve_endpoint(explicit: Option<&str>) -> QueueryResult<String> {
    if let Some(endpoint) = explicit.filter(|e| !e.is_empty()) {
        return Ok(endpoint.to_string());
    }

    match std::env::var(ENDPOINT_ENV) {
        Ok(endpoint) if !endpoint.is_empty() => Ok(endpoint),
        _ => Err(QueueryError::Configuration(
            "Queuery endpoint is not specified.".to_string(),
        )),
    }
}

fn resolve_optional(explicit: Option<&str>, env: &str) -> Option<String> {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(env).ok())
        .filter(|v| !v.is_empty())
}

/// API credentials sent as HTTP basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub token_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token)
            .field("token_secret", &"***")
            .finish()
    }
}

/// Settings for a [`crate::Client`].
#[derive(Clone)]
pub struct ClientConfig {
    endpoint: String,
    token: Option<String>,
    token_secret: Option<String>,
    /// Seconds to wait for a query to reach a terminal status.
    timeout: i64,
    request_timeout: Option<Duration>,
    enable_cast: bool,
    use_manifest: bool,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &self.token)
            .field("token_secret", &self.token_secret.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .field("request_timeout", &self.request_timeout)
            .field("enable_cast", &self.enable_cast)
            .field("use_manifest", &self.use_manifest)
            .finish()
    }
}

impl ClientConfig {
    /// Create a config for `endpoint` with no credentials and default timeouts.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            token_secret: None,
            timeout: DEFAULT_TIMEOUT_SECS,
            request_timeout: None,
            enable_cast: false,
            use_manifest: false,
        }
    }

    /// Resolve endpoint and credentials, falling back to the environment.
    pub fn resolve(
        endpoint: Option<&str>,
        token: Option<&str>,
        token_secret: Option<&str>,
    ) -> QueueryResult<Self> {
        let mut config = Self::new(resolve_endpoint(endpoint)?);
        config.token = resolve_optional(token, TOKEN_ENV);
        config.token_secret = resolve_optional(token_secret, TOKEN_SECRET_ENV);
        Ok(config)
    }

    /// Resolve everything from the environment.
    pub fn from_env() -> QueueryResult<Self> {
        Self::resolve(None, None, None)
    }

    /// Check the endpoint, falling back to `QUEUERY_ENDPOINT` when it is empty.
    pub fn validate(mut self) -> QueueryResult<Self> {
        self.endpoint = resolve_endpoint(Some(&self.endpoint))?;
        Ok(self)
    }

    pub fn with_token(mut self, token: impl Into<String>, token_secret: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self.token_secret = Some(token_secret.into());
        self
    }

    /// Set only the token. Requests fail until the secret is supplied too.
    pub fn with_token_only(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self.token_secret = None;
        self
    }

    pub fn with_timeout(mut self, seconds: i64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_cast(mut self, enable: bool) -> Self {
        self.enable_cast = enable;
        self
    }

    pub fn with_manifest(mut self, enable: bool) -> Self {
        self.use_manifest = enable;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> i64 {
        self.timeout
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn enable_cast(&self) -> bool {
        self.enable_cast
    }

    /// Whether the service should publish a manifest for each query.
    pub fn enable_metadata(&self) -> bool {
        self.enable_cast || self.use_manifest
    }

    /// Credentials to attach to service requests.
    ///
    /// Supplying only one half of the pair is a configuration error.
    pub fn credentials(&self) -> QueueryResult<Option<Credentials>> {
        match (&self.token, &self.token_secret) {
            (Some(token), Some(token_secret)) => Ok(Some(Credentials {
                token: token.clone(),
                token_secret: token_secret.clone(),
            })),
            (None, None) => Ok(None),
            (Some(_), None) => Err(QueueryError::Configuration(
                "token is set but token_secret is missing".to_string(),
            )),
            (None, Some(_)) => Err(QueueryError::Configuration(
                "token_secret is set but token is missing".to_string(),
            )),
        }
    }

    /// Build an absolute URL under the versioned API root.
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.endpoint.trim_end_matches('/'),
            crate::API_VERSION,
            path.trim_start_matches('/')
        )
    }
}
