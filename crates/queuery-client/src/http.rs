//! HTTP transport used to reach the queuery service and result storage.
//!
//! The client only depends on [`HttpTransport`]; [`ReqwestTransport`] is the
//! default implementation over a pooled blocking reqwest client.

use std::time::Duration;

use crate::config::Credentials;
use crate::types::{QueueryError, QueueryResult};

const USER_AGENT: &str = concat!("queuery-client-rs/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// An outgoing request. Form fields are sent url-encoded in the body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub form: Vec<(String, String)>,
    pub credentials: Option<Credentials>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            form: Vec::new(),
            credentials: None,
        }
    }

    /// Append a form field.
    pub fn form(mut self, name: &str, value: &str) -> Self {
        self.form.push((name.to_string(), value.to_string()));
        self
    }

    /// Attach basic-auth credentials, if any.
    pub fn basic_auth(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Look up a form field by name.
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Response to an [`HttpRequest`].
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Requested URL.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into [`QueueryError::Transport`].
    pub fn error_for_status(self) -> QueueryResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(QueueryError::Transport {
                status: self.status,
                url: self.url,
            })
        }
    }
}

/// Blocking request/response capability.
///
/// Implementations return `Ok` for every HTTP status; only connection-level
/// failures are errors. Status handling belongs to the caller.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> QueueryResult<HttpResponse>;
}

/// [`HttpTransport`] over a pooled `reqwest::blocking::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Build a private connection pool. `None` disables the per-request timeout.
    pub fn new(request_timeout: Option<Duration>) -> QueueryResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| QueueryError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Reuse an existing client and its connection pool.
    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> QueueryResult<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        if let Some(creds) = &request.credentials {
            builder = builder.basic_auth(&creds.token, Some(&creds.token_secret));
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let resp = builder.send().map_err(|e| {
            QueueryError::Http(format!(
                "{} {}: {e}",
                method_name(request.method),
                request.url
            ))
        })?;
        let status = resp.status().as_u16();
        let body = resp.bytes().map_err(|e| {
            QueueryError::Http(format!("failed to read body from {}: {e}", request.url))
        })?;

        Ok(HttpResponse {
            url: request.url.clone(),
            status,
            body: body.to_vec(),
        })
    }
}

fn method_name(method: Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::Post => "POST",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = HttpRequest::post("http://localhost/v1/queries")
            .form("q", "select 1")
            .form("enable_metadata", "true");
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.form_value("q"), Some("select 1"));
        assert_eq!(req.form_value("enable_metadata"), Some("true"));
        assert_eq!(req.form_value("fields"), None);
        assert!(req.credentials.is_none());
    }

    #[test]
    fn test_error_for_status() {
        let ok = HttpResponse::new("http://localhost", 201, "{}");
        assert!(ok.error_for_status().is_ok());

        let err = HttpResponse::new("http://localhost/x", 503, "")
            .error_for_status()
            .unwrap_err();
        assert!(matches!(err, QueueryError::Transport { status: 503, ref url } if url == "http://localhost/x"));
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new(Some(Duration::from_secs(5))).is_ok());
        assert!(ReqwestTransport::new(None).is_ok());
    }
}
