//! Low-level orchestration against the queuery HTTP API.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::poll::{polling_interval, Clock, SystemClock};
use crate::response::ResultStream;
use crate::types::{QueueryError, QueueryResult, ResultBody};

/// HTTP status the service answers a successful submission with.
const STATUS_CREATED: u16 = 201;

/// Field selector always requested when fetching query status.
const DEFAULT_FIELDS: &str = "__default__";

/// Submits statements and polls their status.
#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client with its own reqwest connection pool.
    ///
    /// An empty endpoint falls back to `QUEUERY_ENDPOINT`; with neither set
    /// construction fails with [`QueueryError::Configuration`].
    pub fn new(config: ClientConfig) -> QueueryResult<Self> {
        let config = config.validate()?;
        let transport = ReqwestTransport::new(config.request_timeout())?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client over an existing transport.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> QueueryResult<Self> {
        Ok(Self {
            config: config.validate()?,
            transport,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock the wait loop sleeps on.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Submit a statement. The service must answer `201 Created`.
    pub fn submit(&self, sql: &str) -> QueueryResult<ResultBody> {
        tracing::info!("Sending select statement to queuery");

        let mut request = HttpRequest::post(self.config.api_url("queries")).form("q", sql);
        if self.config.enable_metadata() {
            request = request.form("enable_metadata", "true");
        }

        let resp = self.send(request)?.error_for_status()?;
        if resp.status != STATUS_CREATED {
            return Err(QueueryError::Protocol(resp.status));
        }

        let body = ResultBody::from_json(&resp.body)?;
        tracing::info!("Query {} submitted (status: {})", body.id(), body.status());
        Ok(body)
    }

    /// Fetch the current state of query `id`.
    pub fn fetch_status(&self, id: u64) -> QueueryResult<ResultBody> {
        let mut fields = vec![DEFAULT_FIELDS];
        if self.config.enable_metadata() {
            fields.push("manifest_file_url");
        }

        let request = HttpRequest::get(self.config.api_url(&format!("queries/{id}")))
            .form("fields", &fields.join(","));

        let resp = self.send(request)?.error_for_status()?;
        ResultBody::from_json(&resp.body)
    }

    /// Poll query `id` until it succeeds or fails.
    ///
    /// Gives up with [`QueueryError::Timeout`] once the configured timeout has
    /// elapsed. Transport failures end the wait immediately.
    pub fn wait(&self, id: u64) -> QueueryResult<ResultBody> {
        let timeout_secs = self.config.timeout();
        if timeout_secs < 0 {
            return Err(QueueryError::Configuration(format!(
                "timeout should be a non-negative number of seconds, got {timeout_secs}"
            )));
        }
        let deadline = Duration::from_secs(timeout_secs.unsigned_abs());

        tracing::info!("Waiting for the query ({id}) to complete");
        let started = self.clock.now();
        let mut attempt: u32 = 1;

        loop {
            let body = self.fetch_status(id)?;

            if body.status().is_terminal() {
                tracing::info!("Query ({id}) completed with status {}", body.status());
                return Ok(body);
            }

            let elapsed = self.clock.now().duration_since(started);
            if elapsed >= deadline {
                tracing::warn!(
                    "Query ({id}) still {} after {}s; giving up",
                    body.status(),
                    elapsed.as_secs()
                );
                return Err(QueueryError::Timeout { id, timeout_secs });
            }

            let interval = polling_interval(attempt);
            tracing::debug!(
                "Query ({id}) is {}; checking again in {}s",
                body.status(),
                interval.as_secs()
            );
            self.clock.sleep(interval);
            attempt = attempt.saturating_add(1);
        }
    }

    /// Submit `sql` and wait for it to reach a terminal status.
    pub fn query_and_wait(&self, sql: &str) -> QueueryResult<ResultBody> {
        let submitted = self.submit(sql)?;
        self.wait(submitted.id())
    }

    /// Wrap `body` in a result stream sharing this client's transport.
    pub fn stream(&self, body: ResultBody) -> ResultStream {
        ResultStream::new(body, Arc::clone(&self.transport), self.config.enable_cast())
    }

    fn send(&self, request: HttpRequest) -> QueueryResult<HttpResponse> {
        let request = request.basic_auth(self.config.credentials()?);
        tracing::debug!("{:?} {}", request.method, request.url);
        self.transport.send(&request)
    }
}
