//! High-level entry point: run a statement and get its rows.

use crate::client::Client;
use crate::config::ClientConfig;
use crate::response::ResultStream;
use crate::types::{QueryStatus, QueueryError, QueueryResult};

/// Runs statements to completion and hands back their result streams.
#[derive(Debug, Clone)]
pub struct QueueryClient {
    client: Client,
}

impl QueueryClient {
    /// Create a client over a private reqwest connection pool.
    pub fn new(config: ClientConfig) -> QueueryResult<Self> {
        Ok(Self {
            client: Client::new(config)?,
        })
    }

    /// Create a client configured entirely from the environment.
    pub fn from_env() -> QueueryResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Wrap an already-configured low-level client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Submit `sql`, wait for it, and return its rows.
    ///
    /// A query the service reports as failed becomes
    /// [`QueueryError::QueryFailed`] carrying the service's message.
    pub fn run(&self, sql: &str) -> QueueryResult<ResultStream> {
        let body = self.client.query_and_wait(sql)?;

        if body.status() == &QueryStatus::Failed {
            tracing::warn!(
                "Query ({}) failed: {}",
                body.id(),
                body.error().unwrap_or("no message")
            );
            return Err(QueueryError::QueryFailed {
                status: body.status().clone(),
                message: body.error().map(str::to_string),
            });
        }

        Ok(self.client.stream(body))
    }
}
