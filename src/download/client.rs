//! HTTP client construction and connection accounting.
//!
//! All transport settings live in one [`ClientConfig`]. The presets mirror the
//! three ways the engine is used in practice: a single connection for one-off
//! fetches, a bounded pool for batch jobs, and a default pool for long-running
//! processes.
//!
//! Automatic redirects are switched off at the transport; following them is
//! the job of [`RedirectResolver`](super::RedirectResolver).

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use reqwest::header::IF_MODIFIED_SINCE;
use reqwest::redirect::Policy;
use reqwest::{Client, Method, Response};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CONNECTIONS, DEFAULT_READ_TIMEOUT, IDLE_EVICTION_INTERVAL,
};
use super::date::format_http_date;
use super::error::DownloadError;
use crate::user_agent;

/// Transport configuration with named, defaulted fields.
///
/// # Default Values
///
/// `ClientConfig::default()` is [`ClientConfig::default_multithreaded`]:
///
/// - `connect_timeout`: 30 seconds
/// - `read_timeout`: 10 minutes
/// - `max_connections`: 100
/// - `max_connections_per_route`: 50
/// - `idle_eviction_interval`: 30 seconds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Time allowed to establish a connection. Zero means no limit.
    pub connect_timeout: Duration,
    /// Time allowed between reads on an established connection. Zero means no limit.
    pub read_timeout: Duration,
    /// Upper bound on connections in use at once, across all hosts.
    pub max_connections: usize,
    /// Upper bound on idle pooled connections kept per host.
    pub max_connections_per_route: usize,
    /// Idle pooled connections are closed after this long.
    pub idle_eviction_interval: Duration,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::default_multithreaded()
    }
}

impl ClientConfig {
    /// One connection; `timeout_millis` bounds both the connect and read phases
    /// (0 disables both limits).
    #[must_use]
    pub fn single_threaded(timeout_millis: u64) -> Self {
        let timeout = Duration::from_millis(timeout_millis);
        Self {
            connect_timeout: timeout,
            read_timeout: timeout,
            max_connections: 1,
            max_connections_per_route: 1,
            idle_eviction_interval: IDLE_EVICTION_INTERVAL,
            user_agent: user_agent::default_user_agent(),
        }
    }

    /// A pool of `max_total_connections`; each host may keep half of them idle.
    #[must_use]
    pub fn multithreaded(
        connect_timeout_millis: u64,
        socket_timeout_millis: u64,
        max_total_connections: usize,
    ) -> Self {
        let max_connections = max_total_connections.max(1);
        Self {
            connect_timeout: Duration::from_millis(connect_timeout_millis),
            read_timeout: Duration::from_millis(socket_timeout_millis),
            max_connections,
            max_connections_per_route: (max_connections / 2).max(1),
            idle_eviction_interval: IDLE_EVICTION_INTERVAL,
            user_agent: user_agent::default_user_agent(),
        }
    }

    /// Preset for long-running batch processes.
    #[must_use]
    pub fn default_multithreaded() -> Self {
        let mut config = Self::multithreaded(0, 0, DEFAULT_MAX_CONNECTIONS);
        config.connect_timeout = DEFAULT_CONNECT_TIMEOUT;
        config.read_timeout = DEFAULT_READ_TIMEOUT;
        config
    }

    /// Replaces the User-Agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Pooled HTTP client with a hard cap on connections in use.
///
/// Clones share the same pool and cap, so one client can be handed to many
/// tasks. The pool is released when the last clone is dropped.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    permits: Arc<Semaphore>,
    config: Arc<ClientConfig>,
}

/// A response together with the connection slot it occupies.
///
/// The slot is returned to the pool when this value is dropped, so keep it
/// alive until the body has been consumed.
#[derive(Debug)]
pub struct PooledResponse {
    pub(crate) response: Response,
    permit: OwnedSemaphorePermit,
}

impl PooledResponse {
    /// The underlying reqwest response.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Splits into the response and the slot guard; hold the guard while reading the body.
    pub(crate) fn into_parts(self) -> (Response, OwnedSemaphorePermit) {
        (self.response, self.permit)
    }
}

impl HttpClient {
    /// Builds a client from an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend or resolver
    /// cannot be initialised.
    #[instrument(level = "debug", skip(config), fields(max_connections = config.max_connections))]
    pub fn new(config: ClientConfig) -> Result<Self, DownloadError> {
        let max_connections = config.max_connections.max(1);
        let per_route = config.max_connections_per_route.clamp(1, max_connections);

        let mut builder = Client::builder();
        if !config.connect_timeout.is_zero() {
            builder = builder.connect_timeout(config.connect_timeout);
        }
        if !config.read_timeout.is_zero() {
            builder = builder.read_timeout(config.read_timeout);
        }

        let client = builder
            .pool_max_idle_per_host(per_route)
            .pool_idle_timeout(config.idle_eviction_interval)
            .redirect(Policy::none())
            .gzip(true)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|source| DownloadError::ClientBuild { source })?;

        debug!(per_route, "HTTP client ready");
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(max_connections)),
            config: Arc::new(config),
        })
    }

    /// Single-connection client; see [`ClientConfig::single_threaded`].
    ///
    /// # Errors
    ///
    /// Same as [`HttpClient::new`].
    pub fn single_threaded(timeout_millis: u64) -> Result<Self, DownloadError> {
        Self::new(ClientConfig::single_threaded(timeout_millis))
    }

    /// Pooled client; see [`ClientConfig::multithreaded`].
    ///
    /// # Errors
    ///
    /// Same as [`HttpClient::new`].
    pub fn multithreaded(
        connect_timeout_millis: u64,
        socket_timeout_millis: u64,
        max_total_connections: usize,
    ) -> Result<Self, DownloadError> {
        Self::new(ClientConfig::multithreaded(
            connect_timeout_millis,
            socket_timeout_millis,
            max_total_connections,
        ))
    }

    /// Pooled client with the default preset.
    ///
    /// # Errors
    ///
    /// Same as [`HttpClient::new`].
    pub fn default_multithreaded() -> Result<Self, DownloadError> {
        Self::new(ClientConfig::default_multithreaded())
    }

    /// The configuration this client was built from.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Number of connection slots currently free.
    #[must_use]
    pub fn available_connections(&self) -> usize {
        self.permits.available_permits()
    }

    /// Stops handing out connections. Requests already holding one complete
    /// normally; later requests fail with [`DownloadError::ClientClosed`].
    pub fn close(&self) {
        self.permits.close();
    }

    /// True once [`close`](Self::close) has been called on any clone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Sends one request without following redirects.
    pub(crate) async fn send(
        &self,
        method: Method,
        url: &Url,
        if_modified_since: Option<SystemTime>,
    ) -> Result<PooledResponse, DownloadError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| DownloadError::ClientClosed)?;

        let mut request = self.client.request(method, url.clone());
        if let Some(since) = if_modified_since {
            request = request.header(IF_MODIFIED_SINCE, format_http_date(since));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::transport(url.as_str(), e))?;

        Ok(PooledResponse {
            response,
            permit,
        })
    }
}
