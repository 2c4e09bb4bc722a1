//! Redirect following as an explicit state machine.
//!
//! The transport is built with automatic redirects disabled; this module
//! decides which statuses to follow ([`FOLLOWED_REDIRECTS`]), resolves
//! relative `Location` values, enforces the hop limit and re-sends the
//! original conditional headers on every hop. Intermediate responses are
//! discarded; only the final one is handed back.

use std::time::SystemTime;

use reqwest::header::{HeaderMap, LAST_MODIFIED, LOCATION};
use reqwest::{Method, StatusCode};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, instrument, warn};
use url::Url;

use super::client::{HttpClient, PooledResponse};
use super::constants::{FOLLOWED_REDIRECTS, MAX_REDIRECT_HOPS};
use super::date;
use super::error::DownloadError;

/// True for the redirect statuses the resolver follows (301, 302, 307, 308).
#[must_use]
pub fn is_followed_redirect(status: StatusCode) -> bool {
    FOLLOWED_REDIRECTS.contains(&status.as_u16())
}

/// Next step after seeing a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hop {
    /// The response is the final one.
    Final,
    /// Re-issue the request against this URL.
    Follow(Url),
}

/// Hop accounting for one logical request.
#[derive(Debug, Clone)]
pub struct RedirectTracker {
    origin: Url,
    current: Url,
    hops: usize,
    max_hops: usize,
}

impl RedirectTracker {
    /// Starts tracking a request to `origin` with the default hop limit.
    #[must_use]
    pub fn new(origin: Url) -> Self {
        Self::with_max_hops(origin, MAX_REDIRECT_HOPS)
    }

    /// Starts tracking with an explicit hop limit.
    #[must_use]
    pub fn with_max_hops(origin: Url, max_hops: usize) -> Self {
        Self {
            current: origin.clone(),
            origin,
            hops: 0,
            max_hops,
        }
    }

    /// URL the next request should go to.
    #[must_use]
    pub fn current(&self) -> &Url {
        &self.current
    }

    /// Redirects followed so far.
    #[must_use]
    pub fn hops(&self) -> usize {
        self.hops
    }

    /// Feeds the status and `Location` of the latest response.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::TooManyRedirects`] when following would exceed the limit
    /// - [`DownloadError::InvalidRedirect`] when `Location` is not an http(s) URL
    pub fn on_response(
        &mut self,
        status: StatusCode,
        location: Option<&str>,
    ) -> Result<Hop, DownloadError> {
        if !is_followed_redirect(status) {
            return Ok(Hop::Final);
        }

        let Some(location) = location else {
            warn!(url = %self.current, %status, "redirect without Location, treating as final");
            return Ok(Hop::Final);
        };

        if self.hops >= self.max_hops {
            return Err(DownloadError::too_many_redirects(
                self.origin.as_str(),
                self.hops,
            ));
        }

        let next = self
            .current
            .join(location)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| DownloadError::invalid_redirect(self.current.as_str(), location))?;

        self.hops += 1;
        self.current = next.clone();
        Ok(Hop::Follow(next))
    }
}

/// Final response of a logical request, after redirects.
#[derive(Debug)]
pub struct ResolvedResponse {
    pub(crate) pooled: PooledResponse,
    final_url: Url,
    hops: usize,
}

impl ResolvedResponse {
    /// Final status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.pooled.response.status()
    }

    /// URL that produced the final response.
    #[must_use]
    pub fn final_url(&self) -> &Url {
        &self.final_url
    }

    /// Redirects followed to get here.
    #[must_use]
    pub fn hops(&self) -> usize {
        self.hops
    }

    /// Final response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.pooled.response.headers()
    }

    /// Parsed `Last-Modified`; `None` when missing or unparseable.
    #[must_use]
    pub fn last_modified(&self) -> Option<SystemTime> {
        date::parse_header(self.headers().get(LAST_MODIFIED))
    }

    pub(crate) fn into_parts(self) -> (reqwest::Response, OwnedSemaphorePermit) {
        self.pooled.into_parts()
    }
}

/// Executes requests, following redirects up to a hop limit.
#[derive(Debug, Clone)]
pub struct RedirectResolver {
    client: HttpClient,
    max_hops: usize,
}

impl RedirectResolver {
    /// Resolver with the default limit of [`MAX_REDIRECT_HOPS`].
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self::with_max_hops(client, MAX_REDIRECT_HOPS)
    }

    /// Resolver with an explicit hop limit.
    #[must_use]
    pub fn with_max_hops(client: HttpClient, max_hops: usize) -> Self {
        Self { client, max_hops }
    }

    /// The client requests go through.
    #[must_use]
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Sends `method` to `url` and follows redirects to the final response.
    ///
    /// `if_modified_since` is re-sent on every hop.
    ///
    /// # Errors
    ///
    /// Transport errors from any hop, plus the redirect errors of
    /// [`RedirectTracker::on_response`].
    #[instrument(level = "debug", skip(self, if_modified_since), fields(url = %url))]
    pub async fn execute(
        &self,
        method: Method,
        url: &Url,
        if_modified_since: Option<SystemTime>,
    ) -> Result<ResolvedResponse, DownloadError> {
        let mut tracker = RedirectTracker::with_max_hops(url.clone(), self.max_hops);

        loop {
            let pooled = self
                .client
                .send(method.clone(), tracker.current(), if_modified_since)
                .await?;
            let status = pooled.response.status();
            let location = pooled
                .response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);

            match tracker.on_response(status, location.as_deref())? {
                Hop::Final => {
                    debug!(%status, hops = tracker.hops(), "resolved final response");
                    return Ok(ResolvedResponse {
                        pooled,
                        final_url: tracker.current().clone(),
                        hops: tracker.hops(),
                    });
                }
                Hop::Follow(next) => {
                    debug!(%status, next = %next, hop = tracker.hops(), "following redirect");
                    // Free the connection slot before the next hop.
                    drop(pooled);
                }
            }
        }
    }
}
