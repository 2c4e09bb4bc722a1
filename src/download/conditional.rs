//! Conditional-GET policy: when to transfer bytes and what counts as "changed".
//!
//! Three flavours share one pipeline (resolve redirects, inspect the final
//! status and `Last-Modified`, materialize on 2xx):
//!
//! - [`Downloader::download`] always transfers.
//! - [`Downloader::download_if_modified_since`] is plain RFC semantics: the
//!   server decides via `If-Modified-Since`.
//! - [`Downloader::download_if_changed_since`] / [`Downloader::download_if_changed`]
//!   are strict: any difference between the server's `Last-Modified` and the
//!   baseline counts as a change, older as well as newer. A local copy whose
//!   timestamp has drifted is therefore refreshed rather than trusted.
//!
//! Equal timestamps (to the second) mean "unchanged". A server that changes
//! content without changing `Last-Modified` is not detected.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use reqwest::{Method, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::HttpClient;
use super::date;
use super::error::DownloadError;
use super::freshness::{FileMtimeStore, FreshnessStore};
use super::materialize::materialize;
use super::redirect::{RedirectResolver, ResolvedResponse};

/// True iff `status` is 2xx. Redirects never reach here as a verdict: they
/// are resolved first.
#[must_use]
pub fn success(status: StatusCode) -> bool {
    status.is_success()
}

/// Final status of a request after redirect resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadStatus {
    /// Final HTTP status code.
    pub code: StatusCode,
    /// URL that produced the final response.
    pub final_url: Url,
    /// Server-reported `Last-Modified`, when present and parseable.
    pub last_modified: Option<SystemTime>,
}

impl DownloadStatus {
    fn from_resolved(resolved: &ResolvedResponse) -> Self {
        Self {
            code: resolved.status(),
            final_url: resolved.final_url().clone(),
            last_modified: resolved.last_modified(),
        }
    }

    /// See [`success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        success(self.code)
    }

    /// Canonical reason phrase, e.g. `"Not Modified"`.
    #[must_use]
    pub fn reason(&self) -> Option<&'static str> {
        self.code.canonical_reason()
    }
}

/// Status and body text of a small document fetched with [`Downloader::get`].
#[derive(Debug, Clone)]
pub struct TextResponse {
    /// Final status after redirects.
    pub status: DownloadStatus,
    /// Decoded body text.
    pub content: String,
}

/// Conditional download engine.
///
/// Cheap to clone; clones share the client's pool and the freshness store.
///
/// # Example
///
/// ```no_run
/// use condget_core::download::{Downloader, HttpClient};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let downloader = Downloader::new(HttpClient::default_multithreaded()?);
/// let changed = downloader
///     .download_if_changed("https://example.org/dwca.zip", Path::new("dwca.zip"))
///     .await?;
/// println!("changed: {changed}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Downloader {
    resolver: RedirectResolver,
    store: Arc<dyn FreshnessStore>,
}

impl Downloader {
    /// Engine that records freshness in destination mtimes.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self::with_store(client, Arc::new(FileMtimeStore))
    }

    /// Engine with a custom freshness store.
    #[must_use]
    pub fn with_store(client: HttpClient, store: Arc<dyn FreshnessStore>) -> Self {
        Self {
            resolver: RedirectResolver::new(client),
            store,
        }
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &HttpClient {
        self.resolver.client()
    }

    /// The freshness store in use.
    #[must_use]
    pub fn store(&self) -> &dyn FreshnessStore {
        self.store.as_ref()
    }

    /// Downloads `url` to `dest` regardless of timestamps.
    ///
    /// The body is written for any 2xx final response and the destination's
    /// timestamp is set from `Last-Modified`. Other statuses leave `dest`
    /// untouched and are returned as-is; check them with [`success`].
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is not an absolute http(s) URL
    /// - The request fails (network error, timeout) or redirects loop
    /// - Writing the destination or its timestamp fails
    #[instrument(skip(self), fields(url = %url))]
    pub async fn download(&self, url: &str, dest: &Path) -> Result<DownloadStatus, DownloadError> {
        let target = parse_target(url)?;
        self.fetch(&target, None, dest).await
    }

    /// Downloads `url` only if the server says it changed after `since`.
    ///
    /// 304 leaves `dest` untouched; 2xx writes and stamps it.
    ///
    /// # Errors
    ///
    /// Same as [`download`](Self::download).
    #[instrument(skip(self), fields(url = %url))]
    pub async fn download_if_modified_since(
        &self,
        url: &str,
        since: SystemTime,
        dest: &Path,
    ) -> Result<DownloadStatus, DownloadError> {
        let target = parse_target(url)?;
        self.fetch(&target, Some(since), dest).await
    }

    /// Downloads `url` if its `Last-Modified` differs from `since` in either
    /// direction. Returns whether `dest` was rewritten.
    ///
    /// With no baseline the download is unconditional. `If-Modified-Since` is
    /// sent as a hint; a 304 is double-checked against the server's reported
    /// `Last-Modified` (from the 304 itself, or a HEAD request when the 304
    /// omits it) so that a server that went back to an older version is still
    /// picked up. A 304 that reveals nothing leaves `dest` untouched.
    ///
    /// # Errors
    ///
    /// Same as [`download`](Self::download).
    #[instrument(skip(self), fields(url = %url))]
    pub async fn download_if_changed_since(
        &self,
        url: &str,
        since: Option<SystemTime>,
        dest: &Path,
    ) -> Result<bool, DownloadError> {
        let target = parse_target(url)?;

        let Some(since) = since else {
            debug!("no baseline, downloading unconditionally");
            return Ok(self.fetch(&target, None, dest).await?.is_success());
        };

        let resolved = self
            .resolver
            .execute(Method::GET, &target, Some(since))
            .await?;
        let code = resolved.status();

        if success(code) {
            return match resolved.last_modified() {
                Some(server) if date::same_second(server, since) => {
                    debug!("Last-Modified equals baseline, discarding body");
                    drop(resolved);
                    self.heal_timestamp(dest, server).await?;
                    Ok(false)
                }
                server => {
                    debug!(?server, "Last-Modified differs from baseline or is missing");
                    materialize(resolved, dest, self.store.as_ref()).await?;
                    Ok(true)
                }
            };
        }

        if code != StatusCode::NOT_MODIFIED {
            warn!(status = %code, final_url = %resolved.final_url(), "conditional download did not succeed");
            return Ok(false);
        }

        let reported = resolved.last_modified();
        drop(resolved);
        let server = match reported {
            Some(server) => Some(server),
            None => self.head_last_modified(&target).await?,
        };

        match server {
            Some(server) if !date::same_second(server, since) => {
                info!(
                    server = %date::format_http_date(server),
                    baseline = %date::format_http_date(since),
                    "server timestamp differs from baseline despite 304, refetching"
                );
                Ok(self.fetch(&target, None, dest).await?.is_success())
            }
            Some(server) => {
                self.heal_timestamp(dest, server).await?;
                Ok(false)
            }
            None => {
                debug!("304 without Last-Modified, keeping local copy");
                Ok(false)
            }
        }
    }

    /// Strict conditional download using `dest`'s own timestamp as baseline.
    ///
    /// A missing destination means an unconditional download, so calling this
    /// repeatedly needs no state beyond the file itself.
    ///
    /// # Errors
    ///
    /// Same as [`download`](Self::download).
    #[instrument(skip(self), fields(url = %url))]
    pub async fn download_if_changed(&self, url: &str, dest: &Path) -> Result<bool, DownloadError> {
        let baseline = self.store.read(dest).await;
        debug!(baseline = ?baseline.map(date::format_http_date), "read local baseline");
        self.download_if_changed_since(url, baseline, dest).await
    }

    /// Fetches a small text document, following redirects.
    ///
    /// # Errors
    ///
    /// URL, transport and redirect errors as for [`download`](Self::download).
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<TextResponse, DownloadError> {
        let target = parse_target(url)?;
        let resolved = self.resolver.execute(Method::GET, &target, None).await?;
        let status = DownloadStatus::from_resolved(&resolved);
        let (response, _permit) = resolved.into_parts();
        let content = response
            .text()
            .await
            .map_err(|e| DownloadError::transport(status.final_url.as_str(), e))?;
        Ok(TextResponse { status, content })
    }

    /// Sends a HEAD request, following redirects.
    ///
    /// # Errors
    ///
    /// URL, transport and redirect errors as for [`download`](Self::download).
    #[instrument(skip(self), fields(url = %url))]
    pub async fn head(&self, url: &str) -> Result<DownloadStatus, DownloadError> {
        let target = parse_target(url)?;
        let resolved = self.resolver.execute(Method::HEAD, &target, None).await?;
        Ok(DownloadStatus::from_resolved(&resolved))
    }

    async fn fetch(
        &self,
        target: &Url,
        since: Option<SystemTime>,
        dest: &Path,
    ) -> Result<DownloadStatus, DownloadError> {
        let resolved = self.resolver.execute(Method::GET, target, since).await?;
        let status = DownloadStatus::from_resolved(&resolved);

        if status.is_success() {
            materialize(resolved, dest, self.store.as_ref()).await?;
        } else if status.code == StatusCode::NOT_MODIFIED {
            debug!(path = %dest.display(), "not modified, keeping local copy");
        } else {
            warn!(status = %status.code, final_url = %status.final_url, "download did not succeed, destination untouched");
        }
        Ok(status)
    }

    /// Server `Last-Modified` from a HEAD request; `None` when not reported.
    async fn head_last_modified(&self, target: &Url) -> Result<Option<SystemTime>, DownloadError> {
        let resolved = self.resolver.execute(Method::HEAD, target, None).await?;
        if !success(resolved.status()) {
            debug!(status = %resolved.status(), "HEAD request did not succeed");
            return Ok(None);
        }
        Ok(resolved.last_modified())
    }

    /// Aligns an existing local copy's timestamp with the server's.
    async fn heal_timestamp(&self, dest: &Path, server: SystemTime) -> Result<(), DownloadError> {
        match self.store.read(dest).await {
            Some(local) if !date::same_second(local, server) => {
                info!(path = %dest.display(), "local timestamp drifted, restamping");
                self.store.write(dest, server).await
            }
            _ => Ok(()),
        }
    }
}

/// Parses `url` and insists on an absolute http(s) URL.
fn parse_target(url: &str) -> Result<Url, DownloadError> {
    Url::parse(url)
        .ok()
        .filter(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.has_host())
        .ok_or_else(|| DownloadError::invalid_url(url))
}
