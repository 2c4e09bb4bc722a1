//! Error types for the download module.
//!
//! Transport failures, redirect-loop failures and destination I/O failures are
//! kept apart so callers can tell server misconfiguration from network
//! flakiness. Non-2xx HTTP statuses are *not* errors here: they come back as
//! ordinary [`DownloadStatus`](super::DownloadStatus) values.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during conditional downloads.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Connect or read timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The redirect chain exceeded the hop limit.
    #[error("too many redirects requesting {url}: gave up after {hops} hops")]
    TooManyRedirects {
        /// The URL the caller asked for.
        url: String,
        /// Number of hops followed before giving up.
        hops: usize,
    },

    /// A redirect response carried a `Location` that is not a usable URL.
    #[error("invalid redirect from {url} to {location:?}")]
    InvalidRedirect {
        /// The URL that answered with the redirect.
        url: String,
        /// The raw `Location` header value.
        location: String,
    },

    /// File system error while writing the destination or its timestamp.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or not an absolute http(s) URL.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The HTTP client could not be constructed from its configuration.
    #[error("failed to build HTTP client: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The client was closed and no longer hands out connections.
    #[error("HTTP client is closed")]
    ClientClosed,
}

impl DownloadError {
    /// Creates a transport error from a reqwest error, classifying timeouts.
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { url: url.into() }
        } else {
            Self::Network {
                url: url.into(),
                source,
            }
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a redirect-limit error.
    pub fn too_many_redirects(url: impl Into<String>, hops: usize) -> Self {
        Self::TooManyRedirects {
            url: url.into(),
            hops,
        }
    }

    /// Creates an invalid-redirect error.
    pub fn invalid_redirect(url: impl Into<String>, location: impl Into<String>) -> Self {
        Self::InvalidRedirect {
            url: url.into(),
            location: location.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns true for failures a caller may reasonably retry (network, timeout).
    ///
    /// The engine itself never retries; this only classifies.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// URL or path context the source errors don't carry.
