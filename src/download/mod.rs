//! Conditional HTTP download engine.
//!
//! Fetches remote resources to local files, transferring bytes only when the
//! remote copy changed, and records the server's `Last-Modified` as the local
//! file's modification time so the next run can ask again cheaply.
//!
//! # Features
//!
//! - Pooled, bounded connections (single- or multi-connection presets)
//! - Explicit redirect following (301/302/307/308, at most 10 hops) that
//!   keeps `If-Modified-Since` on every hop
//! - Streaming writes through a temporary file, renamed into place
//! - Strict "changed in either direction" mode that repairs drifted local
//!   timestamps
//! - Tolerant `Last-Modified` parsing (RFC 1123, RFC 850, asctime, legacy zones)
//!
//! # Example
//!
//! ```no_run
//! use condget_core::download::{Downloader, HttpClient};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::new(HttpClient::single_threaded(10_000)?);
//! let status = downloader
//!     .download("https://example.org/vocabulary/rank.xml", Path::new("rank.xml"))
//!     .await?;
//! println!("HTTP {}", status.code);
//! # Ok(())
//! # }
//! ```

mod client;
mod conditional;
mod constants;
pub mod date;
mod error;
mod freshness;
mod materialize;
mod redirect;

pub use client::{ClientConfig, HttpClient, PooledResponse};
pub use conditional::{DownloadStatus, Downloader, TextResponse, success};
pub use constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CONNECTIONS, DEFAULT_READ_TIMEOUT, FOLLOWED_REDIRECTS,
    IDLE_EVICTION_INTERVAL, MAX_REDIRECT_HOPS,
};
pub use date::{DateParseError, format_http_date, parse_http_date};
pub use error::DownloadError;
pub use freshness::{FileMtimeStore, FreshnessStore, MemoryFreshnessStore};
pub use materialize::{MaterializedFile, materialize};
pub use redirect::{Hop, RedirectResolver, RedirectTracker, ResolvedResponse, is_followed_redirect};

// Note: no module-local Result alias; signatures spell out `Result<T, DownloadError>`.
