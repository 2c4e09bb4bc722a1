//! Conditional Download Core Library
//!
//! Keeps local copies of remote files in sync with their HTTP origin while
//! transferring as little as possible. The local file's modification time is
//! the only state: it holds the origin's `Last-Modified`, and the next check
//! sends it back as `If-Modified-Since`.
//!
//! # Architecture
//!
//! Everything lives under [`download`]:
//! - `client` - pooled HTTP transport with connection budget and timeouts
//! - `redirect` - explicit redirect following
//! - `date` - HTTP date parsing and formatting
//! - `freshness` - where the per-file timestamp is kept
//! - `materialize` - body-to-file writes and timestamp stamping
//! - `conditional` - the download policies

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
#[cfg(test)]
pub(crate) mod test_support;
mod user_agent;

// Re-export commonly used types
pub use download::{
    ClientConfig, DownloadError, DownloadStatus, Downloader, FileMtimeStore, FreshnessStore,
    HttpClient, MemoryFreshnessStore, TextResponse, success,
};
