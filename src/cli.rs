//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Download a URL to a file, transferring only when it changed.
///
/// The destination's modification time records the server's Last-Modified,
/// so repeated runs with `--mode changed` cost a single conditional request.
#[derive(Parser, Debug)]
#[command(name = "condget")]
#[command(author, version, about)]
pub struct Args {
    /// Absolute http(s) URL to fetch
    pub url: String,

    /// Destination file
    pub dest: PathBuf,

    /// Download policy
    #[arg(short, long, value_enum, default_value_t = Mode::Changed)]
    pub mode: Mode,

    /// Baseline HTTP-date (e.g. "Wed, 04 Aug 2010 08:14:57 GMT"); defaults to the destination's mtime
    #[arg(long)]
    pub since: Option<String>,

    /// Connect timeout in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub connect_timeout_ms: Option<u64>,

    /// Read (socket) timeout in milliseconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub read_timeout_ms: Option<u64>,

    /// Maximum simultaneous connections (1-1000)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=1000))]
    pub max_connections: Option<u16>,

    /// Use a single connection with this timeout (ms) for connect and read
    #[arg(long, value_name = "TIMEOUT_MS", value_parser = clap::value_parser!(u64).range(1..), conflicts_with_all = ["connect_timeout_ms", "read_timeout_ms", "max_connections"])]
    pub single_connection: Option<u64>,

    /// Print a JSON report of the outcome on stdout
    #[arg(long)]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Download policy selected on the command line.
///
/// `always` and `modified-since` exit non-zero on any final status other than
/// 2xx or 304. `changed` answers only "was the file rewritten": error statuses
/// are logged and reported as `changed: false` with exit code 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Always transfer
    Always,
    /// Transfer when the server reports a change after the baseline (304 otherwise)
    ModifiedSince,
    /// Transfer when Last-Modified differs from the baseline in either direction; error statuses exit 0 as unchanged
    Changed,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::ModifiedSince => "modified-since",
            Self::Changed => "changed",
        }
    }
}
