//! Constants for the download module (timeouts, pool sizing, redirects).

use std::time::Duration;

/// Default HTTP connect timeout for the multi-connection preset (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default HTTP read timeout for the multi-connection preset (10 minutes for large archives).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(600);

/// Default total connection cap for the multi-connection preset.
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;

/// Idle pooled connections older than this are evicted.
pub const IDLE_EVICTION_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of redirect hops followed for one logical request.
pub const MAX_REDIRECT_HOPS: usize = 10;

/// Redirect status codes the resolver follows. Everything else is terminal.
pub const FOLLOWED_REDIRECTS: [u16; 4] = [301, 302, 307, 308];
