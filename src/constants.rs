//! Centralized constants for timings and default configuration.
//!
//! Wire-grammar tokens live next to the codec in [`crate::protocol`], and
//! script-grammar tokens next to the scheduler in [`crate::script`]; this
//! module only holds the knobs that cut across subsystems.

use std::time::Duration;

// ============================================================================
// Connection handling
// ============================================================================

/// How long a connection handler waits for the next request line before
/// re-checking its liveness flag. A cleared flag is honored within one
/// interval; an in-flight call is never interrupted.
pub const CLIENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Backoff between retries after a failed `accept()` (fd exhaustion,
/// conntrack pressure).
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

// ============================================================================
// Host defaults
// ============================================================================

/// Default TCP port for the command server. 5800 is the first port of the
/// range competition field networks leave open for team traffic.
pub const DEFAULT_PORT: u16 = 5800;

/// Default id for the root module assembled by the binary.
pub const DEFAULT_ROOT_ID: &str = "robot";

/// Default scheduler cadence in milliseconds. Device control loops
/// conventionally run at 50 Hz.
pub const DEFAULT_TICK_MS: u64 = 20;

/// [`DEFAULT_TICK_MS`] as a `Duration`, for interval construction.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(DEFAULT_TICK_MS);
