//! Centralized constants for run orchestration
//!
//! Poll and HTTP defaults in one place for easy tuning.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════
// Completion Polling
// ═══════════════════════════════════════════════════════════════

/// Starting poll interval; grown by one increment before every wait
pub const POLL_INTERVAL: Duration = Duration::from_millis(128);

/// Growth of the wait after each status check that found the run running
pub const POLL_INCREMENT: Duration = Duration::from_millis(32);

/// Upper bound on the wait between two status checks
pub const POLL_CEILING: Duration = Duration::from_millis(1024);

/// Maximum number of status checks for one blocking submission
pub const POLL_MAX_ATTEMPTS: u32 = 64;

// ═══════════════════════════════════════════════════════════════
// Engine HTTP Client
// ═══════════════════════════════════════════════════════════════

/// Default engine base URL
pub const DEFAULT_ENGINE_URL: &str = "http://127.0.0.1:3001";

/// Timeout for non-streaming engine requests
pub const ENGINE_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for establishing engine connections
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Header carrying the submitting user's id to the engine
pub const USER_ID_HEADER: &str = "X-Apprun-User-Id";

/// Chunks buffered between the engine stream pump and the relay
pub const STREAM_BUFFER: usize = 64;

// ═══════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════
