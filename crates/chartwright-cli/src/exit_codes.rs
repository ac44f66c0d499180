//! Standard exit codes for CLI operations
//!
//! Scripts can tell a busy repository (retry later) from a broken setup.

/// General error - unspecified failure
pub const ERROR: u8 = 1;

/// Configuration error - bad config file, manifest, or undefined repository
pub const CONFIG_ERROR: u8 = 2;

/// Chart error - dependency cycle or unknown chart name
pub const CHART_ERROR: u8 = 3;

/// Fetch error - a chart could not be downloaded, built, or packaged
pub const FETCH_ERROR: u8 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: u8 = 5;

/// Lock timeout - another publish holds the repository lock; safe to retry
pub const LOCK_TIMEOUT: u8 = 6;
