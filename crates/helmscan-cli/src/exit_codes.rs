//! Process exit codes
//!
//! Per-resource check errors never change the exit code; only failures that
//! stop the scan do. Values follow sysexits.h and shell conventions where
//! they apply.

/// Scan completed, whatever the mix of exists / absent / error rows
pub const SUCCESS: i32 = 0;

/// Unexpected failure (runtime setup, output encoding)
pub const ERROR: i32 = 1;

/// Release or requested revision not found
pub const NOT_FOUND: i32 = 2;

/// Release payload could not be decoded
pub const DECODE_ERROR: i32 = 3;

/// Release manifest could not be parsed at all
pub const PARSE_ERROR: i32 = 4;

/// Cluster unreachable or rejected a release lookup
pub const CLUSTER_ERROR: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;

/// Interrupted by Ctrl-C (128 + SIGINT)
pub const INTERRUPTED: i32 = 130;
