//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - stack configuration or imported outputs are invalid
pub const VALIDATION_ERROR: i32 = 2;

/// Reference error - an upstream stack or one of its outputs is missing
pub const REFERENCE_ERROR: i32 = 3;

/// Graph error - duplicate names, dangling references or cycles
pub const GRAPH_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
