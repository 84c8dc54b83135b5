//! # Engine Primitives
//!
//! Hardcoded runtime constants for the Waypoint engine.
//!
//! These values are compiled into the binary and are immutable at runtime.

/// Maximum number of reads one instrumented view may log between render
/// boundaries.
///
/// - Read number `MAX_LOGGED_OPERATIONS + 1` fails with `InfiniteLoopSuspected`.
/// - Catches consumers that read route state in an unbounded loop outside
///   the normal render cycle.
pub const MAX_LOGGED_OPERATIONS: usize = 1000;

/// Highest number of path segments a route may hold.
///
/// Writing past it fails with `TooManyParts` instead of padding.
pub const MAX_PARTS: usize = 1024;

/// Default time budget (milliseconds) before a deferred update batch is
/// flushed directly.
pub const DEFAULT_TRANSITION_LIMIT_MS: u64 = 100;

/// Separator between path segments, and the required first/last character of
/// a base path.
pub const PATH_SEPARATOR: char = '/';

/// Base path used when none is configured.
pub const DEFAULT_BASE_PATH: &str = "/";

/// Separator between alternatives of a literal in a segment pattern.
pub const LITERAL_ALTERNATIVE_SEPARATOR: &str = " | ";
