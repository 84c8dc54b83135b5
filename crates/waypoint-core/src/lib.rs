//! # waypoint-core
//!
//! The route-state engine for Waypoint.
//!
//! This crate keeps a URL (path segments + query mapping) in sync with a tree
//! of consumers rendered by an external component framework:
//! - consumers read and write route state through instrumented views
//! - every read is recorded and replayed against new states, so a change
//!   only re-renders the consumers whose reads would observe something new
//! - writes are buffered per consumer and committed once per tick as a single
//!   history push or replace
//! - detour traps may veto navigations, error traps may absorb or redirect
//!   rendering errors
//!
//! ## Architectural Constraints
//!
//! - Single-threaded: one router per UI thread, shared through `Rc`
//! - No I/O: rendering, scheduling and history are collaborator traits
//!   (see [`host`]), with in-memory implementations for tests and tooling
//! - No panics: every fallible operation returns `Result<_, RouteError>`

// =============================================================================
// MODULES
// =============================================================================

pub mod binding;
pub mod boundary;
pub mod codec;
pub mod config;
pub mod detour;
pub mod host;
pub mod primitives;
pub mod segments;
pub mod session;
pub mod store;
pub mod sweep;
pub mod traps;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{DetourReason, Observed, Parts, Query, Recovery, RouteError, TrapKind, ViewKind};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use binding::{OpLog, Operation, RouteContainer, RouteView, Selector, ViewObserver};
pub use boundary::Boundary;
pub use codec::{UrlCodec, WebCodec};
pub use config::{KeepQuery, NotFoundHandler, RouterConfig, RouterOptions};
pub use detour::{Detour, LinkActivation, LinkOutcome};
pub use segments::{Segment, SegmentMap, SegmentStore};
pub use session::{LocationWatch, RouteSession};
pub use store::{ConsumerId, HistoryEntry, RouteDiff, Router};
pub use traps::{DetourTrap, ErrorAction, ErrorTrap, Trap};

// =============================================================================
// RE-EXPORTS: Host (from host module)
// =============================================================================

pub use host::{
    HistoryApi, Host, ImmediateRenderHost, LocalHost, LocalScheduler, MemoryHistory, PopEvent,
    QueuedRenderHost, RenderHost, Scheduler, Task, TimerId,
};
