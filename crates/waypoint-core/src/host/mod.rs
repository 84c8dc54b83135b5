//! # Host Collaborators
//!
//! The engine runs inside a host: a component-tree renderer, a browser-like
//! history, and an event loop. Each is a trait so the engine stays free of
//! any particular framework.
//!
//! - [`RenderHost`]: runs dispatch batches under a "may be deferred, but
//!   eventually flushed" primitive.
//! - [`Scheduler`]: microtasks, local futures and timers.
//! - [`HistoryApi`]: `pushState`/`replaceState`/`go` and full-page navigation.
//!
//! The `local` submodule provides in-memory implementations used by tests
//! and the CLI driver.

mod local;

pub use local::{
    ImmediateRenderHost, LocalHost, LocalScheduler, MemoryHistory, PopEvent, QueuedRenderHost,
};

use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::time::Duration;
use url::Url;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Handle for cancelling a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

/// The rendering framework's low-priority update primitive.
pub trait RenderHost {
    /// Run `update` now or later; the host must eventually run it.
    fn start_transition(&self, update: Rc<dyn Fn()>);
}

/// The host event loop.
pub trait Scheduler {
    /// Run `task` after the current synchronous work, before any timer.
    fn queue_microtask(&self, task: Task);

    /// Drive `future` to completion on the local (single) thread.
    fn spawn_local(&self, future: LocalBoxFuture<'static, ()>);

    /// Run `task` once `delay` has elapsed.
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancel a timer. Unknown or fired timers are ignored.
    fn clear_timeout(&self, id: TimerId);
}

/// Browser-like session history.
///
/// Pop events travel the other way: the host calls
/// [`Router::on_pop_state`](crate::Router::on_pop_state) with the index that was
/// stored with the entry.
pub trait HistoryApi {
    /// Add an entry after the current one, discarding forward entries.
    fn push_state(&self, index: usize, url: &Url);

    /// Overwrite the current entry.
    fn replace_state(&self, index: usize, url: &Url);

    /// Move the cursor by `delta` entries; produces a pop event.
    fn go(&self, delta: isize);

    /// Leave the application (full-page navigation).
    fn assign(&self, url: &Url);

    /// URL of the current entry, used when no initial location is configured.
    fn location(&self) -> Option<Url> {
        None
    }
}

/// The set of collaborators a router is bound to.
#[derive(Clone)]
pub struct Host {
    pub render: Rc<dyn RenderHost>,
    pub scheduler: Rc<dyn Scheduler>,
    pub history: Option<Rc<dyn HistoryApi>>,
}

impl Host {
    /// Bind a renderer and scheduler, without history.
    #[must_use]
    pub fn new(render: Rc<dyn RenderHost>, scheduler: Rc<dyn Scheduler>) -> Self {
        Self {
            render,
            scheduler,
            history: None,
        }
    }

    /// Attach a history collaborator.
    #[must_use]
    pub fn with_history(mut self, history: Rc<dyn HistoryApi>) -> Self {
        self.history = Some(history);
        self
    }
}
