//! In-memory host: a deterministic event loop, a renderer that runs updates
//! inline or on demand, and a session history with a movable cursor.

use super::{HistoryApi, Host, RenderHost, Scheduler, Task, TimerId};
use crate::Router;
use futures::executor::{LocalPool, LocalSpawner};
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;
use url::Url;

// =============================================================================
// RENDER HOSTS
// =============================================================================

/// Runs every transition immediately.
#[derive(Debug, Default)]
pub struct ImmediateRenderHost;

impl RenderHost for ImmediateRenderHost {
    fn start_transition(&self, update: Rc<dyn Fn()>) {
        update();
    }
}

/// Holds transitions until [`QueuedRenderHost::flush`] is called.
#[derive(Default)]
pub struct QueuedRenderHost {
    pending: RefCell<Vec<Rc<dyn Fn()>>>,
}

impl QueuedRenderHost {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every queued transition. Returns how many ran.
    pub fn flush(&self) -> usize {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        for update in &pending {
            update();
        }
        pending.len()
    }

    /// Number of queued transitions.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Check if any transition waits for a flush.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.pending.borrow().is_empty()
    }
}

impl RenderHost for QueuedRenderHost {
    fn start_transition(&self, update: Rc<dyn Fn()>) {
        self.pending.borrow_mut().push(update);
    }
}

// =============================================================================
// SCHEDULER
// =============================================================================

/// Single-threaded event loop on a virtual clock.
///
/// Microtasks run before futures are polled; timers fire only when the clock
/// is advanced.
pub struct LocalScheduler {
    microtasks: RefCell<VecDeque<Task>>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    timers: RefCell<BTreeMap<(Duration, u64), Task>>,
    now: Cell<Duration>,
    next_timer: Cell<u64>,
    fired: Cell<u64>,
}

impl Default for LocalScheduler {
    fn default() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            microtasks: RefCell::new(VecDeque::new()),
            pool: RefCell::new(pool),
            spawner,
            timers: RefCell::new(BTreeMap::new()),
            now: Cell::new(Duration::ZERO),
            next_timer: Cell::new(0),
            fired: Cell::new(0),
        }
    }
}

impl LocalScheduler {
    /// Create an idle scheduler at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of armed timers.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    fn next_microtask(&self) -> Option<Task> {
        self.microtasks.borrow_mut().pop_front()
    }

    /// Run microtasks and poll futures until neither makes progress.
    /// Timers are not fired.
    pub fn run_until_idle(&self) {
        loop {
            while let Some(task) = self.next_microtask() {
                task();
            }
            self.pool.borrow_mut().run_until_stalled();
            if self.microtasks.borrow().is_empty() {
                break;
            }
        }
    }

    fn next_due(&self, deadline: Duration) -> Option<(Duration, Task)> {
        let mut timers = self.timers.borrow_mut();
        let key = *timers.keys().next()?;
        if key.0 > deadline {
            return None;
        }
        timers.remove(&key).map(|task| (key.0, task))
    }

    /// Move the clock forward by `delta`, firing due timers in order and
    /// settling after each one.
    pub fn advance(&self, delta: Duration) {
        let deadline = self.now.get() + delta;
        self.run_until_idle();
        while let Some((due, task)) = self.next_due(deadline) {
            self.now.set(due);
            self.fired.set(self.fired.get() + 1);
            task();
            self.run_until_idle();
        }
        self.now.set(deadline);
    }

    /// Fire timers that are already due. Returns whether any fired.
    pub fn run_timers(&self) -> bool {
        let before = self.fired.get();
        self.advance(Duration::ZERO);
        self.fired.get() != before
    }
}

impl Scheduler for LocalScheduler {
    fn queue_microtask(&self, task: Task) {
        self.microtasks.borrow_mut().push_back(task);
    }

    fn spawn_local(&self, future: LocalBoxFuture<'static, ()>) {
        if let Err(e) = self.spawner.spawn_local(future) {
            tracing::warn!(error = %e, "local future rejected");
        }
    }

    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        let id = self.next_timer.get();
        self.next_timer.set(id + 1);
        self.timers
            .borrow_mut()
            .insert((self.now.get() + delay, id), task);
        TimerId(id)
    }

    fn clear_timeout(&self, id: TimerId) {
        self.timers.borrow_mut().retain(|(_, timer), _| *timer != id.0);
    }
}

// =============================================================================
// HISTORY
// =============================================================================

/// A history traversal reported back to the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopEvent {
    /// Index stored with the entry that became current.
    pub index: usize,
    /// URL of that entry.
    pub url: Url,
}

/// Session history held in memory.
///
/// `go` moves the cursor and queues a [`PopEvent`]; the host delivers queued
/// events with [`LocalHost::pump`].
#[derive(Debug)]
pub struct MemoryHistory {
    entries: RefCell<Vec<(usize, Url)>>,
    cursor: Cell<usize>,
    pops: RefCell<VecDeque<PopEvent>>,
    assigned: RefCell<Vec<Url>>,
}

impl MemoryHistory {
    /// Start with a single entry for `url`.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            entries: RefCell::new(vec![(0, url)]),
            cursor: Cell::new(0),
            pops: RefCell::new(VecDeque::new()),
            assigned: RefCell::new(Vec::new()),
        }
    }

    /// URL of the current entry.
    #[must_use]
    pub fn current(&self) -> Option<Url> {
        self.entries
            .borrow()
            .get(self.cursor.get())
            .map(|(_, url)| url.clone())
    }

    /// Position of the cursor.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor.get()
    }

    /// All entries as `(stored index, url)`.
    #[must_use]
    pub fn entries(&self) -> Vec<(usize, Url)> {
        self.entries.borrow().clone()
    }

    /// Drain queued pop events.
    pub fn take_pop_events(&self) -> Vec<PopEvent> {
        self.pops.borrow_mut().drain(..).collect()
    }

    /// URLs passed to [`HistoryApi::assign`].
    #[must_use]
    pub fn assigned(&self) -> Vec<Url> {
        self.assigned.borrow().clone()
    }
}

impl HistoryApi for MemoryHistory {
    fn push_state(&self, index: usize, url: &Url) {
        let mut entries = self.entries.borrow_mut();
        let cursor = self.cursor.get();
        entries.truncate(cursor + 1);
        entries.push((index, url.clone()));
        self.cursor.set(entries.len() - 1);
    }

    fn replace_state(&self, index: usize, url: &Url) {
        let mut entries = self.entries.borrow_mut();
        let cursor = self.cursor.get();
        match entries.get_mut(cursor) {
            Some(entry) => *entry = (index, url.clone()),
            None => entries.push((index, url.clone())),
        }
    }

    fn go(&self, delta: isize) {
        let entries = self.entries.borrow();
        let last = entries.len().saturating_sub(1);
        let target = self.cursor.get().saturating_add_signed(delta).min(last);
        if target == self.cursor.get() {
            return;
        }
        self.cursor.set(target);
        if let Some((index, url)) = entries.get(target) {
            self.pops.borrow_mut().push_back(PopEvent {
                index: *index,
                url: url.clone(),
            });
        }
    }

    fn assign(&self, url: &Url) {
        self.assigned.borrow_mut().push(url.clone());
    }

    fn location(&self) -> Option<Url> {
        self.current()
    }
}

// =============================================================================
// LOCAL HOST
// =============================================================================

/// Scheduler, history and renderer bundled for driving a router without a
/// real browser.
#[derive(Clone)]
pub struct LocalHost {
    pub scheduler: Rc<LocalScheduler>,
    pub history: Rc<MemoryHistory>,
    pub render: Rc<dyn RenderHost>,
}

impl LocalHost {
    /// Host starting at `url`, rendering updates immediately.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self::with_render(url, Rc::new(ImmediateRenderHost))
    }

    /// Host starting at `url` with a custom renderer.
    #[must_use]
    pub fn with_render(url: Url, render: Rc<dyn RenderHost>) -> Self {
        Self {
            scheduler: Rc::new(LocalScheduler::new()),
            history: Rc::new(MemoryHistory::new(url)),
            render,
        }
    }

    /// Collaborators for [`Router::new`].
    #[must_use]
    pub fn host(&self) -> Host {
        Host::new(Rc::clone(&self.render), self.scheduler.clone())
            .with_history(self.history.clone())
    }

    /// Run queued work and deliver history events until quiet.
    pub fn pump(&self, router: &Router) {
        loop {
            self.scheduler.run_until_idle();
            let events = self.history.take_pop_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                router.on_pop_state(event.index, event.url);
            }
        }
    }

    /// Like [`pump`](Self::pump), also firing zero-delay timers.
    pub fn settle(&self, router: &Router) {
        loop {
            self.pump(router);
            if !self.scheduler.run_timers() {
                break;
            }
        }
    }

    /// Move the history cursor and settle.
    pub fn go(&self, router: &Router, delta: isize) {
        self.history.go(delta);
        self.settle(router);
    }
}

// =============================================================================
// TESTS
// =============================================================================
