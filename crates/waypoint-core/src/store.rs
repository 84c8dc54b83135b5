//! # Route Store
//!
//! The `Router` owns the single source of truth for one routed application:
//! - canonical `parts` and `query`, mutated in place so views without a
//!   shadow see updates immediately
//! - the current location and a mirror of the session history
//! - the registered consumers, their operation logs, and their traps
//! - the last unhandled rendering error
//!
//! ## Change Flow
//!
//! ```text
//! change(url) -> apply_change -> RouteDiff -> notify_consumers
//!                     |                             |
//!               HistoryApi push/replace     replay each consumer's log,
//!                                           dispatch the affected ones
//!                                           through the transition gate
//! ```
//!
//! ## Borrowing Rule
//!
//! Host callbacks and user callbacks are never invoked while the store state
//! is borrowed: every method copies what it needs, releases the borrow, then
//! calls out.

use crate::binding::OpLog;
use crate::config::{RouterConfig, RouterOptions};
use crate::host::{Host, TimerId};
use crate::traps::{ErrorAction, Trap, TrapRegistry};
use crate::{Parts, Query, Recovery, RouteError, TrapKind};
use futures::channel::oneshot;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use url::Url;

// =============================================================================
// CONSUMERS
// =============================================================================

/// Identifies one registered consumer (render session or location watcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(pub(crate) u64);

/// Schedules a re-render of one consumer.
pub(crate) type Dispatch = Rc<dyn Fn()>;

/// What a consumer depends on.
#[derive(Clone)]
pub(crate) enum Watch {
    /// Everything: notified on every change.
    Location,
    /// Whatever its logged reads observed.
    Route {
        parts: Rc<RefCell<OpLog<Parts>>>,
        query: Rc<RefCell<OpLog<Query>>>,
    },
}

pub(crate) struct Consumer {
    pub(crate) id: ConsumerId,
    pub(crate) dispatch: Dispatch,
    pub(crate) watch: Watch,
    pub(crate) at_root: bool,
}

impl Watch {
    fn is_affected(&self, diff: RouteDiff, parts: &Parts, query: &Query) -> bool {
        match self {
            Watch::Location => true,
            Watch::Route {
                parts: parts_log,
                query: query_log,
            } => {
                (diff.path_changed && parts_log.borrow().is_result_different(parts))
                    || (diff.query_changed && query_log.borrow().is_result_different(query))
            }
        }
    }
}

// =============================================================================
// STORE STATE
// =============================================================================

/// Which dimensions a change actually modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteDiff {
    pub path_changed: bool,
    pub query_changed: bool,
}

impl RouteDiff {
    /// Check if neither dimension changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.path_changed && !self.query_changed
    }
}

/// One entry of the router's history mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Position in the session history, stored with the host entry.
    pub index: usize,
    pub href: String,
}

pub(crate) struct StoreState {
    pub(crate) location: Url,
    pub(crate) history: Vec<HistoryEntry>,
    pub(crate) history_index: usize,
    pub(crate) consumers: Vec<Consumer>,
    pub(crate) removed: Vec<Consumer>,
    pub(crate) traps: TrapRegistry,
    pub(crate) last_error: Option<RouteError>,
    pub(crate) detour_outstanding: bool,
    pub(crate) root_dispatch: Option<Dispatch>,
    pub(crate) pop_waiter: Option<oneshot::Sender<()>>,
    pub(crate) sweep_scheduled: bool,
    next_consumer: u64,
    transition_timer: Option<TimerId>,
}

impl StoreState {
    fn new(origin: Url) -> Self {
        Self {
            history: vec![HistoryEntry {
                index: 0,
                href: String::new(),
            }],
            location: origin,
            history_index: 0,
            consumers: Vec::new(),
            removed: Vec::new(),
            traps: TrapRegistry::default(),
            last_error: None,
            detour_outstanding: false,
            root_dispatch: None,
            pop_waiter: None,
            sweep_scheduled: false,
            next_consumer: 0,
            transition_timer: None,
        }
    }
}

pub(crate) struct RouterCore {
    pub(crate) options: RouterOptions,
    pub(crate) host: Host,
    pub(crate) parts: Rc<RefCell<Parts>>,
    pub(crate) query: Rc<RefCell<Query>>,
    pub(crate) state: RefCell<StoreState>,
}

// =============================================================================
// ROUTER
// =============================================================================

/// Handle to a route store. Cloning shares the store.
#[derive(Clone)]
pub struct Router {
    pub(crate) core: Rc<RouterCore>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.borrow();
        f.debug_struct("Router")
            .field("location", &state.location.as_str())
            .field("consumers", &state.consumers.len())
            .field("history_index", &state.history_index)
            .finish()
    }
}

impl Router {
    /// Create a router bound to `host`.
    ///
    /// The initial location is `config.location`, or the host history's
    /// current entry. It is decoded as an external URL and written back to
    /// the history as entry `0`.
    pub fn new(options: RouterOptions, host: Host) -> Result<Self, RouteError> {
        options.config.validate()?;
        let location = match options.config.initial_location()? {
            Some(url) => url,
            None => host
                .history
                .as_ref()
                .and_then(|history| history.location())
                .ok_or_else(|| {
                    RouteError::Config(
                        "no initial location: set `location` or attach a history".to_string(),
                    )
                })?,
        };
        if location.cannot_be_a_base() {
            return Err(RouteError::InvalidUrl(format!(
                "{} has no hierarchical path",
                location
            )));
        }

        let mut origin = location.clone();
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);

        let router = Self {
            core: Rc::new(RouterCore {
                options,
                host,
                parts: Rc::new(RefCell::new(Parts::new())),
                query: Rc::new(RefCell::new(Query::new())),
                state: RefCell::new(StoreState::new(origin)),
            }),
        };
        router.apply_change(&location, Some(false), true)?;
        tracing::debug!(location = %router.location(), "router initialised");
        Ok(router)
    }

    pub(crate) fn from_core(core: Rc<RouterCore>) -> Self {
        Self { core }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Current location.
    #[must_use]
    pub fn location(&self) -> Url {
        self.core.state.borrow().location.clone()
    }

    /// Snapshot of the canonical path segments.
    #[must_use]
    pub fn parts(&self) -> Parts {
        self.core.parts.borrow().clone()
    }

    /// Snapshot of the canonical query.
    #[must_use]
    pub fn query(&self) -> Query {
        self.core.query.borrow().clone()
    }

    /// Settings the router was created with.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.core.options.config
    }

    /// The history mirror.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.core.state.borrow().history.clone()
    }

    /// Position of the current entry in the history mirror.
    #[must_use]
    pub fn history_index(&self) -> usize {
        self.core.state.borrow().history_index
    }

    /// Error waiting to be rethrown by the root consumer.
    #[must_use]
    pub fn last_error(&self) -> Option<RouteError> {
        self.core.state.borrow().last_error.clone()
    }

    /// Number of registered consumers.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.core.state.borrow().consumers.len()
    }

    /// Number of registered traps of `kind`.
    #[must_use]
    pub fn trap_count(&self, kind: TrapKind) -> usize {
        self.core.state.borrow().traps.count(kind)
    }

    // -------------------------------------------------------------------------
    // Codec
    // -------------------------------------------------------------------------

    /// Build the URL for `(parts, query)`, resolved against the location.
    pub fn create_url(&self, parts: &Parts, query: &Query) -> Result<Url, RouteError> {
        let state = self.core.state.borrow();
        self.core
            .options
            .codec
            .create_url(&state.location, parts, query, self.config())
    }

    /// Decode `url` into `(parts, query)`.
    pub fn parse_url(&self, url: &Url) -> Result<(Parts, Query), RouteError> {
        self.core.options.codec.parse_url(url, self.config())
    }

    /// Resolve `href` against the current location.
    pub fn resolve(&self, href: &str) -> Result<Url, RouteError> {
        Ok(self.core.state.borrow().location.join(href)?)
    }

    // -------------------------------------------------------------------------
    // State transitions
    // -------------------------------------------------------------------------

    /// Apply `url` to the store without notifying anyone.
    ///
    /// - A dimension is decoded only if its raw URL component differs from
    ///   the current location, or if `external` is set.
    /// - Containers are updated in place and only if structurally different.
    /// - When `external`, the stored location is regenerated from the decoded
    ///   state so it is canonical.
    /// - `push`: `Some(true)` adds a history entry, `Some(false)` overwrites
    ///   the current one, `None` leaves history alone.
    pub fn apply_change(
        &self,
        url: &Url,
        push: Option<bool>,
        external: bool,
    ) -> Result<RouteDiff, RouteError> {
        let core = &self.core;
        let config = self.config();
        let (path_differs, query_differs) = {
            let state = core.state.borrow();
            (
                external || url.path() != state.location.path(),
                external || url.query() != state.location.query(),
            )
        };
        let new_parts = if path_differs {
            Some(core.options.codec.parse_parts(url, config)?)
        } else {
            None
        };
        let new_query = if query_differs {
            Some(core.options.codec.parse_query(url, config)?)
        } else {
            None
        };

        let mut diff = RouteDiff::default();
        if let Some(new_parts) = new_parts {
            let mut parts = core.parts.borrow_mut();
            if *parts != new_parts {
                parts.replace_with(&new_parts);
                diff.path_changed = true;
            }
        }
        if let Some(new_query) = new_query {
            let mut query = core.query.borrow_mut();
            if *query != new_query {
                query.replace_with(&new_query);
                diff.query_changed = true;
            }
        }

        let href = if external {
            let parts = core.parts.borrow();
            let query = core.query.borrow();
            core.options.codec.create_url(url, &parts, &query, config)?
        } else {
            url.clone()
        };

        let record = {
            let mut state = core.state.borrow_mut();
            state.location = href.clone();
            push.map(|push| {
                let index = state.history_index + usize::from(push);
                let entry = HistoryEntry {
                    index,
                    href: href.to_string(),
                };
                if push {
                    state.history.truncate(index);
                    state.history.push(entry);
                } else if let Some(slot) = state.history.get_mut(index) {
                    *slot = entry;
                } else {
                    state.history.push(entry);
                }
                state.history_index = index;
                (push, index)
            })
        };
        if let (Some((push, index)), Some(history)) = (record, &core.host.history) {
            if push {
                history.push_state(index, &href);
            } else {
                history.replace_state(index, &href);
            }
        }

        tracing::debug!(
            url = %href,
            push = ?push,
            external,
            path_changed = diff.path_changed,
            query_changed = diff.query_changed,
            "route change applied"
        );
        Ok(diff)
    }

    /// Re-render every consumer whose recorded reads would now observe
    /// something different.
    ///
    /// A pending error forces every consumer to re-render and is cleared.
    /// Dispatch stops after the root consumer, which re-renders the rest.
    pub fn notify_consumers(&self, diff: RouteDiff) {
        let (forced, candidates) = {
            let mut state = self.core.state.borrow_mut();
            let forced = state.last_error.take().is_some();
            let candidates: Vec<(Watch, Dispatch, bool)> = state
                .consumers
                .iter()
                .map(|c| (c.watch.clone(), Rc::clone(&c.dispatch), c.at_root))
                .collect();
            (forced, candidates)
        };
        let batch: Vec<(Dispatch, bool)> = {
            let parts = self.core.parts.borrow();
            let query = self.core.query.borrow();
            candidates
                .into_iter()
                .filter(|(watch, _, _)| forced || watch.is_affected(diff, &parts, &query))
                .map(|(_, dispatch, at_root)| (dispatch, at_root))
                .collect()
        };
        tracing::trace!(affected = batch.len(), "consumers notified");
        if batch.is_empty() {
            // every read log is current
            self.schedule_sweep();
        } else {
            self.start_transition(batch);
        }
    }

    /// Apply `url` and notify consumers.
    pub fn change(&self, url: &Url, push: Option<bool>, external: bool) -> Result<(), RouteError> {
        let diff = self.apply_change(url, push, external)?;
        self.notify_consumers(diff);
        Ok(())
    }

    /// Resolve `href`, then [`change`](Self::change) to it as an external URL.
    pub fn navigate(&self, href: &str, push: bool) -> Result<(), RouteError> {
        let url = self.resolve(href)?;
        self.change(&url, Some(push), true)
    }

    /// Run `batch` through the host's transition primitive, with a watchdog
    /// that flushes it directly once the transition limit elapses.
    fn start_transition(&self, batch: Vec<(Dispatch, bool)>) {
        let done = Rc::new(Cell::new(false));
        let update: Rc<dyn Fn()> = {
            let done = Rc::clone(&done);
            Rc::new(move || {
                if done.replace(true) {
                    return;
                }
                for (dispatch, at_root) in &batch {
                    dispatch();
                    if *at_root {
                        break;
                    }
                }
            })
        };

        let host = &self.core.host;
        let previous = self.core.state.borrow_mut().transition_timer.take();
        if let Some(previous) = previous {
            host.scheduler.clear_timeout(previous);
        }
        host.render.start_transition(Rc::clone(&update));
        if done.get() {
            return;
        }

        let weak = Rc::downgrade(&self.core);
        let limit = self.config().transition_limit();
        let id = host.scheduler.set_timeout(
            limit,
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    core.state.borrow_mut().transition_timer = None;
                }
                if !done.get() {
                    tracing::debug!(limit_ms = limit.as_millis(), "transition limit reached");
                    update();
                }
            }),
        );
        self.core.state.borrow_mut().transition_timer = Some(id);
    }

    // -------------------------------------------------------------------------
    // Errors
    // -------------------------------------------------------------------------

    /// Decide what happens to a rendering error.
    ///
    /// - `RenderInterruption` applies its URL as a replace and resumes.
    /// - Other errors are offered to not-found traps (404 only), then error
    ///   traps, then the 404 correction callback (404 only).
    /// - Unhandled errors are stored and the root consumer is re-rendered so
    ///   it can rethrow them.
    pub fn report_error(&self, error: RouteError) -> Recovery {
        tracing::debug!(error = %error, "route error reported");
        if let RouteError::RenderInterruption { url } = &error {
            return match self.change(url, Some(false), false) {
                Ok(()) => Recovery::Resume,
                Err(e) => self.escalate(e),
            };
        }
        match self.activate_error_traps(&error) {
            Ok(Some(recovery)) => recovery,
            Ok(None) => self.escalate(error),
            Err(e) => self.escalate(e),
        }
    }

    fn activate_error_traps(&self, error: &RouteError) -> Result<Option<Recovery>, RouteError> {
        let traps = self.core.state.borrow().traps.error_traps(error);
        for trap in traps {
            match trap(error) {
                ErrorAction::Pass => {}
                ErrorAction::Absorb => return Ok(Some(Recovery::Absorbed)),
                ErrorAction::Resume => return Ok(Some(Recovery::Resume)),
                ErrorAction::Redirect { parts, query } => {
                    self.redirect(&parts, &query)?;
                    return Ok(Some(Recovery::Resume));
                }
            }
        }
        if error.is_not_found()
            && let Some(handler) = &self.core.options.on_404
            && let Some((parts, query)) = handler(&self.parts(), &self.query())
        {
            self.redirect(&parts, &query)?;
            return Ok(Some(Recovery::Resume));
        }
        Ok(None)
    }

    fn redirect(&self, parts: &Parts, query: &Query) -> Result<(), RouteError> {
        let url = self.create_url(parts, query)?;
        tracing::debug!(url = %url, "error corrected by redirect");
        self.change(&url, Some(false), false)
    }

    fn escalate(&self, error: RouteError) -> Recovery {
        tracing::warn!(error = %error, "route error escalated to root");
        let root = {
            let mut state = self.core.state.borrow_mut();
            state.last_error = Some(error);
            state.root_dispatch.clone()
        };
        if let Some(root) = root {
            root();
        }
        Recovery::Escalated
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    pub(crate) fn next_consumer_id(&self) -> ConsumerId {
        let mut state = self.core.state.borrow_mut();
        state.next_consumer += 1;
        ConsumerId(state.next_consumer)
    }

    pub(crate) fn add_consumer(&self, consumer: Consumer) {
        let mut state = self.core.state.borrow_mut();
        if consumer.at_root {
            state.root_dispatch = Some(Rc::clone(&consumer.dispatch));
        }
        state.consumers.push(consumer);
    }

    pub(crate) fn remove_consumer(&self, id: ConsumerId) {
        let mut state = self.core.state.borrow_mut();
        state.traps.remove_owner(id);
        let Some(position) = state.consumers.iter().position(|c| c.id == id) else {
            return;
        };
        let consumer = state.consumers.remove(position);
        if consumer.at_root {
            state.root_dispatch = None;
        }
        if matches!(consumer.watch, Watch::Route { .. }) {
            state.removed.push(consumer);
        }
    }

    pub(crate) fn set_trap(&self, owner: ConsumerId, trap: Trap) {
        self.core.state.borrow_mut().traps.set(owner, trap);
    }

    pub(crate) fn remove_trap(&self, owner: ConsumerId, kind: TrapKind) -> bool {
        self.core.state.borrow_mut().traps.remove(owner, kind)
    }
}

// =============================================================================
// TESTS
// =============================================================================
