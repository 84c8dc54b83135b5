//! # Render Sessions
//!
//! A `RouteSession` is one consumer's handle on the router: its instrumented
//! `parts`/`query` views, its render lifecycle, and its control operations.
//!
//! ## Lifecycle
//!
//! ```text
//! begin_render -> reads/writes through the views -> end_render -> mount
//!      ^                                                              |
//!      +------------------ dispatch (route changed) -----------------+
//! ```
//!
//! ## Mutation Rules
//!
//! - Outside render, writes are buffered and committed once per tick as a
//!   single navigation. Path writes push a history entry by default, query
//!   writes replace; `pushing`/`replacing` override the default.
//! - During render, writes are only allowed inside `replacing`. At the root
//!   the change is applied before `replacing` returns; elsewhere it surfaces
//!   as `RenderInterruption` for the nearest boundary to apply.

use crate::binding::{RouteView, ViewObserver};
use crate::store::{Consumer, ConsumerId, Dispatch, Router, Watch};
use crate::traps::Trap;
use crate::{Parts, Query, RouteError, TrapKind, ViewKind};
use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use url::Url;

// =============================================================================
// SESSION STATE
// =============================================================================

#[derive(Default)]
struct SessionState {
    rendering: bool,
    push_override: Option<bool>,
    push: Option<bool>,
    new_location: Option<Url>,
    scheduled: bool,
    mounted: bool,
    traps: Vec<Trap>,
}

struct SessionInner {
    me: Weak<SessionInner>,
    router: Router,
    id: ConsumerId,
    at_root: bool,
    dispatch: Dispatch,
    parts: RouteView<Parts>,
    query: RouteView<Query>,
    state: RefCell<SessionState>,
}

impl SessionInner {
    fn pending_url(&self) -> Result<Url, RouteError> {
        self.parts
            .with_current(|parts| self.query.with_current(|query| self.router.create_url(parts, query)))
    }

    /// Commit buffered writes as one navigation.
    fn commit(&self) {
        let (url, push) = {
            let mut state = self.state.borrow_mut();
            state.scheduled = false;
            (state.new_location.take(), state.push.take())
        };
        self.parts.clear_shadow();
        self.query.clear_shadow();
        let Some(url) = url else {
            return;
        };
        tracing::debug!(consumer = self.id.0, url = %url, push = ?push, "committing route mutation");
        if let Err(e) = self.router.change(&url, push, false) {
            tracing::error!(consumer = self.id.0, error = %e, "route mutation rejected");
        }
    }

    fn enter_scope(&self, push: bool, name: &'static str) -> Result<OverrideScope<'_>, RouteError> {
        let mut state = self.state.borrow_mut();
        if state.push_override.is_some() || (push && state.rendering) {
            return Err(RouteError::ScopeConflict(name));
        }
        state.push_override = Some(push);
        Ok(OverrideScope(&self.state))
    }
}

/// Resets the push override when a `pushing`/`replacing` scope ends.
struct OverrideScope<'a>(&'a RefCell<SessionState>);

impl Drop for OverrideScope<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().push_override = None;
    }
}

impl ViewObserver for SessionInner {
    fn on_access(&self) -> Result<(), RouteError> {
        if self.at_root && self.state.borrow().rendering {
            if let Some(error) = self.router.last_error() {
                return Err(error);
            }
        }
        Ok(())
    }

    fn before_mutation(&self) -> Result<(), RouteError> {
        let state = self.state.borrow();
        if state.rendering && state.push_override != Some(false) {
            return Err(RouteError::ReplacingRequired);
        }
        Ok(())
    }

    fn on_mutation(&self, kind: ViewKind) -> Result<(), RouteError> {
        let url = self.pending_url()?;
        let location = self.router.location();
        let schedule = {
            let mut state = self.state.borrow_mut();
            if url != location {
                if state.push != Some(true) {
                    state.push = Some(state.push_override.unwrap_or(kind == ViewKind::Path));
                }
                state.new_location = Some(url);
            } else {
                // reverted to the current location
                state.push = None;
                state.new_location = None;
            }
            !std::mem::replace(&mut state.scheduled, true)
        };
        if schedule {
            let me = self.me.clone();
            self.router
                .core
                .host
                .scheduler
                .queue_microtask(Box::new(move || {
                    if let Some(session) = me.upgrade() {
                        session.commit();
                    }
                }));
        }
        Ok(())
    }
}

// =============================================================================
// ROUTE SESSION
// =============================================================================

/// One consumer's connection to the router.
///
/// Dropping the session unmounts it.
pub struct RouteSession {
    inner: Rc<SessionInner>,
}

impl std::fmt::Debug for RouteSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("RouteSession")
            .field("id", &self.inner.id)
            .field("at_root", &self.inner.at_root)
            .field("rendering", &state.rendering)
            .field("mounted", &state.mounted)
            .finish()
    }
}

impl RouteSession {
    fn build(
        router: &Router,
        at_root: bool,
        make_dispatch: impl FnOnce(Weak<SessionInner>) -> Dispatch,
    ) -> Self {
        let id = router.next_consumer_id();
        let inner = Rc::new_cyclic(|me: &Weak<SessionInner>| {
            let observer: Weak<dyn ViewObserver> = me.clone();
            SessionInner {
                me: me.clone(),
                router: router.clone(),
                id,
                at_root,
                dispatch: make_dispatch(me.clone()),
                parts: RouteView::new(Rc::clone(&router.core.parts), observer.clone()),
                query: RouteView::new(Rc::clone(&router.core.query), observer),
                state: RefCell::new(SessionState::default()),
            }
        });
        tracing::trace!(consumer = id.0, at_root, "session created");
        Self { inner }
    }

    /// The session's consumer id.
    #[must_use]
    pub fn id(&self) -> ConsumerId {
        self.inner.id
    }

    /// Whether this is the root consumer.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.inner.at_root
    }

    /// The router this session is attached to.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Instrumented path segments.
    #[must_use]
    pub fn parts(&self) -> &RouteView<Parts> {
        &self.inner.parts
    }

    /// Instrumented query.
    #[must_use]
    pub fn query(&self) -> &RouteView<Query> {
        &self.inner.query
    }

    /// Whether buffered writes wait for the next commit.
    #[must_use]
    pub fn has_pending_change(&self) -> bool {
        self.inner.state.borrow().new_location.is_some()
    }

    // -------------------------------------------------------------------------
    // Render lifecycle
    // -------------------------------------------------------------------------

    /// Start a render: previously recorded reads are forgotten.
    pub fn begin_render(&self) {
        self.inner.parts.clear_log();
        self.inner.query.clear_log();
        self.inner.state.borrow_mut().rendering = true;
    }

    /// Finish a render and schedule garbage collection against the fresh reads.
    pub fn end_render(&self) {
        self.inner.state.borrow_mut().rendering = false;
        self.inner.router.schedule_sweep();
    }

    /// Run `f` as one render of this session.
    pub fn render<T>(&self, f: impl FnOnce(&RouteView<Parts>, &RouteView<Query>) -> T) -> T {
        self.begin_render();
        let output = f(&self.inner.parts, &self.inner.query);
        self.end_render();
        output
    }

    /// Register with the router so route changes dispatch this session.
    pub fn mount(&self) {
        let traps = {
            let mut state = self.inner.state.borrow_mut();
            if state.mounted {
                return;
            }
            state.mounted = true;
            state.traps.clone()
        };
        let inner = &self.inner;
        inner.router.add_consumer(Consumer {
            id: inner.id,
            dispatch: Rc::clone(&inner.dispatch),
            watch: Watch::Route {
                parts: inner.parts.log_handle(),
                query: inner.query.log_handle(),
            },
            at_root: inner.at_root,
        });
        for trap in traps {
            inner.router.set_trap(inner.id, trap);
        }
        tracing::trace!(consumer = inner.id.0, "session mounted");
    }

    /// Unregister from the router. Its traps are removed too.
    pub fn unmount(&self) {
        let was_mounted = std::mem::replace(&mut self.inner.state.borrow_mut().mounted, false);
        if was_mounted {
            self.inner.router.remove_consumer(self.inner.id);
            tracing::trace!(consumer = self.inner.id.0, "session unmounted");
        }
    }

    /// Whether the session is registered with the router.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.inner.state.borrow().mounted
    }

    // -------------------------------------------------------------------------
    // Control operations
    // -------------------------------------------------------------------------

    /// Run `f` with writes committing as history pushes.
    ///
    /// Not allowed during render or inside another scope.
    pub fn pushing<T>(&self, f: impl FnOnce() -> Result<T, RouteError>) -> Result<T, RouteError> {
        let _scope = self.inner.enter_scope(true, "pushing")?;
        f()
    }

    /// Run `f` with writes committing as history replacements.
    ///
    /// During render this is the only way to write; the change is applied
    /// before returning at the root, and raised as `RenderInterruption`
    /// elsewhere.
    pub fn replacing<T>(&self, f: impl FnOnce() -> Result<T, RouteError>) -> Result<T, RouteError> {
        let _scope = self.inner.enter_scope(false, "replacing")?;
        let value = f()?;
        let pending = {
            let mut state = self.inner.state.borrow_mut();
            if state.rendering {
                state.push = None;
                state.new_location.take()
            } else {
                None
            }
        };
        if let Some(url) = pending {
            let router = &self.inner.router;
            if url != router.location() {
                if !self.inner.at_root {
                    return Err(RouteError::RenderInterruption { url });
                }
                router.change(&url, Some(false), false)?;
            }
        }
        Ok(value)
    }

    /// Raise the not-found signal for the current location.
    pub fn not_found<T>(&self) -> Result<T, RouteError> {
        Err(RouteError::NotFound {
            location: self.inner.router.location(),
        })
    }

    /// At the root: re-raise the stored rendering error, if any.
    pub fn rethrow(&self) -> Result<(), RouteError> {
        if !self.inner.at_root {
            return Ok(());
        }
        match self.inner.router.last_error() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Register a trap, replacing this session's previous trap of that kind.
    pub fn trap(&self, trap: Trap) {
        let kind = trap.kind();
        {
            let mut state = self.inner.state.borrow_mut();
            state.traps.retain(|t| t.kind() != kind);
            state.traps.push(trap.clone());
        }
        self.inner.router.set_trap(self.inner.id, trap);
    }

    /// Remove this session's trap of `kind`.
    pub fn remove_trap(&self, kind: TrapKind) -> bool {
        self.inner
            .state
            .borrow_mut()
            .traps
            .retain(|t| t.kind() != kind);
        self.inner.router.remove_trap(self.inner.id, kind)
    }

    /// Navigate to `(parts, query)` once the detour traps allow it.
    ///
    /// Resolves to `false` if the navigation was prevented or refused.
    pub fn detour(
        &self,
        parts: impl Into<Parts>,
        query: impl Into<Query>,
        push: bool,
    ) -> LocalBoxFuture<'static, bool> {
        let router = &self.inner.router;
        match router.create_url(&parts.into(), &query.into()) {
            Ok(url) => router.detour(url, push),
            Err(e) => {
                tracing::warn!(error = %e, "detour target could not be encoded");
                Box::pin(futures::future::ready(false))
            }
        }
    }

    /// Whether `error` belongs to the detour protocol.
    #[must_use]
    pub fn is_detour(error: &RouteError) -> bool {
        error.is_detour()
    }
}

impl Drop for RouteSession {
    fn drop(&mut self) {
        self.unmount();
    }
}

// =============================================================================
// ROUTER ENTRY POINTS
// =============================================================================

/// Keeps a location watcher registered. Dropping it unsubscribes.
pub struct LocationWatch {
    router: Router,
    id: ConsumerId,
}

impl std::fmt::Debug for LocationWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationWatch").field("id", &self.id).finish()
    }
}

impl LocationWatch {
    /// Current location.
    #[must_use]
    pub fn location(&self) -> Url {
        self.router.location()
    }
}

impl Drop for LocationWatch {
    fn drop(&mut self) {
        self.router.remove_consumer(self.id);
    }
}

impl Router {
    /// Create the root session. `dispatch` schedules a re-render of the root.
    pub fn attach_root(&self, dispatch: impl Fn() + 'static) -> RouteSession {
        RouteSession::build(self, true, |_| -> Dispatch { Rc::new(dispatch) })
    }

    /// Create a session for a nested consumer.
    pub fn subscribe(&self, dispatch: impl Fn() + 'static) -> RouteSession {
        RouteSession::build(self, false, |_| -> Dispatch { Rc::new(dispatch) })
    }

    /// Create a mounted session for sequential, non-rendering code.
    ///
    /// Notification only clears its recorded reads.
    pub fn sequential_session(&self) -> RouteSession {
        let session = RouteSession::build(self, false, |me| -> Dispatch {
            Rc::new(move || {
                if let Some(inner) = me.upgrade() {
                    inner.parts.clear_log();
                    inner.query.clear_log();
                }
            })
        });
        session.mount();
        session
    }

    /// Dispatch `dispatch` on every location change.
    pub fn watch_location(&self, dispatch: impl Fn() + 'static) -> LocationWatch {
        let id = self.next_consumer_id();
        self.add_consumer(Consumer {
            id,
            dispatch: Rc::new(dispatch),
            watch: Watch::Location,
            at_root: false,
        });
        LocationWatch {
            router: self.clone(),
            id,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
