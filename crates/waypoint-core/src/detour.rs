//! # Detour Protocol
//!
//! A detour is a pending navigation that registered traps may veto.
//!
//! 1. Every detour trap is offered a fresh [`Detour`]. A trap that returns
//!    `true` takes part and must later call `proceed()` or `prevent()`.
//! 2. No participant: the navigation is applied synchronously.
//! 3. Otherwise the navigation waits until every participant proceeds. The
//!    first `prevent()` aborts it. A detour dropped without a decision counts
//!    as prevented.
//! 4. Only one detour may be outstanding at a time.
//!
//! Navigation sources: programmatic (`RouteSession::detour`), link activation
//! and history traversal (back/forward).

use crate::store::{Router, RouterCore};
use crate::{DetourReason, Parts, Query, RouteError};
use futures::channel::oneshot;
use futures::future::{self, LocalBoxFuture, try_join_all};
use futures::FutureExt;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;
use url::Url;

/// Resolves once every participating trap approved, or fails with the
/// first refusal.
pub(crate) type PendingDetour = LocalBoxFuture<'static, Result<(), RouteError>>;

// =============================================================================
// DETOUR
// =============================================================================

struct DetourInner {
    url: Url,
    parts: Option<Parts>,
    query: Option<Query>,
    reason: DetourReason,
    source: Option<String>,
    internal: bool,
    decision: RefCell<Option<oneshot::Sender<bool>>>,
}

/// A navigation awaiting approval. Cloning shares the decision.
#[derive(Clone)]
pub struct Detour {
    inner: Rc<DetourInner>,
}

impl std::fmt::Debug for Detour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detour")
            .field("url", &self.inner.url.as_str())
            .field("reason", &self.inner.reason)
            .field("internal", &self.inner.internal)
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl Detour {
    fn new(
        url: Url,
        parts: Option<Parts>,
        query: Option<Query>,
        reason: DetourReason,
        source: Option<String>,
        internal: bool,
    ) -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        let detour = Self {
            inner: Rc::new(DetourInner {
                url,
                parts,
                query,
                reason,
                source,
                internal,
                decision: RefCell::new(Some(tx)),
            }),
        };
        (detour, rx)
    }

    /// Destination URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Destination path segments (internal navigations only).
    #[must_use]
    pub fn parts(&self) -> Option<&Parts> {
        self.inner.parts.as_ref()
    }

    /// Destination query (internal navigations only).
    #[must_use]
    pub fn query(&self) -> Option<&Query> {
        self.inner.query.as_ref()
    }

    /// What triggered the navigation.
    #[must_use]
    pub fn reason(&self) -> DetourReason {
        self.inner.reason
    }

    /// The activated element, for link navigations.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.inner.source.as_deref()
    }

    /// Whether the destination is inside the routed application.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.inner.internal
    }

    /// Whether `proceed()` or `prevent()` was already called.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.inner.decision.borrow().is_none()
    }

    /// Approve the navigation.
    pub fn proceed(&self) -> Result<(), RouteError> {
        self.settle(true)
    }

    /// Veto the navigation.
    pub fn prevent(&self) -> Result<(), RouteError> {
        self.settle(false)
    }

    fn settle(&self, approved: bool) -> Result<(), RouteError> {
        let sender = self
            .inner
            .decision
            .borrow_mut()
            .take()
            .ok_or(RouteError::DetourSettled)?;
        if sender.send(approved).is_err() {
            tracing::trace!(url = %self.inner.url, "detour already decided by another trap");
        }
        Ok(())
    }
}

/// Clears the outstanding flag when the pending detour settles or is dropped.
struct OutstandingGuard(Weak<RouterCore>);

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        if let Some(core) = self.0.upgrade() {
            core.state.borrow_mut().detour_outstanding = false;
        }
    }
}

// =============================================================================
// LINK ACTIVATION
// =============================================================================

/// An anchor activation as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkActivation {
    /// Resolved link destination.
    pub href: Url,
    /// Mouse button; only the primary button (`0`) is routed.
    pub button: i16,
    /// Another handler already cancelled the event.
    pub default_prevented: bool,
    /// The anchor's `target` attribute.
    pub target: Option<String>,
    /// The anchor has a `download` attribute.
    pub download: bool,
    /// Identifies the anchor to detour traps.
    pub source: Option<String>,
}

impl LinkActivation {
    /// A plain primary-button activation of `href`.
    #[must_use]
    pub fn new(href: Url) -> Self {
        Self {
            href,
            button: 0,
            default_prevented: false,
            target: None,
            download: false,
            source: None,
        }
    }

    /// Attach an identifier for the activated element.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    fn is_routable(&self) -> bool {
        self.button == 0
            && !self.default_prevented
            && self.target.as_deref().is_none_or(str::is_empty)
            && !self.download
    }
}

/// What the router did with a link activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Not routed; the host performs its default action.
    Ignored,
    /// Internal navigation applied immediately.
    Navigated,
    /// Waiting for detour traps; applied (or left) once they approve.
    Deferred,
    /// Refused because another detour is outstanding.
    Rejected,
}

impl LinkOutcome {
    /// Whether the host must cancel its default action.
    #[must_use]
    pub fn prevents_default(&self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

// =============================================================================
// ROUTER INTEGRATION
// =============================================================================

impl Router {
    /// Offer a navigation to the detour traps.
    ///
    /// `Ok(None)` means no trap took part and the caller proceeds now.
    pub(crate) fn activate_detour_traps(
        &self,
        reason: DetourReason,
        url: &Url,
        source: Option<&str>,
        internal: bool,
    ) -> Result<Option<PendingDetour>, RouteError> {
        let traps = {
            let state = self.core.state.borrow();
            if state.detour_outstanding {
                return Err(RouteError::DetourOutstanding);
            }
            state.traps.detour_traps()
        };
        if traps.is_empty() {
            return Ok(None);
        }

        let (parts, query) = if internal {
            let (parts, query) = self.parse_url(url)?;
            (Some(parts), Some(query))
        } else {
            (None, None)
        };
        let mut decisions = Vec::new();
        for trap in traps {
            let (detour, decision) = Detour::new(
                url.clone(),
                parts.clone(),
                query.clone(),
                reason,
                source.map(str::to_string),
                internal,
            );
            if trap(&detour) {
                decisions.push(decision);
            }
        }
        if decisions.is_empty() {
            return Ok(None);
        }

        tracing::debug!(%reason, url = %url, participants = decisions.len(), "detour pending");
        self.core.state.borrow_mut().detour_outstanding = true;
        let guard = OutstandingGuard(Rc::downgrade(&self.core));
        let pending = async move {
            let _guard = guard;
            try_join_all(decisions.into_iter().map(|decision| async move {
                match decision.await {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(RouteError::DetourPrevented),
                    Err(oneshot::Canceled) => {
                        tracing::warn!("detour dropped without a decision, treating as prevented");
                        Err(RouteError::DetourPrevented)
                    }
                }
            }))
            .await
            .map(|_| ())
        };
        Ok(Some(pending.boxed_local()))
    }

    /// Whether a detour is waiting for its traps.
    #[must_use]
    pub fn is_detour_outstanding(&self) -> bool {
        self.core.state.borrow().detour_outstanding
    }

    /// Navigate to `url` once the detour traps allow it.
    ///
    /// Resolves to `true` if the navigation was applied. When no trap takes
    /// part the navigation is applied before this returns.
    pub fn detour(&self, url: Url, push: bool) -> LocalBoxFuture<'static, bool> {
        match self.activate_detour_traps(DetourReason::Programmatic, &url, None, true) {
            Err(e) => {
                tracing::debug!(error = %e, "detour refused");
                future::ready(false).boxed_local()
            }
            Ok(None) => future::ready(self.commit_detour(&url, push)).boxed_local(),
            Ok(Some(pending)) => {
                let router = self.clone();
                async move {
                    match pending.await {
                        Ok(()) => router.commit_detour(&url, push),
                        Err(e) => {
                            tracing::debug!(error = %e, url = %url, "detour abandoned");
                            false
                        }
                    }
                }
                .boxed_local()
            }
        }
    }

    fn commit_detour(&self, url: &Url, push: bool) -> bool {
        match self.change(url, Some(push), false) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, url = %url, "detour could not be applied");
                false
            }
        }
    }

    /// Route an anchor activation.
    ///
    /// Internal links (same origin, path under the base path) are applied as
    /// external pushes. Other links are left to the host unless a detour
    /// trap takes part, in which case the host is asked to leave via
    /// [`HistoryApi::assign`](crate::host::HistoryApi::assign) once approved.
    pub fn on_link_activation(&self, link: &LinkActivation) -> LinkOutcome {
        if !link.is_routable() {
            return LinkOutcome::Ignored;
        }
        let url = link.href.clone();
        let (internal, same_route) = {
            let state = self.core.state.borrow();
            let location = &state.location;
            let internal = url.origin() == location.origin()
                && url.path().starts_with(self.config().base_path.as_str());
            (
                internal,
                url.path() == location.path() && url.query() == location.query(),
            )
        };
        if internal && same_route {
            return LinkOutcome::Ignored;
        }

        let pending = match self.activate_detour_traps(
            DetourReason::Link,
            &url,
            link.source.as_deref(),
            internal,
        ) {
            Ok(pending) => pending,
            Err(e) => {
                tracing::debug!(error = %e, url = %url, "link refused");
                return LinkOutcome::Rejected;
            }
        };

        match (internal, pending) {
            (true, None) => {
                if let Err(e) = self.change(&url, Some(true), true) {
                    tracing::warn!(error = %e, url = %url, "link navigation failed");
                }
                LinkOutcome::Navigated
            }
            (false, None) => LinkOutcome::Ignored,
            (internal, Some(pending)) => {
                let router = self.clone();
                self.core.host.scheduler.spawn_local(
                    async move {
                        if pending.await.is_err() {
                            return;
                        }
                        if internal {
                            if let Err(e) = router.change(&url, Some(true), true) {
                                tracing::warn!(error = %e, url = %url, "link navigation failed");
                            }
                        } else if let Some(history) = &router.core.host.history {
                            history.assign(&url);
                        }
                    }
                    .boxed_local(),
                );
                LinkOutcome::Deferred
            }
        }
    }

    /// Handle a history traversal to the entry stored with `index`.
    ///
    /// If detour traps take part, the traversal is undone on the next tick
    /// unless already approved; once approved it is re-applied.
    pub fn on_pop_state(&self, index: usize, url: Url) {
        let waiter = self.core.state.borrow_mut().pop_waiter.take();
        if let Some(waiter) = waiter {
            // our own revert or re-apply
            let _ = waiter.send(());
            return;
        }

        let current = self.history_index();
        let delta = index as isize - current as isize;
        let reason = if delta > 0 {
            DetourReason::Forward
        } else {
            DetourReason::Back
        };
        let pending = match self.activate_detour_traps(reason, &url, None, true) {
            Ok(None) => {
                self.apply_traversal(index, &url);
                return;
            }
            Ok(Some(pending)) => pending,
            Err(e) => future::ready(Err(e)).boxed_local(),
        };

        let reversion: Rc<RefCell<Option<oneshot::Receiver<()>>>> = Rc::default();
        let scheduler = Rc::clone(&self.core.host.scheduler);
        let timer = scheduler.set_timeout(Duration::ZERO, {
            let weak = Rc::downgrade(&self.core);
            let reversion = Rc::clone(&reversion);
            Box::new(move || {
                if let Some(core) = weak.upgrade() {
                    let router = Router::from_core(core);
                    *reversion.borrow_mut() = Some(router.traverse(-delta));
                }
            })
        });

        let router = self.clone();
        scheduler.clone().spawn_local(
            async move {
                if let Err(e) = pending.await {
                    tracing::debug!(error = %e, %reason, "history traversal prevented");
                    return;
                }
                scheduler.clear_timeout(timer);
                router.apply_traversal(index, &url);
                let reverted = reversion.borrow_mut().take();
                if let Some(reverted) = reverted {
                    let _ = reverted.await;
                    let _ = router.traverse(delta).await;
                }
            }
            .boxed_local(),
        );
    }

    fn apply_traversal(&self, index: usize, url: &Url) {
        self.core.state.borrow_mut().history_index = index;
        if let Err(e) = self.change(url, None, true) {
            tracing::warn!(error = %e, url = %url, "history traversal could not be applied");
        }
    }

    /// Move the host history by `delta`; resolves when the resulting pop
    /// event arrives.
    fn traverse(&self, delta: isize) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        match &self.core.host.history {
            Some(history) => {
                self.core.state.borrow_mut().pop_waiter = Some(tx);
                history.go(delta);
            }
            None => {
                let _ = tx.send(());
            }
        }
        rx
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterOptions;
    use crate::host::{LocalHost, Scheduler};
    use crate::store::ConsumerId;
    use crate::traps::Trap;

    fn url(href: &str) -> Url {
        Url::parse(href).expect("url")
    }

    fn router_at(href: &str) -> (LocalHost, Router) {
        let local = LocalHost::new(url(href));
        let router = Router::new(RouterOptions::default(), local.host()).expect("router");
        (local, router)
    }

    /// Registers a trap that keeps every detour it sees.
    fn holding_trap(router: &Router) -> Rc<RefCell<Vec<Detour>>> {
        let held = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&held);
        router.set_trap(
            ConsumerId(99),
            Trap::detour(move |detour| {
                sink.borrow_mut().push(detour.clone());
                true
            }),
        );
        held
    }

    #[test]
    fn settling_twice_fails() {
        let (detour, _rx) = Detour::new(
            url("http://example.test/"),
            None,
            None,
            DetourReason::Programmatic,
            None,
            true,
        );
        assert!(detour.proceed().is_ok());
        assert_eq!(detour.prevent(), Err(RouteError::DetourSettled));
        assert_eq!(detour.proceed(), Err(RouteError::DetourSettled));
    }

    #[test]
    fn detour_without_traps_applies_synchronously() {
        let (_, router) = router_at("http://example.test/");
        let _ = router.detour(url("http://example.test/next"), true);
        assert_eq!(router.parts(), Parts::from(["next"]));
        assert_eq!(router.history().len(), 2);
    }

    #[test]
    fn traps_that_decline_do_not_block() {
        let (_, router) = router_at("http://example.test/");
        router.set_trap(ConsumerId(7), Trap::detour(|_| false));
        let _ = router.detour(url("http://example.test/next"), false);
        assert_eq!(router.parts(), Parts::from(["next"]));
    }

    #[test]
    fn approval_applies_the_navigation() {
        let (local, router) = router_at("http://example.test/");
        let held = holding_trap(&router);
        let applied = Rc::new(RefCell::new(None));
        let out = Rc::clone(&applied);
        let fut = router.detour(url("http://example.test/next"), true);
        local.scheduler.spawn_local(
            async move {
                *out.borrow_mut() = Some(fut.await);
            }
            .boxed_local(),
        );
        local.pump(&router);
        assert!(router.is_detour_outstanding());
        assert_eq!(router.parts(), Parts::new());

        let detour = held.borrow()[0].clone();
        assert_eq!(detour.parts(), Some(&Parts::from(["next"])));
        detour.proceed().expect("proceed");
        local.pump(&router);

        assert_eq!(*applied.borrow(), Some(true));
        assert_eq!(router.parts(), Parts::from(["next"]));
        assert!(!router.is_detour_outstanding());
    }

    #[test]
    fn second_detour_while_outstanding_is_refused() {
        let (local, router) = router_at("http://example.test/");
        let held = holding_trap(&router);
        let first = router.detour(url("http://example.test/a"), true);
        local.scheduler.spawn_local(first.map(|_| ()).boxed_local());
        local.pump(&router);

        assert!(matches!(
            router.activate_detour_traps(
                DetourReason::Programmatic,
                &url("http://example.test/b"),
                None,
                true
            ),
            Err(RouteError::DetourOutstanding)
        ));
        held.borrow()[0].prevent().expect("prevent");
        local.pump(&router);
        assert!(!router.is_detour_outstanding());
    }

    #[test]
    fn dropped_detour_counts_as_prevented() {
        let (local, router) = router_at("http://example.test/");
        let held = holding_trap(&router);
        let result = Rc::new(RefCell::new(None));
        let out = Rc::clone(&result);
        let fut = router.detour(url("http://example.test/a"), true);
        local.scheduler.spawn_local(
            async move {
                *out.borrow_mut() = Some(fut.await);
            }
            .boxed_local(),
        );
        local.pump(&router);
        held.borrow_mut().clear();
        local.pump(&router);

        assert_eq!(*result.borrow(), Some(false));
        assert_eq!(router.parts(), Parts::new());
    }

    #[test]
    fn internal_link_navigates_with_push() {
        let (_, router) = router_at("http://example.test/");
        let outcome = router.on_link_activation(&LinkActivation::new(url("http://example.test/a/b")));
        assert_eq!(outcome, LinkOutcome::Navigated);
        assert!(outcome.prevents_default());
        assert_eq!(router.parts(), Parts::from(["a", "b"]));
        assert_eq!(router.history_index(), 1);
    }

    #[test]
    fn non_primary_and_targeted_links_are_ignored() {
        let (_, router) = router_at("http://example.test/");
        let mut link = LinkActivation::new(url("http://example.test/a"));
        link.button = 1;
        assert_eq!(router.on_link_activation(&link), LinkOutcome::Ignored);

        let mut link = LinkActivation::new(url("http://example.test/a"));
        link.target = Some("_blank".to_string());
        assert_eq!(router.on_link_activation(&link), LinkOutcome::Ignored);

        let same = LinkActivation::new(url("http://example.test/#section"));
        assert_eq!(router.on_link_activation(&same), LinkOutcome::Ignored);
    }

    #[test]
    fn external_link_leaves_after_approval() {
        let (local, router) = router_at("http://example.test/");
        assert_eq!(
            router.on_link_activation(&LinkActivation::new(url("http://elsewhere.test/"))),
            LinkOutcome::Ignored
        );

        let held = holding_trap(&router);
        let outcome = router.on_link_activation(
            &LinkActivation::new(url("http://elsewhere.test/")).with_source("footer"),
        );
        assert_eq!(outcome, LinkOutcome::Deferred);
        let detour = held.borrow()[0].clone();
        assert!(!detour.is_internal());
        assert_eq!(detour.parts(), None);
        assert_eq!(detour.source(), Some("footer"));

        detour.proceed().expect("proceed");
        local.pump(&router);
        assert_eq!(local.history.assigned(), [url("http://elsewhere.test/")]);
    }

    #[test]
    fn back_without_traps_is_applied() {
        let (local, router) = router_at("http://example.test/");
        router
            .change(&url("http://example.test/a"), Some(true), false)
            .expect("push");
        local.go(&router, -1);
        assert_eq!(router.parts(), Parts::new());
        assert_eq!(router.history_index(), 0);
    }

    #[test]
    fn prevented_back_is_reverted() {
        let (local, router) = router_at("http://example.test/");
        router
            .change(&url("http://example.test/a"), Some(true), false)
            .expect("push");
        let held = holding_trap(&router);

        local.go(&router, -1);
        // the host entry was put back while the trap decides
        assert_eq!(local.history.cursor(), 1);
        assert_eq!(held.borrow()[0].reason(), DetourReason::Back);

        held.borrow()[0].prevent().expect("prevent");
        local.settle(&router);
        assert_eq!(router.parts(), Parts::from(["a"]));
        assert_eq!(router.history_index(), 1);
        assert_eq!(local.history.cursor(), 1);
    }

    #[test]
    fn late_approval_reapplies_the_traversal() {
        let (local, router) = router_at("http://example.test/");
        router
            .change(&url("http://example.test/a"), Some(true), false)
            .expect("push");
        let held = holding_trap(&router);

        local.go(&router, -1);
        assert_eq!(local.history.cursor(), 1);

        held.borrow()[0].proceed().expect("proceed");
        local.settle(&router);
        assert_eq!(router.parts(), Parts::new());
        assert_eq!(router.history_index(), 0);
        assert_eq!(local.history.cursor(), 0);
    }
}
