//! # Protocol Tier Tests (T0-T6)
//!
//! End-to-end scenarios against a router driven by the local host.
//!
//! ## Tiers
//! - T0: Codec Round-Trip
//! - T1: Diff Suppression
//! - T2: Push/Replace Defaults
//! - T3: Detour Veto
//! - T4: Runaway Guard
//! - T5: Garbage Collection
//! - T6: Error Protocol

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use url::Url;
use waypoint_core::{
    LocalHost, Parts, Query, RouteError, Router, RouterConfig, RouterOptions,
};

fn url(href: &str) -> Url {
    Url::parse(href).expect("url")
}

fn router_with(href: &str, config: RouterConfig) -> (LocalHost, Router) {
    let local = LocalHost::new(url(href));
    let router = Router::new(RouterOptions::from_config(config), local.host()).expect("router");
    (local, router)
}

fn router_at(href: &str) -> (LocalHost, Router) {
    router_with(href, RouterConfig::default())
}

/// Dispatch callback that counts how often it ran.
fn counter() -> (Rc<Cell<usize>>, impl Fn() + 'static) {
    let count = Rc::new(Cell::new(0));
    let inner = Rc::clone(&count);
    (count, move || inner.set(inner.get() + 1))
}

// =============================================================================
// TIER T0: CODEC ROUND-TRIP
// =============================================================================

mod t0_codec {
    use super::*;
    use waypoint_core::{UrlCodec, WebCodec};

    /// T0.1: Route state survives create + parse under a base path.
    #[test]
    fn round_trip_under_base_path() {
        let config = RouterConfig::new().with_base_path("/app/");
        let parts = Parts::from(["users", "J. Doe"]);
        let query = Query::from([("tab", "a&b"), ("page", "3")]);

        let created = WebCodec
            .create_url(&url("http://example.test/app/"), &parts, &query, &config)
            .expect("create");
        assert!(created.path().starts_with("/app/"));
        let (p, q) = WebCodec.parse_url(&created, &config).expect("parse");
        assert_eq!(p, parts);
        assert_eq!(q, query);
    }

    /// T0.2: External URLs are normalised to the trailing-slash policy.
    #[test]
    fn external_urls_are_normalised() {
        let (_, router) = router_with(
            "http://example.test/a/b",
            RouterConfig::new().with_trailing_slash(true),
        );
        assert_eq!(router.location().as_str(), "http://example.test/a/b/");
        assert_eq!(router.parts(), Parts::from(["a", "b"]));
    }

    /// T0.3: A host-like segment after an empty one stays in the path.
    #[test]
    fn host_like_segment_cannot_change_origin() {
        let (local, router) = router_at("http://example.test/");
        let editor = router.sequential_session();
        editor.parts().set(1usize, "evil.test").expect("set");
        local.pump(&router);

        assert_eq!(router.location().host_str(), Some("example.test"));
        assert_eq!(router.parts(), Parts::from(["", "evil.test"]));
    }

    /// T0.4: Writing past the segment limit fails and leaves the route alone.
    #[test]
    fn oversized_segment_index_is_refused() {
        let (local, router) = router_at("http://example.test/a");
        let editor = router.sequential_session();
        let err = editor.parts().set(usize::MAX, "x").expect_err("refused");
        assert!(matches!(err, RouteError::TooManyParts { .. }));
        local.pump(&router);
        assert_eq!(router.parts(), Parts::from(["a"]));
        assert_eq!(router.history().len(), 1);
    }
}

// =============================================================================
// TIER T1: DIFF SUPPRESSION
// =============================================================================

mod t1_diff_suppression {
    use super::*;

    /// T1.1: A consumer reading parts[0] ignores parts[1] changes.
    #[test]
    fn unrelated_segment_change_is_suppressed() {
        let (local, router) = router_at("http://example.test/hello/world");
        let (renders, dispatch) = counter();
        let consumer = router.subscribe(dispatch);
        consumer.render(|parts, _| parts.get(0usize)).expect("read");
        consumer.mount();

        let editor = router.sequential_session();
        editor.parts().set(1usize, "there").expect("set");
        local.pump(&router);
        assert_eq!(router.parts(), Parts::from(["hello", "there"]));
        assert_eq!(renders.get(), 0);

        editor.parts().set(0usize, "bye").expect("set");
        local.pump(&router);
        assert_eq!(renders.get(), 1);
    }

    /// T1.2: Query changes do not reach a consumer that only read parts.
    #[test]
    fn query_change_does_not_reach_path_reader() {
        let (local, router) = router_at("http://example.test/a");
        let (renders, dispatch) = counter();
        let consumer = router.subscribe(dispatch);
        consumer.render(|parts, _| parts.to_vec()).expect("read");
        consumer.mount();

        router.navigate("/a?x=1", false).expect("navigate");
        local.pump(&router);
        assert_eq!(renders.get(), 0);
    }

    /// T1.3: Without a root consumer every affected consumer is dispatched.
    #[test]
    fn all_affected_consumers_dispatched_without_root() {
        let (_, router) = router_at("http://example.test/a");
        let (first, dispatch_first) = counter();
        let (second, dispatch_second) = counter();
        let a = router.subscribe(dispatch_first);
        let b = router.subscribe(dispatch_second);
        for session in [&a, &b] {
            session.render(|parts, _| parts.get(0usize)).expect("read");
            session.mount();
        }

        router.navigate("/b", true).expect("navigate");
        assert_eq!((first.get(), second.get()), (1, 1));
    }

    /// T1.4: The batch stops at the root consumer.
    #[test]
    fn batch_halts_at_root() {
        let (_, router) = router_at("http://example.test/a");
        let (root_renders, dispatch_root) = counter();
        let (child_renders, dispatch_child) = counter();
        let root = router.attach_root(dispatch_root);
        let child = router.subscribe(dispatch_child);
        root.render(|parts, _| parts.get(0usize)).expect("read");
        child.render(|parts, _| parts.get(0usize)).expect("read");
        root.mount();
        child.mount();

        router.navigate("/b", true).expect("navigate");
        assert_eq!(root_renders.get(), 1);
        assert_eq!(child_renders.get(), 0);
    }
}

// =============================================================================
// TIER T2: PUSH/REPLACE DEFAULTS
// =============================================================================

mod t2_push_replace {
    use super::*;

    /// T2.1: Path-only mutation pushes.
    #[test]
    fn path_mutation_pushes() {
        let (local, router) = router_at("http://example.test/");
        let session = router.sequential_session();
        session.parts().push("a").expect("push");
        local.pump(&router);
        assert_eq!(router.history().len(), 2);
        assert_eq!(local.history.entries().len(), 2);
    }

    /// T2.2: Query-only mutation replaces.
    #[test]
    fn query_mutation_replaces() {
        let (local, router) = router_at("http://example.test/");
        let session = router.sequential_session();
        session.query().set("q", "1").expect("set");
        local.pump(&router);
        assert_eq!(router.history().len(), 1);
        assert_eq!(local.history.current(), Some(url("http://example.test/?q=1")));
    }

    /// T2.3: Path + query in one batch pushes, in either order.
    #[test]
    fn mixed_batch_pushes() {
        let (local, router) = router_at("http://example.test/");
        let session = router.sequential_session();
        session.query().set("q", "1").expect("set");
        session.parts().push("a").expect("push");
        session.query().set("r", "2").expect("set");
        local.pump(&router);
        assert_eq!(router.history().len(), 2);
        assert_eq!(router.location().as_str(), "http://example.test/a?q=1&r=2");
    }

    /// T2.4: Changing a value and restoring it produces nothing.
    #[test]
    fn idempotent_revert() {
        let (local, router) = router_at("http://example.test/a?x=1");
        let (renders, dispatch) = counter();
        let consumer = router.subscribe(dispatch);
        consumer
            .render(|parts, query| -> Result<_, RouteError> {
                Ok((parts.to_vec()?, query.entries()?))
            })
            .expect("read");
        consumer.mount();
        let (changes, on_change) = counter();
        let _watch = router.watch_location(on_change);

        let editor = router.sequential_session();
        editor.parts().set(0usize, "b").expect("set");
        editor.query().set("x", "2").expect("set");
        editor.parts().set(0usize, "a").expect("set");
        editor.query().set("x", "1").expect("set");
        local.pump(&router);

        assert_eq!(changes.get(), 0);
        assert_eq!(renders.get(), 0);
        assert_eq!(router.history().len(), 1);
    }
}

// =============================================================================
// TIER T3: DETOUR VETO
// =============================================================================

mod t3_detour {
    use super::*;
    use waypoint_core::{
        Detour, DetourReason, LinkActivation, LinkOutcome, RouteSession, Scheduler, Trap,
    };

    /// T3.1: prevent() keeps the location, a later proceed() moves it.
    #[test]
    fn veto_then_approval() {
        let (local, router) = router_at("http://example.test/hello");
        let guard = router.subscribe(|| {});
        guard.mount();
        let pending: Rc<RefCell<Option<Detour>>> = Rc::default();
        let sink = Rc::clone(&pending);
        guard.trap(Trap::detour(move |detour| {
            *sink.borrow_mut() = Some(detour.clone());
            true
        }));

        let navigator = router.sequential_session();
        let outcome = Rc::new(Cell::new(None));

        for approve in [false, true] {
            let out = Rc::clone(&outcome);
            let fut = navigator.detour(["somewhere"], Query::new(), true);
            local.scheduler.spawn_local(Box::pin(async move {
                out.set(Some(fut.await));
            }));
            local.pump(&router);

            let detour = pending.borrow_mut().take().expect("announced");
            assert_eq!(detour.reason(), DetourReason::Programmatic);
            assert_eq!(detour.parts(), Some(&Parts::from(["somewhere"])));
            if approve {
                detour.proceed().expect("proceed");
            } else {
                detour.prevent().expect("prevent");
            }
            local.pump(&router);
            assert_eq!(outcome.get(), Some(approve));
        }
        assert_eq!(router.location().as_str(), "http://example.test/somewhere");
    }

    /// T3.2: All participants must approve.
    #[test]
    fn any_refusal_aborts() {
        let (local, router) = router_at("http://example.test/hello");
        let held: Rc<RefCell<Vec<Detour>>> = Rc::default();
        let mut guards = Vec::new();
        for _ in 0..2 {
            let guard = router.subscribe(|| {});
            guard.mount();
            let sink = Rc::clone(&held);
            guard.trap(Trap::detour(move |detour| {
                sink.borrow_mut().push(detour.clone());
                true
            }));
            guards.push(guard);
        }

        let navigator = router.sequential_session();
        let fut = navigator.detour(["somewhere"], Query::new(), true);
        local.scheduler.spawn_local(Box::pin(async move {
            let _ = fut.await;
        }));
        local.pump(&router);

        held.borrow()[0].proceed().expect("proceed");
        local.pump(&router);
        assert!(router.is_detour_outstanding());
        held.borrow()[1].prevent().expect("prevent");
        local.pump(&router);
        assert!(!router.is_detour_outstanding());
        assert_eq!(router.location().as_str(), "http://example.test/hello");
    }

    /// T3.3: Back navigation under a trap is reverted and re-applied
    /// symmetrically.
    #[test]
    fn history_traversal_is_symmetric() {
        let (local, router) = router_at("http://example.test/");
        router.navigate("/one", true).expect("navigate");
        router.navigate("/two", true).expect("navigate");

        let guard = router.subscribe(|| {});
        guard.mount();
        let held: Rc<RefCell<Option<Detour>>> = Rc::default();
        let sink = Rc::clone(&held);
        guard.trap(Trap::detour(move |detour| {
            *sink.borrow_mut() = Some(detour.clone());
            true
        }));

        local.go(&router, -2);
        assert_eq!(local.history.cursor(), 2);
        let detour = held.borrow_mut().take().expect("announced");
        assert_eq!(detour.reason(), DetourReason::Back);

        detour.proceed().expect("proceed");
        local.settle(&router);
        assert_eq!(router.parts(), Parts::new());
        assert_eq!(router.history_index(), 0);
        assert_eq!(local.history.cursor(), 0);
    }

    /// Starts a programmatic detour to `/somewhere` that a trap holds open.
    fn hold_detour(
        local: &LocalHost,
        router: &Router,
    ) -> (RouteSession, Rc<RefCell<Vec<Detour>>>) {
        let guard = router.subscribe(|| {});
        guard.mount();
        let held: Rc<RefCell<Vec<Detour>>> = Rc::default();
        let sink = Rc::clone(&held);
        guard.trap(Trap::detour(move |detour| {
            sink.borrow_mut().push(detour.clone());
            true
        }));

        let navigator = router.sequential_session();
        let fut = navigator.detour(["somewhere"], Query::new(), true);
        local.scheduler.spawn_local(Box::pin(async move {
            let _ = fut.await;
        }));
        local.pump(router);
        assert!(router.is_detour_outstanding());
        (guard, held)
    }

    /// T3.4: A link activated while a detour is pending is rejected.
    #[test]
    fn link_during_pending_detour_is_rejected() {
        let (local, router) = router_at("http://example.test/hello");
        let (_guard, held) = hold_detour(&local, &router);

        let link = LinkActivation::new(url("http://example.test/other"));
        let outcome = router.on_link_activation(&link);
        assert_eq!(outcome, LinkOutcome::Rejected);
        assert_eq!(held.borrow().len(), 1);

        held.borrow()[0].proceed().expect("proceed");
        local.settle(&router);
        assert_eq!(router.location().as_str(), "http://example.test/somewhere");
    }

    /// T3.5: History traversal while a detour is pending is reverted and
    /// never re-applied.
    #[test]
    fn traversal_during_pending_detour_is_reverted() {
        let (local, router) = router_at("http://example.test/");
        router.navigate("/one", true).expect("navigate");
        let (_guard, held) = hold_detour(&local, &router);

        local.go(&router, -1);
        assert_eq!(local.history.cursor(), 1);
        assert_eq!(router.location().as_str(), "http://example.test/one");
        assert_eq!(held.borrow().len(), 1);

        held.borrow()[0].proceed().expect("proceed");
        local.settle(&router);
        assert_eq!(router.parts(), Parts::from(["somewhere"]));
        assert_eq!(router.history_index(), 2);
        assert_eq!(local.history.cursor(), 2);
    }
}

// =============================================================================
// TIER T4: RUNAWAY GUARD
// =============================================================================

mod t4_runaway_guard {
    use super::*;
    use waypoint_core::primitives::MAX_LOGGED_OPERATIONS;

    /// T4.1: 1000 reads pass, read 1001 fails.
    #[test]
    fn thousand_and_first_read_fails() {
        let (_, router) = router_at("http://example.test/a");
        let session = router.sequential_session();
        for _ in 0..MAX_LOGGED_OPERATIONS {
            session.parts().get(0usize).expect("read");
        }
        assert_eq!(
            session.parts().get(0usize),
            Err(RouteError::InfiniteLoopSuspected { limit: 1000 })
        );
    }

    /// T4.2: A render boundary resets the count.
    #[test]
    fn render_resets_the_log() {
        let (_, router) = router_at("http://example.test/a");
        let session = router.subscribe(|| {});
        for _ in 0..3 {
            session.render(|parts, _| {
                for _ in 0..MAX_LOGGED_OPERATIONS {
                    parts.get(0usize).expect("read");
                }
            });
        }
        assert_eq!(session.parts().logged(), MAX_LOGGED_OPERATIONS);
    }
}

// =============================================================================
// TIER T5: GARBAGE COLLECTION
// =============================================================================

mod t5_garbage_collection {
    use super::*;
    use waypoint_core::KeepQuery;

    fn orphan_query(config: RouterConfig) -> Query {
        let (local, router) = router_with("http://example.test/?a=1&b=2", config);
        let root = router.attach_root(|| {});
        root.render(|parts, _| parts.len()).expect("read");
        root.mount();

        let reader = router.subscribe(|| {});
        reader.render(|_, query| query.get("a")).expect("read");
        reader.mount();
        drop(reader);

        root.render(|parts, _| parts.len()).expect("read");
        local.pump(&router);
        router.query()
    }

    /// T5.1: A key read only by an unmounted consumer is dropped.
    #[test]
    fn orphaned_key_is_removed() {
        assert_eq!(orphan_query(RouterConfig::default()), Query::from([("b", "2")]));
    }

    /// T5.2: Retained keys survive.
    #[test]
    fn retained_key_survives() {
        let config = RouterConfig::new()
            .with_keep_extra_query(KeepQuery::Keys(vec!["a".to_string()]));
        assert_eq!(
            orphan_query(config),
            Query::from([("a", "1"), ("b", "2")])
        );
    }

    /// T5.3: A key still read by a live consumer survives.
    #[test]
    fn live_reader_keeps_key() {
        let (local, router) = router_at("http://example.test/?a=1");
        let root = router.attach_root(|| {});
        root.render(|_, query| query.get("a")).expect("read");
        root.mount();

        let reader = router.subscribe(|| {});
        reader.render(|_, query| query.get("a")).expect("read");
        reader.mount();
        drop(reader);

        root.render(|_, query| query.get("a")).expect("read");
        local.pump(&router);
        assert_eq!(router.query(), Query::from([("a", "1")]));
    }

    /// T5.4: Extra parts raise a 404 when forbidden.
    #[test]
    fn extra_parts_are_not_found() {
        let (local, router) = router_with(
            "http://example.test/known/extra",
            RouterConfig::new().with_allow_extra_parts(false),
        );
        let (root_renders, dispatch) = counter();
        let root = router.attach_root(dispatch);
        root.render(|parts, _| parts.get(0usize)).expect("read");
        root.mount();
        local.pump(&router);

        assert!(matches!(router.last_error(), Some(RouteError::NotFound { .. })));
        assert_eq!(root_renders.get(), 1);
        root.begin_render();
        assert!(root.rethrow().is_err());
        root.end_render();
    }

    /// T5.5: A navigation that leaves the root untouched still drops keys
    /// read only by unmounted consumers.
    #[test]
    fn navigation_sweeps_without_root_render() {
        let (local, router) = router_at("http://example.test/x/y?a=1&b=2");
        let (root_renders, dispatch) = counter();
        let root = router.attach_root(dispatch);
        root.render(|parts, _| parts.get(0usize)).expect("read");
        root.mount();
        let reader = router.subscribe(|| {});
        reader.render(|_, query| query.get("a")).expect("read");
        reader.mount();
        local.pump(&router);

        drop(reader);
        local.pump(&router);
        assert_eq!(router.query(), Query::from([("a", "1"), ("b", "2")]));

        router.navigate("/x/z?a=1&b=2", true).expect("navigate");
        local.pump(&router);
        assert_eq!(root_renders.get(), 0);
        assert_eq!(router.location().as_str(), "http://example.test/x/z?b=2");
    }

    /// T5.6: Without a root, unmounted readers are swept on the next
    /// navigation and then forgotten.
    #[test]
    fn removed_readers_are_forgotten_without_root() {
        let (local, router) = router_at("http://example.test/?a=1");
        for _ in 0..3 {
            let reader = router.subscribe(|| {});
            reader.render(|_, query| query.get("a")).expect("read");
            reader.mount();
        }

        router.navigate("/y?a=1", true).expect("navigate");
        local.pump(&router);
        assert_eq!(router.location().as_str(), "http://example.test/y");

        router.navigate("/z?a=1", true).expect("navigate");
        local.pump(&router);
        assert_eq!(router.query(), Query::from([("a", "1")]));
    }
}

// =============================================================================
// TIER T6: ERROR PROTOCOL
// =============================================================================

mod t6_error_protocol {
    use super::*;
    use waypoint_core::{Boundary, ErrorAction, Recovery, Trap};

    /// T6.1: A 404 trap can redirect silently.
    #[test]
    fn not_found_trap_redirects() {
        let (_, router) = router_at("http://example.test/missing");
        let shell = router.subscribe(|| {});
        shell.mount();
        shell.trap(Trap::not_found(|_| ErrorAction::Redirect {
            parts: Parts::from(["home"]),
            query: Query::new(),
        }));

        let page = router.subscribe(|| {});
        let result = router.boundary(|| page.not_found::<()>());
        assert_eq!(result, Boundary::Fallback(Recovery::Resume));
        assert_eq!(router.parts(), Parts::from(["home"]));
        assert_eq!(router.history().len(), 1);
    }

    /// T6.2: A child's render-time replace is applied through its boundary.
    #[test]
    fn child_replacing_interrupts_and_recovers() {
        let (_, router) = router_at("http://example.test/draft");
        let child = router.subscribe(|| {});
        let first = router.boundary(|| {
            child.render(|parts, _| {
                if parts.get(0usize)?.as_deref() == Some("draft") {
                    child.replacing(|| parts.set(0usize, "final"))?;
                }
                Ok(())
            })
        });
        assert!(first.should_retry());
        assert_eq!(router.parts(), Parts::from(["final"]));

        let second = router.boundary(|| {
            child.render(|parts, _| parts.get(0usize))
        });
        assert_eq!(second, Boundary::Rendered(Some("final".to_string())));
    }

    /// T6.3: Unhandled errors reach the root and clear on the next change.
    #[test]
    fn unhandled_error_escalates_to_root() {
        let (_, router) = router_at("http://example.test/");
        let (root_renders, dispatch) = counter();
        let root = router.attach_root(dispatch);
        root.mount();

        let child = router.subscribe(|| {});
        let outcome = router.boundary(|| child.render(|parts, _| parts.push("x")));
        assert_eq!(outcome, Boundary::Fallback(Recovery::Escalated));
        assert_eq!(root_renders.get(), 1);
        assert_eq!(router.last_error(), Some(RouteError::ReplacingRequired));

        router.navigate("/elsewhere", true).expect("navigate");
        assert_eq!(router.last_error(), None);
        assert_eq!(root_renders.get(), 2);
    }
}
