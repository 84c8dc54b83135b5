//! # Garbage Collection
//!
//! After a notification batch settles, the router checks the route against
//! what consumers actually read. A batch that dispatched nobody is swept
//! right away; otherwise the sweep follows the re-render it caused.
//!
//! - **Extra parts**: when `allow_extra_parts` is off, trailing segments that
//!   no live consumer's reads depend on raise a not-found error.
//! - **Orphaned query keys**: keys read by consumers that have since been
//!   removed, and by no live consumer, are dropped with a replace
//!   navigation. `keep_extra_query` exempts keys.
//!
//! Dependence is decided by replay: a consumer depends on a candidate
//! removal if any of its recorded reads tells the two states apart.

use crate::binding::OpLog;
use crate::store::{Consumer, Router, Watch};
use crate::{Parts, Query, RouteError};
use std::cell::RefCell;
use std::rc::Rc;

type PartsLog = Rc<RefCell<OpLog<Parts>>>;
type QueryLog = Rc<RefCell<OpLog<Query>>>;

fn logs(consumers: &[Consumer]) -> (Vec<PartsLog>, Vec<QueryLog>) {
    consumers
        .iter()
        .filter_map(|consumer| match &consumer.watch {
            Watch::Route { parts, query } => Some((Rc::clone(parts), Rc::clone(query))),
            Watch::Location => None,
        })
        .unzip()
}

/// Number of leading segments some live consumer depends on.
fn used_part_count(parts: &Parts, live: &[PartsLog]) -> usize {
    let mut used = parts.len();
    while used > 0 {
        let candidate: Parts = parts.iter().take(used - 1).collect();
        if live.iter().any(|log| log.borrow().distinguishes(parts, &candidate)) {
            break;
        }
        used -= 1;
    }
    used
}

impl Router {
    /// Queue a sweep for the end of the current tick.
    pub(crate) fn schedule_sweep(&self) {
        {
            let mut state = self.core.state.borrow_mut();
            if state.sweep_scheduled || state.last_error.is_some() {
                return;
            }
            state.sweep_scheduled = true;
        }
        let weak = Rc::downgrade(&self.core);
        self.core.host.scheduler.queue_microtask(Box::new(move || {
            let Some(core) = weak.upgrade() else {
                return;
            };
            core.state.borrow_mut().sweep_scheduled = false;
            let router = Router::from_core(core);
            if let Err(e) = router.collect_garbage() {
                tracing::warn!(error = %e, "route garbage collection failed");
            }
        }));
    }

    /// Check for extra parts and drop orphaned query keys now.
    ///
    /// Does nothing while an error is pending.
    pub fn collect_garbage(&self) -> Result<(), RouteError> {
        let (live_parts, live_query, removed_query) = {
            let mut state = self.core.state.borrow_mut();
            if state.last_error.is_some() {
                return Ok(());
            }
            let (live_parts, live_query) = logs(&state.consumers);
            let removed = std::mem::take(&mut state.removed);
            let (_, removed_query) = logs(&removed);
            (live_parts, live_query, removed_query)
        };

        if !self.config().allow_extra_parts {
            let parts = self.parts();
            let used = used_part_count(&parts, &live_parts);
            if used < parts.len() {
                tracing::debug!(used, total = parts.len(), "extra route parts");
                self.report_error(RouteError::NotFound {
                    location: self.location(),
                });
                return Ok(());
            }
        }

        let keep = &self.config().keep_extra_query;
        if keep.keeps_all() || removed_query.is_empty() {
            return Ok(());
        }
        let query = self.query();
        let mut kept = query.clone();
        for key in query.keys() {
            if keep.keeps(key) {
                continue;
            }
            let mut trial = kept.clone();
            trial.remove(key);
            let depends = |log: &QueryLog| log.borrow().distinguishes(&kept, &trial);
            if live_query.iter().any(depends) {
                continue;
            }
            if removed_query.iter().any(depends) {
                tracing::debug!(key, "dropping orphaned query key");
                kept = trial;
            }
        }
        if kept == query {
            return Ok(());
        }
        let url = self.create_url(&self.parts(), &kept)?;
        self.change(&url, Some(false), false)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Operation, Selector};
    use crate::config::{KeepQuery, RouterConfig, RouterOptions};
    use crate::host::LocalHost;
    use crate::Observed;
    use url::Url;

    fn parts_log(indices: &[usize], parts: &Parts) -> PartsLog {
        let mut log = OpLog::new();
        for &index in indices {
            let selector: Selector<Parts> =
                Rc::new(move |p: &Parts| Observed::from(p.get(index).map(str::to_string)));
            let observed = selector(parts);
            log.record(Operation {
                label: format!("get({})", index),
                selector,
                observed,
            })
            .expect("record");
        }
        Rc::new(RefCell::new(log))
    }

    #[test]
    fn unread_trailing_parts_are_unused() {
        let parts = Parts::from(["a", "b", "c"]);
        assert_eq!(used_part_count(&parts, &[parts_log(&[0], &parts)]), 1);
        assert_eq!(
            used_part_count(&parts, &[parts_log(&[0], &parts), parts_log(&[2], &parts)]),
            3
        );
        assert_eq!(used_part_count(&parts, &[]), 0);
    }

    #[test]
    fn extra_parts_raise_not_found() {
        let url = Url::parse("http://example.test/a/b").expect("url");
        let local = LocalHost::new(url);
        let options =
            RouterOptions::from_config(RouterConfig::new().with_allow_extra_parts(false));
        let router = Router::new(options, local.host()).expect("router");
        let session = router.sequential_session();
        session.parts().get(0usize).expect("get");

        router.collect_garbage().expect("gc");
        assert!(matches!(
            router.last_error(),
            Some(RouteError::NotFound { .. })
        ));
    }

    #[test]
    fn keep_all_disables_query_collection() {
        let url = Url::parse("http://example.test/?a=1").expect("url");
        let local = LocalHost::new(url);
        let options = RouterOptions::from_config(
            RouterConfig::new().with_keep_extra_query(KeepQuery::All(true)),
        );
        let router = Router::new(options, local.host()).expect("router");
        let session = router.sequential_session();
        session.query().get("a").expect("get");
        drop(session);

        router.collect_garbage().expect("gc");
        assert_eq!(router.query(), Query::from([("a", "1")]));
    }
}
