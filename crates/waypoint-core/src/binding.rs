//! # Dependency-Tracking Binding
//!
//! `RouteView<C>` is the instrumented view a consumer reads and writes route
//! state through. It wraps a canonical container (`Parts` or `Query`) owned
//! by the router and:
//!
//! - records every read as a replayable `(selector, observed result)` pair
//! - buffers every write into a private shadow copy, created on first write
//! - reports accesses and mutations to its `ViewObserver` (the render session)
//!
//! The recorded log answers one question for the router: *would this
//! consumer's last render observe anything different against a new state?*
//! Replaying is pure: selectors receive `&C` and cannot mutate the candidate.

use crate::primitives::MAX_LOGGED_OPERATIONS;
use crate::{Observed, Parts, Query, RouteError, ViewKind};
use std::cell::RefCell;
use std::fmt;
use std::ops::Range;
use std::rc::{Rc, Weak};

// =============================================================================
// CONTAINER ABSTRACTION
// =============================================================================

/// A route container addressable by key.
///
/// This is the explicit `{ get, set, has, keys, delete }` surface that the
/// view instruments.
pub trait RouteContainer: Clone + 'static {
    /// Index type: position for `Parts`, name for `Query`.
    type Key: Clone + fmt::Debug + 'static;

    /// Route dimension this container holds.
    const KIND: ViewKind;

    /// Read the value under `key`.
    fn read(&self, key: &Self::Key) -> Option<String>;

    /// Store `value` under `key`.
    fn write(&mut self, key: &Self::Key, value: String) -> Result<(), RouteError>;

    /// Remove `key`. Returns whether anything was removed.
    fn erase(&mut self, key: &Self::Key) -> bool;

    /// All keys, in container order.
    fn key_list(&self) -> Vec<Self::Key>;
}

impl RouteContainer for Parts {
    type Key = usize;
    const KIND: ViewKind = ViewKind::Path;

    fn read(&self, key: &usize) -> Option<String> {
        self.get(*key).map(str::to_string)
    }

    fn write(&mut self, key: &usize, value: String) -> Result<(), RouteError> {
        self.set(*key, value)
    }

    fn erase(&mut self, key: &usize) -> bool {
        self.remove(*key).is_some()
    }

    fn key_list(&self) -> Vec<usize> {
        (0..self.len()).collect()
    }
}

impl RouteContainer for Query {
    type Key = String;
    const KIND: ViewKind = ViewKind::Query;

    fn read(&self, key: &String) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    fn write(&mut self, key: &String, value: String) -> Result<(), RouteError> {
        self.insert(key.clone(), value);
        Ok(())
    }

    fn erase(&mut self, key: &String) -> bool {
        self.remove(key).is_some()
    }

    fn key_list(&self) -> Vec<String> {
        self.keys().map(str::to_string).collect()
    }
}

// =============================================================================
// OPERATION LOG
// =============================================================================

/// A replayable read.
pub type Selector<C> = Rc<dyn Fn(&C) -> Observed>;

/// One recorded read.
pub struct Operation<C> {
    /// Human-readable accessor description, e.g. `get(0)`.
    pub label: String,
    /// Re-runs the read against another container.
    pub selector: Selector<C>,
    /// What the read returned when it was recorded.
    pub observed: Observed,
}

impl<C> fmt::Debug for Operation<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("label", &self.label)
            .field("observed", &self.observed)
            .finish()
    }
}

/// The reads one consumer performed during its current render cycle.
pub struct OpLog<C> {
    ops: Vec<Operation<C>>,
}

impl<C> Default for OpLog<C> {
    fn default() -> Self {
        Self { ops: Vec::new() }
    }
}

impl<C> fmt::Debug for OpLog<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.ops).finish()
    }
}

impl<C> OpLog<C> {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a read.
    ///
    /// Fails with `InfiniteLoopSuspected` once the log holds more than
    /// `MAX_LOGGED_OPERATIONS` entries.
    pub fn record(&mut self, op: Operation<C>) -> Result<(), RouteError> {
        self.ops.push(op);
        if self.ops.len() > MAX_LOGGED_OPERATIONS {
            tracing::trace!(count = self.ops.len(), "runaway route reads");
            return Err(RouteError::InfiniteLoopSuspected {
                limit: MAX_LOGGED_OPERATIONS,
            });
        }
        Ok(())
    }

    /// Forget every recorded read (render boundary).
    pub fn clear(&mut self) {
        self.ops.clear();
    }

    /// Number of recorded reads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if nothing was read.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterate over the recorded reads.
    pub fn iter(&self) -> impl Iterator<Item = &Operation<C>> {
        self.ops.iter()
    }

    /// Would replaying the log against `candidate` observe anything different?
    #[must_use]
    pub fn is_result_different(&self, candidate: &C) -> bool {
        self.ops
            .iter()
            .any(|op| (op.selector)(candidate) != op.observed)
    }

    /// Does any recorded read tell `a` and `b` apart?
    #[must_use]
    pub fn distinguishes(&self, a: &C, b: &C) -> bool {
        self.ops
            .iter()
            .any(|op| (op.selector)(a) != (op.selector)(b))
    }
}

// =============================================================================
// VIEW OBSERVER
// =============================================================================

/// Receives the view's access and mutation signals.
pub trait ViewObserver {
    /// Called before every read or write. An error aborts the access.
    fn on_access(&self) -> Result<(), RouteError>;

    /// Called before a write touches the shadow. An error rejects the write.
    fn before_mutation(&self) -> Result<(), RouteError>;

    /// Called after a write was applied to the shadow.
    fn on_mutation(&self, kind: ViewKind) -> Result<(), RouteError>;
}

// =============================================================================
// ROUTE VIEW
// =============================================================================

/// Instrumented view over one route container for one consumer.
pub struct RouteView<C: RouteContainer> {
    source: Rc<RefCell<C>>,
    shadow: RefCell<Option<C>>,
    log: Rc<RefCell<OpLog<C>>>,
    observer: Option<Weak<dyn ViewObserver>>,
}

impl<C: RouteContainer + fmt::Debug> fmt::Debug for RouteView<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteView")
            .field("source", &self.source)
            .field("shadow", &self.shadow)
            .field("logged", &self.log.borrow().len())
            .finish()
    }
}

impl<C: RouteContainer> RouteView<C> {
    /// Create a view reporting to `observer`.
    pub(crate) fn new(source: Rc<RefCell<C>>, observer: Weak<dyn ViewObserver>) -> Self {
        Self {
            source,
            shadow: RefCell::new(None),
            log: Rc::new(RefCell::new(OpLog::new())),
            observer: Some(observer),
        }
    }

    /// Create a view with no session behind it: reads are logged, writes go
    /// to the shadow, nothing is ever rejected.
    #[must_use]
    pub fn detached(source: Rc<RefCell<C>>) -> Self {
        Self {
            source,
            shadow: RefCell::new(None),
            log: Rc::new(RefCell::new(OpLog::new())),
            observer: None,
        }
    }

    fn observer(&self) -> Option<Rc<dyn ViewObserver>> {
        self.observer.as_ref().and_then(Weak::upgrade)
    }

    fn access(&self) -> Result<(), RouteError> {
        match self.observer() {
            Some(observer) => observer.on_access(),
            None => Ok(()),
        }
    }

    /// Shared handle to the operation log.
    pub(crate) fn log_handle(&self) -> Rc<RefCell<OpLog<C>>> {
        Rc::clone(&self.log)
    }

    /// Number of reads logged since the last render boundary.
    #[must_use]
    pub fn logged(&self) -> usize {
        self.log.borrow().len()
    }

    /// Whether replaying this view's reads against `candidate` differs.
    #[must_use]
    pub fn would_differ(&self, candidate: &C) -> bool {
        self.log.borrow().is_result_different(candidate)
    }

    /// Whether a shadow copy holds unsaved writes.
    #[must_use]
    pub fn has_shadow(&self) -> bool {
        self.shadow.borrow().is_some()
    }

    pub(crate) fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    pub(crate) fn clear_shadow(&self) {
        self.shadow.borrow_mut().take();
    }

    /// Run `f` against the current view: the shadow if one exists, else the
    /// canonical container. Not recorded.
    pub(crate) fn with_current<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        let shadow = self.shadow.borrow();
        match shadow.as_ref() {
            Some(container) => f(container),
            None => f(&self.source.borrow()),
        }
    }

    /// Unrecorded copy of the current view.
    #[must_use]
    pub fn snapshot(&self) -> C {
        self.with_current(C::clone)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Run a derived-value selector against the current view and record it.
    ///
    /// The selector is kept and re-run against future states to decide
    /// whether this consumer must re-render.
    pub fn observe<R>(
        &self,
        label: impl Into<String>,
        selector: impl Fn(&C) -> R + 'static,
    ) -> Result<R, RouteError>
    where
        R: Into<Observed> + Clone,
    {
        self.access()?;
        let result = self.with_current(&selector);
        let observed = result.clone().into();
        let selector: Selector<C> = Rc::new(move |container: &C| selector(container).into());
        self.log.borrow_mut().record(Operation {
            label: label.into(),
            selector,
            observed,
        })?;
        Ok(result)
    }

    /// Read the value under `key`.
    pub fn get(&self, key: impl Into<C::Key>) -> Result<Option<String>, RouteError> {
        let key = key.into();
        let label = format!("get({:?})", key);
        self.observe(label, move |c: &C| c.read(&key))
    }

    /// Check whether `key` holds a value.
    pub fn has(&self, key: impl Into<C::Key>) -> Result<bool, RouteError> {
        let key = key.into();
        let label = format!("has({:?})", key);
        self.observe(label, move |c: &C| c.read(&key).is_some())
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Apply `op` to the shadow copy, creating it first if needed.
    ///
    /// Writes are never recorded as observations.
    pub fn mutate<T>(&self, op: impl FnOnce(&mut C) -> T) -> Result<T, RouteError> {
        self.access()?;
        let observer = self.observer();
        if let Some(observer) = &observer {
            observer.before_mutation()?;
        }
        let result = {
            let mut shadow = self.shadow.borrow_mut();
            let container = shadow.get_or_insert_with(|| self.source.borrow().clone());
            op(container)
        };
        if let Some(observer) = &observer {
            observer.on_mutation(C::KIND)?;
        }
        Ok(result)
    }

    /// Store `value` under `key`.
    pub fn set(&self, key: impl Into<C::Key>, value: impl Into<String>) -> Result<(), RouteError> {
        let key = key.into();
        let value = value.into();
        self.mutate(move |c| c.write(&key, value))?
    }

    /// Remove `key`. Returns whether anything was removed.
    pub fn delete(&self, key: impl Into<C::Key>) -> Result<bool, RouteError> {
        let key = key.into();
        self.mutate(move |c| c.erase(&key))
    }
}

// -----------------------------------------------------------------------------
// Parts accessors
// -----------------------------------------------------------------------------

impl RouteView<Parts> {
    /// Number of segments.
    pub fn len(&self) -> Result<usize, RouteError> {
        self.observe("len", Parts::len)
    }

    /// Check if there are no segments.
    pub fn is_empty(&self) -> Result<bool, RouteError> {
        self.observe("is_empty", Parts::is_empty)
    }

    /// Every key (segment index). Depends on the length only.
    pub fn keys(&self) -> Result<Vec<usize>, RouteError> {
        let len = self.len()?;
        Ok((0..len).collect())
    }

    /// All segments (enumeration).
    pub fn to_vec(&self) -> Result<Vec<String>, RouteError> {
        self.observe("to_vec", |p: &Parts| p.as_slice().to_vec())
    }

    /// Segments in `range`, clamped to the current length.
    pub fn slice(&self, range: Range<usize>) -> Result<Vec<String>, RouteError> {
        let label = format!("slice({:?})", range);
        self.observe(label, move |p: &Parts| {
            let end = range.end.min(p.len());
            let start = range.start.min(end);
            p.as_slice()[start..end].to_vec()
        })
    }

    /// Check if any segment equals `value`.
    pub fn contains(&self, value: &str) -> Result<bool, RouteError> {
        let value = value.to_string();
        let label = format!("contains({:?})", value);
        self.observe(label, move |p: &Parts| p.iter().any(|s| s == value))
    }

    /// Index of the first segment equal to `value`.
    pub fn position(&self, value: &str) -> Result<Option<usize>, RouteError> {
        let value = value.to_string();
        let label = format!("position({:?})", value);
        self.observe(label, move |p: &Parts| p.iter().position(|s| s == value))
    }

    /// Check if every segment satisfies `pred`.
    pub fn all(&self, pred: impl Fn(&str) -> bool + 'static) -> Result<bool, RouteError> {
        self.observe("all(..)", move |p: &Parts| p.iter().all(&pred))
    }

    /// Check if any segment satisfies `pred`.
    pub fn any(&self, pred: impl Fn(&str) -> bool + 'static) -> Result<bool, RouteError> {
        self.observe("any(..)", move |p: &Parts| p.iter().any(&pred))
    }

    /// Segments joined with `separator`.
    pub fn join(&self, separator: &str) -> Result<String, RouteError> {
        let separator = separator.to_string();
        let label = format!("join({:?})", separator);
        self.observe(label, move |p: &Parts| p.as_slice().join(&separator))
    }

    /// Append a segment.
    pub fn push(&self, value: impl Into<String>) -> Result<(), RouteError> {
        let value = value.into();
        self.mutate(move |p| p.push(value))
    }

    /// Remove and return the last segment.
    pub fn pop(&self) -> Result<Option<String>, RouteError> {
        self.mutate(Parts::pop)
    }

    /// Insert a segment at `index`.
    pub fn insert(&self, index: usize, value: impl Into<String>) -> Result<(), RouteError> {
        let value = value.into();
        self.mutate(move |p| p.insert(index, value))
    }

    /// Remove the segment at `index`.
    pub fn remove(&self, index: usize) -> Result<Option<String>, RouteError> {
        self.mutate(move |p| p.remove(index))
    }

    /// Keep only the first `len` segments.
    pub fn truncate(&self, len: usize) -> Result<(), RouteError> {
        self.mutate(move |p| p.truncate(len))
    }

    /// Remove every segment.
    pub fn clear(&self) -> Result<(), RouteError> {
        self.mutate(Parts::clear)
    }

    /// Replace every segment.
    pub fn replace_all<S: Into<String>>(
        &self,
        values: impl IntoIterator<Item = S>,
    ) -> Result<(), RouteError> {
        let replacement: Parts = values.into_iter().collect();
        self.mutate(move |p| p.replace_with(&replacement))
    }
}

// -----------------------------------------------------------------------------
// Query accessors
// -----------------------------------------------------------------------------

impl RouteView<Query> {
    /// Number of entries.
    pub fn len(&self) -> Result<usize, RouteError> {
        self.observe("len", Query::len)
    }

    /// Check if there are no entries.
    pub fn is_empty(&self) -> Result<bool, RouteError> {
        self.observe("is_empty", Query::is_empty)
    }

    /// Every key, in order (enumeration).
    pub fn keys(&self) -> Result<Vec<String>, RouteError> {
        self.observe("keys", |q: &Query| q.key_list())
    }

    /// Every entry, in order (enumeration).
    pub fn entries(&self) -> Result<Vec<(String, String)>, RouteError> {
        self.observe("entries", |q: &Query| {
            q.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>()
        })
    }

    /// Remove `key`, returning its value.
    pub fn remove(&self, key: &str) -> Result<Option<String>, RouteError> {
        let key = key.to_string();
        self.mutate(move |q| q.remove(&key))
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<(), RouteError> {
        self.mutate(Query::clear)
    }

    /// Store several entries at once.
    pub fn extend<K: Into<String>, V: Into<String>>(
        &self,
        entries: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), RouteError> {
        let entries: Vec<(String, String)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.mutate(move |q| {
            for (k, v) in entries {
                q.insert(k, v);
            }
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
