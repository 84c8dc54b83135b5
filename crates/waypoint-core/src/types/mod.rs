//! # Core Type Definitions
//!
//! This module contains the value types shared by every part of the engine:
//! - Route containers (`Parts`, `Query`)
//! - Observation results recorded by instrumented views (`Observed`)
//! - Protocol vocabulary (`ViewKind`, `DetourReason`, `TrapKind`, `Recovery`)
//! - Error types (`RouteError`)
//!
//! ## Equality Rules
//!
//! Route containers and observations compare structurally and shallowly:
//! - sequences are equal iff they have the same length and pairwise-equal elements
//! - mappings are equal iff they have the same key set and pairwise-equal values
//!   (insertion order is irrelevant)

use crate::primitives::MAX_PARTS;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use url::Url;

// =============================================================================
// PARTS
// =============================================================================

/// Ordered path segments derived from the URL path, excluding the base prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parts(Vec<String>);

impl Parts {
    /// Create an empty segment list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the segment at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the segments in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Borrow the segments as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Store `value` at `index`, padding intermediate slots with empty segments.
    ///
    /// Fails without touching the segments when `index` is not below
    /// `MAX_PARTS`.
    pub fn set(&mut self, index: usize, value: impl Into<String>) -> Result<(), RouteError> {
        if index >= MAX_PARTS {
            return Err(RouteError::TooManyParts {
                index,
                limit: MAX_PARTS,
            });
        }
        if index >= self.0.len() {
            self.0.resize(index + 1, String::new());
        }
        self.0[index] = value.into();
        Ok(())
    }

    /// Append a segment.
    pub fn push(&mut self, value: impl Into<String>) {
        self.0.push(value.into());
    }

    /// Remove and return the last segment.
    pub fn pop(&mut self) -> Option<String> {
        self.0.pop()
    }

    /// Insert a segment, shifting later segments right. Out-of-range indices append.
    pub fn insert(&mut self, index: usize, value: impl Into<String>) {
        let index = index.min(self.0.len());
        self.0.insert(index, value.into());
    }

    /// Remove the segment at `index`, shifting later segments left.
    pub fn remove(&mut self, index: usize) -> Option<String> {
        (index < self.0.len()).then(|| self.0.remove(index))
    }

    /// Keep only the first `len` segments.
    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    /// Remove every segment.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Replace the whole list in place.
    pub fn replace_with(&mut self, other: &Parts) {
        self.0.clone_from(&other.0);
    }

    /// Consume into the underlying vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for Parts {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

impl From<&[&str]> for Parts {
    fn from(value: &[&str]) -> Self {
        value.iter().copied().collect()
    }
}

impl<const N: usize> From<[&str; N]> for Parts {
    fn from(value: [&str; N]) -> Self {
        value.into_iter().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for Parts {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// QUERY
// =============================================================================

/// Mapping of query keys to values, kept in insertion order.
///
/// Keys are unique; inserting an existing key overwrites its value in place.
/// Equality ignores ordering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Vec<(String, String)>);

impl Query {
    /// Create an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Check whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    /// Store `value` under `key`. Returns the previous value, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.0.push((key, value));
                None
            }
        }
    }

    /// Remove `key`, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(index).1)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Replace the whole mapping in place.
    pub fn replace_with(&mut self, other: &Query) {
        self.0.clone_from(&other.0);
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl Eq for Query {}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Query {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut query = Query::new();
        for (k, v) in iter {
            query.insert(k, v);
        }
        query
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Query {
    fn from(value: [(&str, &str); N]) -> Self {
        value.into_iter().collect()
    }
}

// =============================================================================
// OBSERVATIONS
// =============================================================================

/// The result of one read through an instrumented view.
///
/// Recorded alongside a replayable selector; two observations are compared
/// with the shallow structural rule described in the module docs.
#[derive(Debug, Clone)]
pub enum Observed {
    /// The read found nothing (missing index or key).
    Missing,
    /// A single string value.
    Text(String),
    /// A predicate or membership result.
    Flag(bool),
    /// A length, count or position.
    Count(usize),
    /// An ordered sequence of strings.
    Seq(Vec<String>),
    /// A mapping of strings to strings.
    Map(Vec<(String, String)>),
}

impl PartialEq for Observed {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Missing, Self::Missing) => true,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Flag(a), Self::Flag(b)) => a == b,
            (Self::Count(a), Self::Count(b)) => a == b,
            (Self::Seq(a), Self::Seq(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y),
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.iter().any(|(bk, bv)| bk == k && bv == v))
            }
            _ => false,
        }
    }
}

impl From<Option<String>> for Observed {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Missing, Self::Text)
    }
}

impl From<String> for Observed {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for Observed {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<usize> for Observed {
    fn from(value: usize) -> Self {
        Self::Count(value)
    }
}

impl From<Option<usize>> for Observed {
    fn from(value: Option<usize>) -> Self {
        value.map_or(Self::Missing, Self::Count)
    }
}

impl From<Vec<String>> for Observed {
    fn from(value: Vec<String>) -> Self {
        Self::Seq(value)
    }
}

impl From<Vec<(String, String)>> for Observed {
    fn from(value: Vec<(String, String)>) -> Self {
        Self::Map(value)
    }
}

impl From<Parts> for Observed {
    fn from(value: Parts) -> Self {
        Self::Seq(value.into_vec())
    }
}

impl From<Query> for Observed {
    fn from(value: Query) -> Self {
        Self::Map(value.0)
    }
}

// =============================================================================
// PROTOCOL VOCABULARY
// =============================================================================

/// Which dimension of the route a view or mutation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewKind {
    /// Path segments.
    Path,
    /// Query mapping.
    Query,
}

/// What triggered a detour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetourReason {
    /// A consumer called `detour()`.
    Programmatic,
    /// An anchor was activated.
    Link,
    /// The history cursor moved backwards.
    Back,
    /// The history cursor moved forwards.
    Forward,
}

impl fmt::Display for DetourReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Programmatic => "programmatic",
            Self::Link => "link",
            Self::Back => "back",
            Self::Forward => "forward",
        };
        f.write_str(name)
    }
}

/// The protocol point a trap is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrapKind {
    /// Pending navigations.
    Detour,
    /// Rendering errors of any kind.
    Error,
    /// Not-found errors only; offered before `Error` traps.
    NotFound,
}

/// What the store did with a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// A navigation was applied; rendering may continue.
    Resume,
    /// A trap absorbed the error; render fallback content.
    Absorbed,
    /// The error was stored for the root consumer to rethrow.
    Escalated,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by the route engine.
///
/// Errors are `Clone`: the store keeps the last rendering error and re-raises
/// it through the root consumer's views until the next notification cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    /// The URL path does not start with the configured base path.
    #[error("\"{path}\" does not start with \"{base}\"")]
    PathMismatch { path: String, base: String },

    /// The configured base path is unusable.
    #[error("Invalid base path \"{0}\": must start and end with '/'")]
    InvalidBasePath(String),

    /// A URL could not be parsed or resolved.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No page exists for the location.
    #[error("Page not found: {}", .location.path())]
    NotFound { location: Url },

    /// A mutation was attempted during render outside a `replacing` scope.
    #[error("Use of replacing() is required in this context")]
    ReplacingRequired,

    /// `pushing`/`replacing` was used where it is not allowed.
    #[error("Cannot use {0}() in this context")]
    ScopeConflict(&'static str),

    /// Another detour has not settled yet.
    #[error("Detour outstanding")]
    DetourOutstanding,

    /// A trap prevented the navigation.
    #[error("Detour prevented")]
    DetourPrevented,

    /// `proceed()`/`prevent()` was called on an already settled detour.
    #[error("Detour already settled")]
    DetourSettled,

    /// A non-root render must restart with fresh route state.
    #[error("Route change interrupted rendering: {url}")]
    RenderInterruption { url: Url },

    /// Too many reads accumulated without a render boundary.
    #[error("Infinite loop detected: more than {limit} route reads in one render")]
    InfiniteLoopSuspected { limit: usize },

    /// A segment write past the highest allowed position.
    #[error("Segment index {index} exceeds the limit of {limit} parts")]
    TooManyParts { index: usize, limit: usize },

    /// A configuration value could not be used.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RouteError {
    /// Check if the error is the 404 signal.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if the error belongs to the detour protocol.
    #[must_use]
    pub fn is_detour(&self) -> bool {
        matches!(
            self,
            Self::DetourOutstanding | Self::DetourPrevented | Self::DetourSettled
        )
    }
}

impl From<url::ParseError> for RouteError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts_set_pads_with_empty_segments() {
        let mut parts = Parts::from(["a"]);
        parts.set(3, "d").expect("set");
        assert_eq!(parts.as_slice(), ["a", "", "", "d"]);
    }

    #[test]
    fn parts_set_refuses_out_of_range_index() {
        let mut parts = Parts::from(["a"]);
        assert_eq!(
            parts.set(usize::MAX, "x"),
            Err(RouteError::TooManyParts {
                index: usize::MAX,
                limit: MAX_PARTS
            })
        );
        assert!(parts.set(MAX_PARTS, "x").is_err());
        assert_eq!(parts.as_slice(), ["a"]);
        parts.set(MAX_PARTS - 1, "z").expect("last slot");
        assert_eq!(parts.len(), MAX_PARTS);
    }

    #[test]
    fn query_insert_keeps_position() {
        let mut query = Query::from([("a", "1"), ("b", "2")]);
        assert_eq!(query.insert("a", "3"), Some("1".to_string()));
        assert_eq!(query.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(query.get("a"), Some("3"));
    }

    #[test]
    fn query_equality_ignores_order() {
        let a = Query::from([("a", "1"), ("b", "2")]);
        let b = Query::from([("b", "2"), ("a", "1")]);
        assert_eq!(a, b);
        assert_ne!(a, Query::from([("a", "1")]));
    }

    #[test]
    fn observed_map_comparison_is_by_key_set() {
        let a = Observed::Map(vec![("x".into(), "1".into()), ("y".into(), "2".into())]);
        let b = Observed::Map(vec![("y".into(), "2".into()), ("x".into(), "1".into())]);
        let c = Observed::Map(vec![("x".into(), "1".into()), ("z".into(), "2".into())]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn observed_variants_never_cross_compare() {
        assert_ne!(Observed::Count(1), Observed::Text("1".into()));
        assert_ne!(Observed::Missing, Observed::Seq(vec![]));
        assert_eq!(Observed::from(None::<String>), Observed::Missing);
    }

    #[test]
    fn detour_errors_are_recognised() {
        assert!(RouteError::DetourPrevented.is_detour());
        assert!(!RouteError::ReplacingRequired.is_detour());
    }
}
