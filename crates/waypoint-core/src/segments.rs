//! # Named Segments
//!
//! `SegmentMap` gives names to positions of the path:
//!
//! ```text
//! /users/42/edit
//!  ^^^^^ ^^ ^^^^
//!  |     |  +-- "mode"   Slot(2)
//!  |     +----- "user"   Pattern { "users" at 0, value at 1 }
//!  +----------- literal
//! ```
//!
//! A pattern name is present only when every literal matches. A literal may
//! list alternatives (`"user | users"`); writing stores the first one.
//! Reads through a `RouteView<Parts>` are recorded per position, so a
//! consumer reading one name is not re-rendered when another one changes.

use crate::binding::RouteView;
use crate::primitives::{LITERAL_ALTERNATIVE_SEPARATOR, MAX_PARTS};
use crate::{Parts, RouteError};

// =============================================================================
// SEGMENT STORE
// =============================================================================

/// Positional access to path segments.
pub trait SegmentStore {
    /// Segment at `index`.
    fn segment(&self, index: usize) -> Result<Option<String>, RouteError>;

    /// Store `value` at `index`, padding with empty segments.
    fn put_segment(&mut self, index: usize, value: String) -> Result<(), RouteError>;

    /// Keep only the first `len` segments.
    fn cut(&mut self, len: usize) -> Result<(), RouteError>;
}

impl SegmentStore for Parts {
    fn segment(&self, index: usize) -> Result<Option<String>, RouteError> {
        Ok(self.get(index).map(str::to_string))
    }

    fn put_segment(&mut self, index: usize, value: String) -> Result<(), RouteError> {
        self.set(index, value)
    }

    fn cut(&mut self, len: usize) -> Result<(), RouteError> {
        self.truncate(len);
        Ok(())
    }
}

impl SegmentStore for Vec<String> {
    fn segment(&self, index: usize) -> Result<Option<String>, RouteError> {
        Ok(self.get(index).cloned())
    }

    fn put_segment(&mut self, index: usize, value: String) -> Result<(), RouteError> {
        if index >= MAX_PARTS {
            return Err(RouteError::TooManyParts {
                index,
                limit: MAX_PARTS,
            });
        }
        if index >= self.len() {
            self.resize(index + 1, String::new());
        }
        self[index] = value;
        Ok(())
    }

    fn cut(&mut self, len: usize) -> Result<(), RouteError> {
        self.truncate(len);
        Ok(())
    }
}

impl SegmentStore for &RouteView<Parts> {
    fn segment(&self, index: usize) -> Result<Option<String>, RouteError> {
        self.get(index)
    }

    fn put_segment(&mut self, index: usize, value: String) -> Result<(), RouteError> {
        self.set(index, value)
    }

    fn cut(&mut self, len: usize) -> Result<(), RouteError> {
        self.truncate(len)
    }
}

// =============================================================================
// DESCRIPTORS
// =============================================================================

/// Where a named segment lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `parts[index]`.
    Slot(usize),
    /// `parts[value]`, guarded by literals at fixed positions.
    Pattern {
        literals: Vec<(String, usize)>,
        value: Option<usize>,
        /// Writing drops every segment after the pattern.
        removing: bool,
    },
}

impl Segment {
    /// A pattern with no literals and no value yet.
    #[must_use]
    pub fn pattern() -> Self {
        Self::Pattern {
            literals: Vec::new(),
            value: None,
            removing: false,
        }
    }

    /// Require `text` (or one of its alternatives) at `index`.
    #[must_use]
    pub fn literal(mut self, text: impl Into<String>, index: usize) -> Self {
        if let Self::Pattern { literals, .. } = &mut self {
            literals.push((text.into(), index));
        }
        self
    }

    /// Read and write the value at `index`.
    #[must_use]
    pub fn value(mut self, index: usize) -> Self {
        if let Self::Pattern { value, .. } = &mut self {
            *value = Some(index);
        }
        self
    }

    /// Drop trailing segments on write.
    #[must_use]
    pub fn removing(mut self) -> Self {
        if let Self::Pattern { removing, .. } = &mut self {
            *removing = true;
        }
        self
    }

    fn indices(&self) -> Vec<usize> {
        match self {
            Self::Slot(index) => vec![*index],
            Self::Pattern { literals, value, .. } => literals
                .iter()
                .map(|(_, index)| *index)
                .chain(*value)
                .collect(),
        }
    }
}

fn matches_literal(segment: Option<&str>, literal: &str) -> bool {
    segment.is_some_and(|s| {
        literal
            .split(LITERAL_ALTERNATIVE_SEPARATOR)
            .any(|alternative| alternative == s)
    })
}

fn first_alternative(literal: &str) -> &str {
    literal
        .split(LITERAL_ALTERNATIVE_SEPARATOR)
        .next()
        .unwrap_or(literal)
}

// =============================================================================
// SEGMENT MAP
// =============================================================================

/// Named projection over path segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMap {
    names: Vec<(String, Segment)>,
}

impl SegmentMap {
    /// Validate descriptors and order them by their lowest position.
    pub fn new<N: Into<String>>(
        descriptors: impl IntoIterator<Item = (N, Segment)>,
    ) -> Result<Self, RouteError> {
        let mut names = Vec::new();
        for (name, segment) in descriptors {
            let name = name.into();
            if let Segment::Pattern { value: None, .. } = &segment {
                return Err(RouteError::Config(format!(
                    "invalid descriptor for segment \"{}\": pattern has no value position",
                    name
                )));
            }
            if let Segment::Pattern { literals, .. } = &segment
                && literals.iter().any(|(text, _)| text.is_empty())
            {
                return Err(RouteError::Config(format!(
                    "invalid descriptor for segment \"{}\": empty literal",
                    name
                )));
            }
            names.push((name, segment));
        }
        names.sort_by_key(|(_, segment)| segment.indices().into_iter().min().unwrap_or(0));
        Ok(Self { names })
    }

    /// Declared names, in position order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|(name, _)| name.as_str())
    }

    fn descriptor(&self, name: &str) -> Option<&Segment> {
        self.names
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, segment)| segment)
    }

    /// Value of `name`, if declared and present.
    pub fn get<S: SegmentStore>(&self, store: &S, name: &str) -> Result<Option<String>, RouteError> {
        let Some(segment) = self.descriptor(name) else {
            return Ok(None);
        };
        Self::extract(segment, store)
    }

    fn extract<S: SegmentStore>(segment: &Segment, store: &S) -> Result<Option<String>, RouteError> {
        match segment {
            Segment::Slot(index) => store.segment(*index),
            Segment::Pattern {
                literals, value, ..
            } => {
                for (literal, index) in literals {
                    if !matches_literal(store.segment(*index)?.as_deref(), literal) {
                        return Ok(None);
                    }
                }
                match value {
                    Some(index) => store.segment(*index),
                    None => Ok(None),
                }
            }
        }
    }

    /// Whether `name` is present.
    pub fn has<S: SegmentStore>(&self, store: &S, name: &str) -> Result<bool, RouteError> {
        Ok(self.get(store, name)?.is_some())
    }

    /// Present names with their values, in position order.
    pub fn entries<S: SegmentStore>(&self, store: &S) -> Result<Vec<(String, String)>, RouteError> {
        let mut entries = Vec::new();
        for (name, segment) in &self.names {
            if let Some(value) = Self::extract(segment, store)? {
                entries.push((name.clone(), value));
            }
        }
        Ok(entries)
    }

    /// Write `value` under `name`. Returns `false` for undeclared names.
    pub fn set<S: SegmentStore>(
        &self,
        store: &mut S,
        name: &str,
        value: impl Into<String>,
    ) -> Result<bool, RouteError> {
        let Some(segment) = self.descriptor(name) else {
            return Ok(false);
        };
        match segment {
            Segment::Slot(index) => store.put_segment(*index, value.into())?,
            Segment::Pattern {
                literals,
                value: slot,
                removing,
            } => {
                for (literal, index) in literals {
                    store.put_segment(*index, first_alternative(literal).to_string())?;
                }
                if let Some(index) = slot {
                    store.put_segment(*index, value.into())?;
                }
                if *removing && let Some(highest) = segment.indices().into_iter().max() {
                    store.cut(highest + 1)?;
                }
            }
        }
        Ok(true)
    }
}

// =============================================================================
// TESTS
// =============================================================================
