//! # Render Boundary
//!
//! Catches a render's `RouteError` and hands it to the store's error
//! protocol, so a failing subtree can show fallback content.

use crate::store::Router;
use crate::{Recovery, RouteError};

/// Result of rendering inside a boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Boundary<T> {
    /// The render succeeded.
    Rendered(T),
    /// The render failed; the error was reported and handled as described.
    Fallback(Recovery),
}

impl<T> Boundary<T> {
    /// The rendered output, if any.
    pub fn rendered(self) -> Option<T> {
        match self {
            Self::Rendered(output) => Some(output),
            Self::Fallback(_) => None,
        }
    }

    /// Whether the subtree should be rendered again right away.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Fallback(Recovery::Resume))
    }
}

impl Router {
    /// Run `render`, reporting any error it returns.
    pub fn boundary<T>(&self, render: impl FnOnce() -> Result<T, RouteError>) -> Boundary<T> {
        match render() {
            Ok(output) => Boundary::Rendered(output),
            Err(error) => Boundary::Fallback(self.report_error(error)),
        }
    }
}
