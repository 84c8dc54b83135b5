//! # Traps
//!
//! Consumer-registered interception hooks.
//!
//! A trap is attached to one protocol point ([`TrapKind`]):
//! - `Detour`: consulted before a navigation is applied
//! - `NotFound`: offered 404 errors first
//! - `Error`: offered every rendering error not settled by a `NotFound` trap
//!
//! Each consumer holds at most one trap per kind. Registering again replaces
//! the previous trap and moves it to the end of the invocation order.

use crate::detour::Detour;
use crate::store::ConsumerId;
use crate::{Parts, Query, RouteError, TrapKind};
use std::fmt;
use std::rc::Rc;

/// Detour trap: return `true` to take part in the decision, then settle the
/// detour with `proceed()` or `prevent()` (now or later).
pub type DetourTrap = Rc<dyn Fn(&Detour) -> bool>;

/// Error trap: decide what happens to a reported rendering error.
pub type ErrorTrap = Rc<dyn Fn(&RouteError) -> ErrorAction>;

/// Outcome of an error trap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorAction {
    /// Not handled here; offer it to the next trap.
    Pass,
    /// Handled; the reporting boundary renders its fallback.
    Absorb,
    /// Handled by the trap itself (e.g. it navigated); keep rendering.
    Resume,
    /// Silently replace the current route.
    Redirect { parts: Parts, query: Query },
}

/// A trap registration.
#[derive(Clone)]
pub enum Trap {
    Detour(DetourTrap),
    Error(ErrorTrap),
    NotFound(ErrorTrap),
}

impl fmt::Debug for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trap::{:?}", self.kind())
    }
}

impl Trap {
    /// Build a detour trap.
    pub fn detour(f: impl Fn(&Detour) -> bool + 'static) -> Self {
        Self::Detour(Rc::new(f))
    }

    /// Build an error trap.
    pub fn error(f: impl Fn(&RouteError) -> ErrorAction + 'static) -> Self {
        Self::Error(Rc::new(f))
    }

    /// Build a not-found trap.
    pub fn not_found(f: impl Fn(&RouteError) -> ErrorAction + 'static) -> Self {
        Self::NotFound(Rc::new(f))
    }

    /// The protocol point this trap is attached to.
    #[must_use]
    pub fn kind(&self) -> TrapKind {
        match self {
            Self::Detour(_) => TrapKind::Detour,
            Self::Error(_) => TrapKind::Error,
            Self::NotFound(_) => TrapKind::NotFound,
        }
    }
}

/// Ordered trap registrations across all consumers.
#[derive(Default)]
pub(crate) struct TrapRegistry {
    entries: Vec<(ConsumerId, Trap)>,
}

impl TrapRegistry {
    /// Register `trap` for `owner`, replacing its previous trap of that kind.
    pub(crate) fn set(&mut self, owner: ConsumerId, trap: Trap) {
        self.remove(owner, trap.kind());
        self.entries.push((owner, trap));
    }

    /// Drop `owner`'s trap of `kind`. Returns whether one existed.
    pub(crate) fn remove(&mut self, owner: ConsumerId, kind: TrapKind) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|(id, trap)| *id != owner || trap.kind() != kind);
        self.entries.len() != before
    }

    /// Drop every trap `owner` registered.
    pub(crate) fn remove_owner(&mut self, owner: ConsumerId) {
        self.entries.retain(|(id, _)| *id != owner);
    }

    /// Detour traps in invocation order.
    pub(crate) fn detour_traps(&self) -> Vec<DetourTrap> {
        self.entries
            .iter()
            .filter_map(|(_, trap)| match trap {
                Trap::Detour(f) => Some(Rc::clone(f)),
                _ => None,
            })
            .collect()
    }

    /// Error traps that may handle `error`: not-found traps first when it is
    /// a 404, then general error traps.
    pub(crate) fn error_traps(&self, error: &RouteError) -> Vec<ErrorTrap> {
        let not_found = self.entries.iter().filter_map(|(_, trap)| match trap {
            Trap::NotFound(f) if error.is_not_found() => Some(Rc::clone(f)),
            _ => None,
        });
        let general = self.entries.iter().filter_map(|(_, trap)| match trap {
            Trap::Error(f) => Some(Rc::clone(f)),
            _ => None,
        });
        not_found.chain(general).collect()
    }

    /// Number of registered traps of `kind`.
    pub(crate) fn count(&self, kind: TrapKind) -> usize {
        self.entries
            .iter()
            .filter(|(_, trap)| trap.kind() == kind)
            .count()
    }
}

// =============================================================================
// TESTS
// =============================================================================
