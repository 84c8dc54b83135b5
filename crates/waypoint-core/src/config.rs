//! # Router Configuration
//!
//! `RouterConfig` is the plain, serializable option set (what a config file
//! can express). `RouterOptions` adds the pieces that are code: the URL codec
//! and the 404 correction callback.

use crate::codec::{UrlCodec, WebCodec};
use crate::primitives::{DEFAULT_BASE_PATH, DEFAULT_TRANSITION_LIMIT_MS, PATH_SEPARATOR};
use crate::{Parts, Query, RouteError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use url::Url;

// =============================================================================
// QUERY RETENTION
// =============================================================================

/// Which query keys survive garbage collection once no consumer reads them.
///
/// In a config file this is either a boolean (`true` disables collection
/// entirely, `false` keeps nothing) or a list of keys to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeepQuery {
    /// `true`: never collect; `false`: collect every unread key.
    All(bool),
    /// Collect every unread key except these.
    Keys(Vec<String>),
}

impl Default for KeepQuery {
    fn default() -> Self {
        Self::Keys(Vec::new())
    }
}

impl KeepQuery {
    /// Check if query garbage collection is disabled.
    #[must_use]
    pub fn keeps_all(&self) -> bool {
        matches!(self, Self::All(true))
    }

    /// Check if `key` must be retained.
    #[must_use]
    pub fn keeps(&self, key: &str) -> bool {
        match self {
            Self::All(all) => *all,
            Self::Keys(keys) => keys.iter().any(|k| k == key),
        }
    }
}

// =============================================================================
// ROUTER CONFIG
// =============================================================================

/// Serializable router settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Prefix every routed path starts with. Must begin and end with `/`.
    pub base_path: String,
    /// Initial URL. Required unless the host supplies one.
    pub location: Option<String>,
    /// Emit a trailing `/` after the last segment.
    pub trailing_slash: bool,
    /// Tolerate segments no consumer depends on. When `false`, they raise a 404.
    pub allow_extra_parts: bool,
    /// Query keys retained after their last reader unmounts.
    pub keep_extra_query: KeepQuery,
    /// Time budget before a deferred update batch is flushed directly.
    pub transition_limit_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            location: None,
            trailing_slash: false,
            allow_extra_parts: true,
            keep_extra_query: KeepQuery::default(),
            transition_limit_ms: DEFAULT_TRANSITION_LIMIT_MS,
        }
    }
}

impl RouterConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base path.
    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Set the initial location.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Set the trailing-slash policy.
    #[must_use]
    pub fn with_trailing_slash(mut self, enabled: bool) -> Self {
        self.trailing_slash = enabled;
        self
    }

    /// Set the extra-parts policy.
    #[must_use]
    pub fn with_allow_extra_parts(mut self, allowed: bool) -> Self {
        self.allow_extra_parts = allowed;
        self
    }

    /// Set the query retention policy.
    #[must_use]
    pub fn with_keep_extra_query(mut self, keep: KeepQuery) -> Self {
        self.keep_extra_query = keep;
        self
    }

    /// Check the configuration for startup errors.
    pub fn validate(&self) -> Result<(), RouteError> {
        let base = &self.base_path;
        if !base.starts_with(PATH_SEPARATOR) || !base.ends_with(PATH_SEPARATOR) {
            return Err(RouteError::InvalidBasePath(base.clone()));
        }
        Ok(())
    }

    /// The transition limit as a duration.
    #[must_use]
    pub fn transition_limit(&self) -> Duration {
        Duration::from_millis(self.transition_limit_ms)
    }

    /// Parse the configured initial location, if any.
    pub fn initial_location(&self) -> Result<Option<Url>, RouteError> {
        self.location
            .as_deref()
            .map(|href| Url::parse(href).map_err(RouteError::from))
            .transpose()
    }
}

// =============================================================================
// ROUTER OPTIONS
// =============================================================================

/// Fallback correction for not-found errors: given the current route,
/// return the route to silently replace it with.
pub type NotFoundHandler = Rc<dyn Fn(&Parts, &Query) -> Option<(Parts, Query)>>;

/// Complete router options: configuration plus pluggable behaviour.
#[derive(Clone)]
pub struct RouterOptions {
    /// Serializable settings.
    pub config: RouterConfig,
    /// URL ⇄ (parts, query) strategy.
    pub codec: Rc<dyn UrlCodec>,
    /// Optional 404 correction, consulted after the traps.
    pub on_404: Option<NotFoundHandler>,
}

impl fmt::Debug for RouterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterOptions")
            .field("config", &self.config)
            .field("on_404", &self.on_404.is_some())
            .finish()
    }
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self::from_config(RouterConfig::default())
    }
}

impl RouterOptions {
    /// Wrap a configuration with the default codec and no 404 handler.
    #[must_use]
    pub fn from_config(config: RouterConfig) -> Self {
        Self {
            config,
            codec: Rc::new(WebCodec),
            on_404: None,
        }
    }

    /// Replace the URL codec.
    #[must_use]
    pub fn with_codec(mut self, codec: impl UrlCodec + 'static) -> Self {
        self.codec = Rc::new(codec);
        self
    }

    /// Install a 404 correction callback.
    #[must_use]
    pub fn on_404(
        mut self,
        handler: impl Fn(&Parts, &Query) -> Option<(Parts, Query)> + 'static,
    ) -> Self {
        self.on_404 = Some(Rc::new(handler));
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================
