//! # URL Codec
//!
//! Conversion between a URL and `(parts, query)`.
//!
//! The engine never interprets URLs itself; it calls a `UrlCodec`. The
//! default `WebCodec` maps the path below the base prefix to `parts` and the
//! query string to `query`.
//!
//! ## Round-Trip Law
//!
//! For well-formed entries (non-empty segments that are not `.`/`..`):
//! `parse_url(create_url(parts, query)) == (parts, query)`.

use crate::config::RouterConfig;
use crate::primitives::PATH_SEPARATOR;
use crate::{Parts, Query, RouteError};
use url::Url;

/// Strategy converting URLs to route state and back.
///
/// Implementations derive `parts` from the path and `query` from the query
/// string only: the store skips decoding a dimension whose raw URL component
/// did not change.
pub trait UrlCodec {
    /// Decode the path segments below the base path.
    ///
    /// Returns `RouteError::PathMismatch` if the path is outside the base path.
    fn parse_parts(&self, url: &Url, config: &RouterConfig) -> Result<Parts, RouteError>;

    /// Decode the query mapping.
    fn parse_query(&self, url: &Url, config: &RouterConfig) -> Result<Query, RouteError>;

    /// Decode both dimensions.
    fn parse_url(&self, url: &Url, config: &RouterConfig) -> Result<(Parts, Query), RouteError> {
        Ok((self.parse_parts(url, config)?, self.parse_query(url, config)?))
    }

    /// Build a URL for `(parts, query)`, resolved against `current`.
    fn create_url(
        &self,
        current: &Url,
        parts: &Parts,
        query: &Query,
        config: &RouterConfig,
    ) -> Result<Url, RouteError>;
}

/// The default codec: `/{base}/{part}/{part}?{key}={value}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebCodec;

impl UrlCodec for WebCodec {
    fn parse_parts(&self, url: &Url, config: &RouterConfig) -> Result<Parts, RouteError> {
        let path = url.path();
        let Some(rest) = path.strip_prefix(config.base_path.as_str()) else {
            return Err(RouteError::PathMismatch {
                path: path.to_string(),
                base: config.base_path.clone(),
            });
        };
        let mut segments = rest
            .split(PATH_SEPARATOR)
            .map(|segment| {
                urlencoding::decode(segment)
                    .map(|s| s.into_owned())
                    .map_err(|e| RouteError::InvalidUrl(format!("segment \"{}\": {}", segment, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if segments.last().is_some_and(String::is_empty) {
            segments.pop();
        }
        Ok(Parts::from(segments))
    }

    fn parse_query(&self, url: &Url, _config: &RouterConfig) -> Result<Query, RouteError> {
        Ok(url.query_pairs().collect())
    }

    fn create_url(
        &self,
        current: &Url,
        parts: &Parts,
        query: &Query,
        config: &RouterConfig,
    ) -> Result<Url, RouteError> {
        let mut path = parts
            .iter()
            .map(|part| urlencoding::encode(part).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if !parts.is_empty() && config.trailing_slash {
            path.push(PATH_SEPARATOR);
        }
        if current.cannot_be_a_base() {
            return Err(RouteError::InvalidUrl(format!(
                "\"{}\" cannot hold a path",
                current
            )));
        }
        // origin always comes from the current location
        let mut url = current.clone();
        url.set_path(&format!("{}{}", config.base_path, path));
        url.set_fragment(None);
        if query.is_empty() {
            url.set_query(None);
        } else {
            let mut pairs = url.query_pairs_mut();
            pairs.clear();
            for (key, value) in query.iter() {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

// =============================================================================
// TESTS
// =============================================================================
