//! # Configuration Loading
//!
//! Reads a `RouterConfig` from a TOML file and applies command-line
//! overrides on top. A missing file is not an error: defaults apply.

use crate::AppError;
use std::path::Path;
use waypoint_core::RouterConfig;

/// Values given on the command line, each overriding the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub base_path: Option<String>,
    pub trailing_slash: Option<bool>,
    pub location: Option<String>,
}

/// Parse a config from TOML text. `origin` names the source in errors.
pub fn parse_config(text: &str, origin: &str) -> Result<RouterConfig, AppError> {
    toml::from_str(text).map_err(|e| AppError::ConfigParse {
        path: origin.to_string(),
        message: e.to_string(),
    })
}

/// Load `path` (defaults if absent), apply `overrides` and validate.
pub fn load_config(path: &Path, overrides: &Overrides) -> Result<RouterConfig, AppError> {
    let mut config = if path.exists() {
        let text = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "loaded configuration file");
        parse_config(&text, &path.display().to_string())?
    } else {
        tracing::debug!(path = %path.display(), "no configuration file, using defaults");
        RouterConfig::default()
    };

    if let Some(base_path) = &overrides.base_path {
        config.base_path.clone_from(base_path);
    }
    if let Some(trailing_slash) = overrides.trailing_slash {
        config.trailing_slash = trailing_slash;
    }
    if let Some(location) = &overrides.location {
        config.location = Some(location.clone());
    }
    config.validate()?;
    Ok(config)
}

// =============================================================================
// TESTS
// =============================================================================
