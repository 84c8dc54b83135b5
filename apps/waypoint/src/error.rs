//! # CLI Errors

use thiserror::Error;
use waypoint_core::RouteError;

/// Errors surfaced by the `waypoint` binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Reading a config or scenario file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A TOML file did not match the expected shape.
    #[error("Invalid TOML in {path}: {message}")]
    ConfigParse { path: String, message: String },

    /// A scenario step could not be carried out.
    #[error("Scenario step {step}: {message}")]
    Scenario { step: usize, message: String },

    /// A command-line value was malformed.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// JSON output could not be produced.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The route engine rejected an operation.
    #[error(transparent)]
    Route(#[from] RouteError),
}

impl AppError {
    /// Wrap an engine error with the scenario step it occurred in.
    pub fn at_step(step: usize, error: impl std::fmt::Display) -> Self {
        Self::Scenario {
            step,
            message: error.to_string(),
        }
    }
}
