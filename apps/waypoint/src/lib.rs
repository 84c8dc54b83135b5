//! # Waypoint CLI Library
//!
//! Library half of the `waypoint` binary: configuration loading, scenario
//! replay and the clap command tree. Split out so integration tests can
//! drive scenarios without spawning the binary.

pub mod cli;
pub mod config;
pub mod error;
pub mod scenario;

pub use error::AppError;
