//! # Waypoint CLI Module
//!
//! This module implements the CLI interface for Waypoint.
//!
//! ## Available Commands
//!
//! - `parse` - Decode a URL into parts and query
//! - `build` - Encode parts and query into a URL
//! - `replay` - Run a navigation scenario against the engine
//! - `config` - Show the effective configuration

mod commands;

use crate::AppError;
use crate::config::{Overrides, load_config};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Waypoint - route state you can replay
///
/// Inspects URLs the way the router decodes them and replays navigation
/// scenarios against an in-memory browser.
#[derive(Parser, Debug)]
#[command(name = "waypoint")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the router configuration (TOML)
    #[arg(short = 'c', long, global = true, default_value = "waypoint.toml")]
    pub config: PathBuf,

    /// Override the configured base path
    #[arg(long, global = true)]
    pub base_path: Option<String>,

    /// Override the configured trailing-slash policy
    #[arg(long, global = true)]
    pub trailing_slash: Option<bool>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode a URL into parts and query
    Parse {
        /// Absolute URL to decode
        url: String,
    },

    /// Encode parts and query into a URL
    Build {
        /// Path segment (repeatable, in order)
        #[arg(short, long = "part")]
        parts: Vec<String>,

        /// Query entry as key=value (repeatable)
        #[arg(short = 'Q', long = "query")]
        query: Vec<String>,

        /// Origin the URL is resolved against
        #[arg(short, long, default_value = "http://localhost/")]
        origin: String,
    },

    /// Replay a navigation scenario
    Replay {
        /// Scenario file (TOML)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show the effective configuration
    Config,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            base_path: self.base_path.clone(),
            trailing_slash: self.trailing_slash,
            location: None,
        }
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), AppError> {
    let config = load_config(&cli.config, &cli.overrides())?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Parse { url }) => cmd_parse(&config, json_mode, &url),
        Some(Commands::Build {
            parts,
            query,
            origin,
        }) => cmd_build(&config, json_mode, &parts, &query, &origin),
        Some(Commands::Replay { file }) => cmd_replay(&config, json_mode, &file),
        Some(Commands::Config) | None => cmd_config(&config, &cli.config, json_mode),
    }
}
