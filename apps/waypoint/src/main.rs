//! # Waypoint - Route State CLI
//!
//! The command-line driver for the Waypoint route-state engine.
//!
//! This application provides:
//! - URL inspection through the default codec
//! - Scenario replay against an in-memory browser
//! - Effective-configuration display
//!
//! ## Usage
//!
//! ```bash
//! waypoint parse "http://localhost/users/42?tab=info"
//! waypoint build -p users -p 42 -Q tab=info
//! waypoint replay -f scenario.toml --json-mode
//! waypoint config --base-path /app/
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waypoint::cli;

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // WAYPOINT_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("WAYPOINT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_level = if cli.verbose {
        "waypoint=debug"
    } else {
        "waypoint=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env("WAYPOINT_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| default_level.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Waypoint startup banner.
fn print_banner() {
    println!(
        r#"
  waypoint v{}
  route state, replayable
"#,
        env!("CARGO_PKG_VERSION")
    );
}
