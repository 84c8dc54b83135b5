//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::AppError;
use crate::scenario::{self, Report, Scenario};
use std::path::Path;
use url::Url;
use waypoint_core::{Parts, Query, RouterConfig, UrlCodec, WebCodec};

fn parse_absolute(href: &str) -> Result<Url, AppError> {
    Url::parse(href).map_err(|e| AppError::InvalidArgument(format!("\"{}\": {}", href, e)))
}

/// Split `key=value` pairs. A bare `key` gets an empty value.
pub fn parse_query_args(pairs: &[String]) -> Result<Query, AppError> {
    let mut query = Query::new();
    for pair in pairs {
        let (key, value) = pair.split_once('=').unwrap_or((pair.as_str(), ""));
        if key.is_empty() {
            return Err(AppError::InvalidArgument(format!(
                "query entry \"{}\" has no key",
                pair
            )));
        }
        query.insert(key, value);
    }
    Ok(query)
}

fn print_json(value: &impl serde::Serialize) -> Result<(), AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// PARSE COMMAND
// =============================================================================

/// Decode a URL the way the router would.
pub fn cmd_parse(config: &RouterConfig, json_mode: bool, href: &str) -> Result<(), AppError> {
    let url = parse_absolute(href)?;
    let (parts, query) = WebCodec.parse_url(&url, config)?;

    if json_mode {
        return print_json(&serde_json::json!({
            "url": url.as_str(),
            "parts": parts,
            "query": query,
        }));
    }

    println!("URL:   {}", url);
    println!("Parts: {}", parts.len());
    for (index, part) in parts.iter().enumerate() {
        println!("  [{}] {}", index, part);
    }
    println!("Query: {}", query.len());
    for (key, value) in query.iter() {
        println!("  {} = {}", key, value);
    }
    Ok(())
}

// =============================================================================
// BUILD COMMAND
// =============================================================================

/// Encode parts and query into a URL.
pub fn cmd_build(
    config: &RouterConfig,
    json_mode: bool,
    parts: &[String],
    query: &[String],
    origin: &str,
) -> Result<(), AppError> {
    let origin = parse_absolute(origin)?;
    let query = parse_query_args(query)?;
    let parts: Parts = parts.iter().collect();
    let url = WebCodec.create_url(&origin, &parts, &query, config)?;

    if json_mode {
        return print_json(&serde_json::json!({ "url": url.as_str() }));
    }
    println!("{}", url);
    Ok(())
}

// =============================================================================
// REPLAY COMMAND
// =============================================================================

/// Replay a scenario file and print what happened.
pub fn cmd_replay(config: &RouterConfig, json_mode: bool, file: &Path) -> Result<(), AppError> {
    let scenario = Scenario::load(file)?;
    let report = scenario::run(&scenario, config)?;

    if json_mode {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &Report) {
    println!("Waypoint Replay");
    println!("===============");
    println!("Start: {}", report.initial);
    println!();

    for step in &report.steps {
        println!("{:>3}. {:<13} {}", step.step, step.action, step.location);
        if !step.dispatched.is_empty() {
            println!("       dispatched: {}", step.dispatched.join(", "));
        }
        for detour in &step.detours {
            println!("       detour: {}", detour);
        }
        for note in &step.notes {
            println!("       note: {}", note);
        }
    }

    println!();
    println!("History:");
    for entry in &report.history {
        let marker = if entry.index == report.history_index {
            ">"
        } else {
            " "
        };
        println!("  {} {} {}", marker, entry.index, entry.href);
    }
}

// =============================================================================
// CONFIG COMMAND
// =============================================================================

/// Show the effective configuration.
pub fn cmd_config(config: &RouterConfig, source: &Path, json_mode: bool) -> Result<(), AppError> {
    if json_mode {
        return print_json(config);
    }

    println!("Waypoint Configuration");
    println!("======================");
    println!("Source: {}", source.display());
    println!();
    println!("Base Path:           {}", config.base_path);
    println!(
        "Location:            {}",
        config.location.as_deref().unwrap_or("(from host)")
    );
    println!("Trailing Slash:      {}", config.trailing_slash);
    println!("Allow Extra Parts:   {}", config.allow_extra_parts);
    println!("Keep Extra Query:    {:?}", config.keep_extra_query);
    println!("Transition Limit:    {} ms", config.transition_limit_ms);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
