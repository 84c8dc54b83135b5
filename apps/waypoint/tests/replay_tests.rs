//! Integration tests for configuration loading and scenario replay.

use std::path::PathBuf;
use tempfile::TempDir;
use waypoint::AppError;
use waypoint::config::{Overrides, load_config};
use waypoint::scenario::{self, Scenario};
use waypoint_core::{RouteError, RouterConfig};

fn write(dir: &TempDir, name: &str, text: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, text).expect("write");
    path
}

fn replay(text: &str) -> scenario::Report {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "scenario.toml", text);
    let scenario = Scenario::load(&path).expect("load");
    scenario::run(&scenario, &RouterConfig::default()).expect("run")
}

// =============================================================================
// CONFIGURATION TESTS
// =============================================================================

#[test]
fn test_config_file_with_overrides() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(
        &dir,
        "waypoint.toml",
        "base_path = \"/app/\"\ntrailing_slash = true\nkeep_extra_query = [\"utm\"]\n",
    );
    let overrides = Overrides {
        trailing_slash: Some(false),
        ..Overrides::default()
    };

    let config = load_config(&path, &overrides).expect("config");
    assert_eq!(config.base_path, "/app/");
    assert!(!config.trailing_slash);
    assert!(config.keep_extra_query.keeps("utm"));
}

#[test]
fn test_config_invalid_base_path() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "waypoint.toml", "base_path = \"app\"\n");
    let result = load_config(&path, &Overrides::default());
    assert!(matches!(
        result,
        Err(AppError::Route(RouteError::InvalidBasePath(_)))
    ));
}

#[test]
fn test_config_malformed_toml() {
    let dir = TempDir::new().expect("tempdir");
    let path = write(&dir, "waypoint.toml", "base_path = \n");
    let result = load_config(&path, &Overrides::default());
    assert!(matches!(result, Err(AppError::ConfigParse { .. })));
}

// =============================================================================
// REPLAY TESTS
// =============================================================================

#[test]
fn test_replay_dispatches_only_affected_consumers() {
    let report = replay(
        r#"
        location = "http://localhost/users/42?tab=info"

        [[consumers]]
        name = "shell"
        root = true
        parts = [0]

        [[consumers]]
        name = "tabs"
        query = ["tab"]

        [[steps]]
        action = "set-query"
        key = "tab"
        value = "posts"

        [[steps]]
        action = "navigate"
        href = "/teams"

        [[steps]]
        action = "back"
        "#,
    );

    let first = &report.steps[0];
    assert_eq!(first.location, "http://localhost/users/42?tab=posts");
    assert_eq!(first.dispatched, ["tabs"]);

    // the root halts the batch
    let second = &report.steps[1];
    assert_eq!(second.location, "http://localhost/teams");
    assert_eq!(second.dispatched, ["shell"]);

    let third = &report.steps[2];
    assert_eq!(third.location, "http://localhost/users/42?tab=posts");
    assert_eq!(report.history.len(), 2);
    assert_eq!(report.history_index, 0);
}

#[test]
fn test_replay_prevented_link_stays_put() {
    let report = replay(
        r#"
        location = "http://localhost/editor"

        [[consumers]]
        name = "guard"

        [[steps]]
        action = "detour-trap"
        consumer = "guard"
        decision = "prevent"

        [[steps]]
        action = "link"
        href = "/elsewhere"
        "#,
    );

    let link = &report.steps[1];
    assert_eq!(link.location, "http://localhost/editor");
    assert_eq!(link.notes, ["link Deferred"]);
    assert_eq!(link.detours.len(), 1);
    assert!(link.detours[0].ends_with("Prevent"));
    assert_eq!(report.history.len(), 1);
}

#[test]
fn test_replay_collects_orphaned_query_on_next_navigation() {
    let report = replay(
        r#"
        location = "http://localhost/?a=1&b=2"

        [[consumers]]
        name = "shell"
        root = true
        parts = [0]

        [[consumers]]
        name = "reader"
        query = ["a"]

        [[steps]]
        action = "unmount"
        consumer = "reader"

        [[steps]]
        action = "navigate"
        href = "/x?a=1&b=2"
        "#,
    );

    assert_eq!(report.steps[0].location, "http://localhost/?a=1&b=2");
    assert_eq!(report.location, "http://localhost/x?b=2");
}
