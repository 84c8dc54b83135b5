//! # Scenario Replay
//!
//! Drives a router with the in-memory host through a list of steps, with
//! simulated consumers standing in for rendered components.
//!
//! ```toml
//! location = "http://localhost/users/42?tab=info"
//!
//! [[consumers]]
//! name = "shell"
//! root = true
//! parts = [0]
//!
//! [[consumers]]
//! name = "tabs"
//! query = ["tab"]
//!
//! [[steps]]
//! action = "set-query"
//! key = "tab"
//! value = "posts"
//!
//! [[steps]]
//! action = "back"
//! ```
//!
//! Each consumer re-renders when dispatched (the root re-renders every
//! consumer), reading the part indices and query keys it declares.

use crate::AppError;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use url::Url;
use waypoint_core::{
    Boundary, HistoryEntry, LinkActivation, LocalHost, Parts, Query, RouteError, RouteSession,
    RouteView, Router, RouterConfig, RouterOptions, Trap,
};

/// Start location when neither the scenario nor the config names one.
pub const DEFAULT_LOCATION: &str = "http://localhost/";

// =============================================================================
// SCENARIO FILE
// =============================================================================

/// A replayable navigation scenario.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Initial URL. Overrides the configured location.
    pub location: Option<String>,
    pub consumers: Vec<ConsumerSpec>,
    pub steps: Vec<Step>,
}

/// A simulated component and the route state it reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConsumerSpec {
    pub name: String,
    #[serde(default)]
    pub root: bool,
    /// Part indices read on every render.
    #[serde(default)]
    pub parts: Vec<usize>,
    /// Query keys read on every render.
    #[serde(default)]
    pub query: Vec<String>,
}

/// How a detour trap settles the detours it sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Proceed,
    Prevent,
}

fn default_push() -> bool {
    true
}

/// One scenario step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Step {
    Navigate {
        href: String,
        #[serde(default = "default_push")]
        push: bool,
    },
    SetPart {
        index: usize,
        value: String,
    },
    SetQuery {
        key: String,
        value: String,
    },
    RemoveQuery {
        key: String,
    },
    Link {
        href: String,
    },
    Back,
    Forward,
    Unmount {
        consumer: String,
    },
    DetourTrap {
        consumer: String,
        decision: Decision,
    },
}

impl Step {
    /// The `action` tag of this step.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Navigate { .. } => "navigate",
            Self::SetPart { .. } => "set-part",
            Self::SetQuery { .. } => "set-query",
            Self::RemoveQuery { .. } => "remove-query",
            Self::Link { .. } => "link",
            Self::Back => "back",
            Self::Forward => "forward",
            Self::Unmount { .. } => "unmount",
            Self::DetourTrap { .. } => "detour-trap",
        }
    }
}

impl Scenario {
    /// Parse a scenario from TOML text. `origin` names the source in errors.
    pub fn from_toml(text: &str, origin: &str) -> Result<Self, AppError> {
        let scenario: Self = toml::from_str(text).map_err(|e| AppError::ConfigParse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        if scenario.consumers.iter().filter(|c| c.root).count() > 1 {
            return Err(AppError::Scenario {
                step: 0,
                message: "at most one consumer may be the root".to_string(),
            });
        }
        Ok(scenario)
    }

    /// Read and parse a scenario file.
    pub fn load(path: &std::path::Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text, &path.display().to_string())
    }
}

// =============================================================================
// REPORT
// =============================================================================

/// What happened during one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub action: String,
    pub location: String,
    /// Consumers dispatched, in dispatch order.
    pub dispatched: Vec<String>,
    /// Detours seen by traps.
    pub detours: Vec<String>,
    /// Render failures and link outcomes.
    pub notes: Vec<String>,
}

/// Result of a replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub initial: String,
    pub steps: Vec<StepReport>,
    pub location: String,
    pub history: Vec<HistoryEntry>,
    pub history_index: usize,
}

// =============================================================================
// REPLAY
// =============================================================================

struct Simulated {
    spec: ConsumerSpec,
    session: RouteSession,
}

type Journal = Rc<RefCell<Vec<String>>>;

fn drain(journal: &Journal) -> Vec<String> {
    std::mem::take(&mut *journal.borrow_mut())
}

/// Render `consumer` once. Returns a note if the render failed.
fn render(router: &Router, consumer: &Simulated) -> Option<String> {
    let spec = &consumer.spec;
    let read = |parts: &RouteView<Parts>, query: &RouteView<Query>| -> Result<(), RouteError> {
        for &index in &spec.parts {
            parts.get(index)?;
        }
        for key in &spec.query {
            query.get(key.as_str())?;
        }
        Ok(())
    };

    if consumer.session.is_root() {
        // the root shows the error instead of reporting it again
        return consumer
            .session
            .render(read)
            .err()
            .map(|e| format!("{} rendered error page: {}", spec.name, e));
    }
    match router.boundary(|| consumer.session.render(read)) {
        Boundary::Rendered(()) => None,
        Boundary::Fallback(recovery) => Some(format!("{} fell back: {:?}", spec.name, recovery)),
    }
}

/// Re-render whoever was dispatched. The root takes the whole tree with it.
fn rerender(router: &Router, consumers: &[Simulated], dispatched: &[String]) -> Vec<String> {
    let root_dispatched = consumers
        .iter()
        .any(|c| c.spec.root && dispatched.contains(&c.spec.name));
    consumers
        .iter()
        .filter(|c| root_dispatched || dispatched.contains(&c.spec.name))
        .filter_map(|c| render(router, c))
        .collect()
}

/// Replay `scenario` against a fresh router configured by `config`.
pub fn run(scenario: &Scenario, config: &RouterConfig) -> Result<Report, AppError> {
    let start = scenario
        .location
        .as_deref()
        .or(config.location.as_deref())
        .unwrap_or(DEFAULT_LOCATION);
    let start = Url::parse(start)
        .map_err(|e| AppError::InvalidArgument(format!("location \"{}\": {}", start, e)))?;

    let local = LocalHost::new(start);
    let mut config = config.clone();
    config.location = None;
    let router = Router::new(RouterOptions::from_config(config), local.host())?;
    let initial = router.location().to_string();
    tracing::info!(location = %initial, steps = scenario.steps.len(), "replaying scenario");

    let dispatched: Journal = Rc::default();
    let detours: Journal = Rc::default();

    let mut ordered: Vec<&ConsumerSpec> = scenario.consumers.iter().filter(|c| c.root).collect();
    ordered.extend(scenario.consumers.iter().filter(|c| !c.root));
    let mut consumers: Vec<Simulated> = ordered
        .into_iter()
        .map(|spec| {
            let journal = Rc::clone(&dispatched);
            let name = spec.name.clone();
            let dispatch = move || journal.borrow_mut().push(name.clone());
            let session = if spec.root {
                router.attach_root(dispatch)
            } else {
                router.subscribe(dispatch)
            };
            Simulated {
                spec: spec.clone(),
                session,
            }
        })
        .collect();
    for consumer in &consumers {
        if let Some(note) = render(&router, consumer) {
            tracing::warn!(note = %note, "initial render failed");
        }
        consumer.session.mount();
    }
    local.settle(&router);
    drain(&dispatched);

    let editor = router.sequential_session();
    let mut steps = Vec::with_capacity(scenario.steps.len());

    for (n, step) in scenario.steps.iter().enumerate() {
        let number = n + 1;
        tracing::debug!(step = number, action = step.action(), "scenario step");
        let mut notes = Vec::new();
        match step {
            Step::Navigate { href, push } => router
                .navigate(href, *push)
                .map_err(|e| AppError::at_step(number, e))?,
            Step::SetPart { index, value } => editor
                .parts()
                .set(*index, value.as_str())
                .map_err(|e| AppError::at_step(number, e))?,
            Step::SetQuery { key, value } => editor
                .query()
                .set(key.as_str(), value.as_str())
                .map_err(|e| AppError::at_step(number, e))?,
            Step::RemoveQuery { key } => {
                editor
                    .query()
                    .remove(key)
                    .map_err(|e| AppError::at_step(number, e))?;
            }
            Step::Link { href } => {
                let url = router
                    .resolve(href)
                    .map_err(|e| AppError::at_step(number, e))?;
                let outcome = router.on_link_activation(&LinkActivation::new(url));
                notes.push(format!("link {:?}", outcome));
            }
            Step::Back => local.go(&router, -1),
            Step::Forward => local.go(&router, 1),
            Step::Unmount { consumer } => {
                let before = consumers.len();
                consumers.retain(|c| &c.spec.name != consumer);
                if consumers.len() == before {
                    return Err(AppError::at_step(
                        number,
                        format!("unknown consumer \"{}\"", consumer),
                    ));
                }
            }
            Step::DetourTrap { consumer, decision } => {
                let target = consumers
                    .iter()
                    .find(|c| &c.spec.name == consumer)
                    .ok_or_else(|| {
                        AppError::at_step(number, format!("unknown consumer \"{}\"", consumer))
                    })?;
                let journal = Rc::clone(&detours);
                let decision = *decision;
                target.session.trap(Trap::detour(move |detour| {
                    let settled = match decision {
                        Decision::Proceed => detour.proceed(),
                        Decision::Prevent => detour.prevent(),
                    };
                    journal.borrow_mut().push(format!(
                        "{} {} -> {:?}",
                        detour.reason(),
                        detour.url(),
                        decision
                    ));
                    settled.is_ok()
                }));
            }
        }

        local.settle(&router);
        let mut names = drain(&dispatched);
        notes.extend(rerender(&router, &consumers, &names));
        local.settle(&router);
        names.extend(drain(&dispatched));

        steps.push(StepReport {
            step: number,
            action: step.action().to_string(),
            location: router.location().to_string(),
            dispatched: names,
            detours: drain(&detours),
            notes,
        });
    }

    Ok(Report {
        initial,
        steps,
        location: router.location().to_string(),
        history: router.history(),
        history_index: router.history_index(),
    })
}

// =============================================================================
// TESTS
// =============================================================================
