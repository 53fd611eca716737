//! Development tooling.
//!
//! [`DevTools`] is an external [`Dispatcher`] that keeps a registry of every
//! engine it is attached to, keyed by debug label. It can hold start actions
//! back until they are run by hand and delay settlements to simulate a slow
//! network.

pub mod history;

pub use history::{StatusHistory, StatusTransition};

use crate::core::{Action, ActionType, AsyncState, StartThunk, Status};
use crate::dispatch::{Dispatch, Dispatcher};
use crate::engine::{LocalSpawner, Spawner};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

/// Status transitions kept per label unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Interception settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DevToolsConfig {
    /// Park start work until [`DevTools::run`] is called
    pub intercept: bool,
    /// Delay applied to every settlement
    pub latency: Duration,
    /// Most recent transitions kept in each label's history
    pub history_limit: usize,
}

impl Default for DevToolsConfig {
    fn default() -> Self {
        Self {
            intercept: false,
            latency: Duration::ZERO,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// What the registry knows about one engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub label: String,
    pub status: Status,
    pub counter: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StatusReport {
    pub fn capture<T, E>(label: &str, state: &AsyncState<T, E>) -> Self {
        Self {
            label: label.to_string(),
            status: state.status,
            counter: state.counter,
            started_at: state.started_at,
            finished_at: state.finished_at,
        }
    }
}

struct Entry {
    report: StatusReport,
    pending_run: Option<StartThunk>,
    history: StatusHistory,
}

struct Registry {
    config: DevToolsConfig,
    entries: BTreeMap<String, Entry>,
}

/// Shared registry and interceptor.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct DevTools {
    registry: Rc<RefCell<Registry>>,
    spawner: Rc<dyn Spawner>,
}

impl DevTools {
    pub fn new(config: DevToolsConfig) -> Self {
        Self::with_spawner(config, Rc::new(LocalSpawner))
    }

    pub fn with_spawner(config: DevToolsConfig, spawner: Rc<dyn Spawner>) -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                config,
                entries: BTreeMap::new(),
            })),
            spawner,
        }
    }

    pub fn config(&self) -> DevToolsConfig {
        self.registry.borrow().config
    }

    /// Turning interception off does not release work already parked.
    pub fn set_intercept(&self, intercept: bool) {
        self.registry.borrow_mut().config.intercept = intercept;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.registry.borrow_mut().config.latency = latency;
    }

    /// Labels of all registered engines, sorted.
    pub fn labels(&self) -> Vec<String> {
        self.registry.borrow().entries.keys().cloned().collect()
    }

    pub fn report(&self, label: &str) -> Option<StatusReport> {
        self.registry
            .borrow()
            .entries
            .get(label)
            .map(|entry| entry.report.clone())
    }

    pub fn history(&self, label: &str) -> Option<StatusHistory> {
        self.registry
            .borrow()
            .entries
            .get(label)
            .map(|entry| entry.history.clone())
    }

    /// Whether start work is parked for `label`.
    pub fn is_parked(&self, label: &str) -> bool {
        self.registry
            .borrow()
            .entries
            .get(label)
            .is_some_and(|entry| entry.pending_run.is_some())
    }

    /// Release the parked start work of `label`.
    ///
    /// Returns `false` when nothing was parked.
    pub fn run(&self, label: &str) -> bool {
        let work = self
            .registry
            .borrow_mut()
            .entries
            .get_mut(label)
            .and_then(|entry| entry.pending_run.take());

        match work {
            Some(work) => {
                debug!(label, "releasing intercepted start");
                work();
                true
            }
            None => false,
        }
    }

    pub(crate) fn register(&self, label: &str, report: StatusReport) {
        let mut registry = self.registry.borrow_mut();
        let history = StatusHistory::with_limit(registry.config.history_limit);
        let previous = registry.entries.insert(
            label.to_string(),
            Entry {
                report,
                pending_run: None,
                history,
            },
        );
        if previous.is_some() {
            debug!(label, "replaced registry entry with the same label");
        }
    }

    pub(crate) fn observe(&self, label: &str, report: StatusReport) {
        let mut registry = self.registry.borrow_mut();
        let Some(entry) = registry.entries.get_mut(label) else {
            return;
        };
        if entry.report.status != report.status {
            entry.history.record(StatusTransition {
                from: entry.report.status,
                to: report.status,
                timestamp: Utc::now(),
                counter: report.counter,
            });
        }
        entry.report = report;
    }

    pub(crate) fn unregister(&self, label: &str) {
        self.registry.borrow_mut().entries.remove(label);
    }

    fn is_registered(&self, label: &str) -> bool {
        self.registry.borrow().entries.contains_key(label)
    }

    fn park(&self, label: &str, work: StartThunk) -> Option<StartThunk> {
        match self.registry.borrow_mut().entries.get_mut(label) {
            Some(entry) => {
                entry.pending_run = Some(work);
                None
            }
            None => Some(work),
        }
    }
}

impl Default for DevTools {
    fn default() -> Self {
        Self::new(DevToolsConfig::default())
    }
}

impl fmt::Debug for DevTools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();
        f.debug_struct("DevTools")
            .field("config", &registry.config)
            .field("labels", &registry.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<T: 'static, E: 'static, P> Dispatcher<T, E, P> for DevTools {
    fn dispatch(&self, mut action: Action<T, E>, inner: Dispatch<T, E>, _props: &P) {
        let label = action.meta().debug_label.clone().unwrap_or_default();
        let config = self.config();

        match action.action_type() {
            ActionType::Start => {
                let work = action.take_start_payload();
                inner(action);

                let Some(work) = work else {
                    return;
                };
                let work = if config.intercept {
                    debug!(label = %label, "intercepted start");
                    self.park(&label, work)
                } else {
                    Some(work)
                };
                if let Some(work) = work {
                    work();
                }
            }
            ActionType::Fulfill | ActionType::Reject if !config.latency.is_zero() => {
                let tools = self.clone();
                self.spawner.spawn(
                    async move {
                        tokio::time::sleep(config.latency).await;
                        if tools.is_registered(&label) {
                            inner(action);
                        } else {
                            debug!(label = %label, "dropping delayed settlement of detached engine");
                        }
                    }
                    .boxed_local(),
                );
            }
            _ => inner(action),
        }
    }
}
