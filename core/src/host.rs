//! Execution host
//!
//! Runs every script on its own thread in its own environment, waits for
//! all of them, and reports one notice line per script plus a summary.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::thread;

use crate::bridge::HostBridge;
use crate::config::HostConfig;
use crate::debug::{DebugConfig, DebugCoordinator, DebugService, DebugSessionStats, InspectorService};
use crate::engine::ScriptEngine;
use crate::environment::{EnvironmentContext, EnvironmentHandle, ExecutionEnvironment};
use crate::error::ScriptError;
use crate::registry::SourceRegistry;

/// Why a script did not complete
#[derive(Debug, thiserror::Error)]
pub enum TaskFailure {
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// The script's thread could not be started
    #[error("failed to spawn script thread: {0}")]
    Spawn(std::io::Error),

    #[error("script thread panicked: {0}")]
    Panicked(String),
}

impl TaskFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Script(e) => e.kind(),
            Self::Spawn(_) => "Spawn",
            Self::Panicked(_) => "Panicked",
        }
    }
}

/// Result of one script
#[derive(Debug)]
pub struct TaskOutcome {
    /// Position of the script on the command line
    pub index: usize,
    pub path: String,
    /// Environment the script ran in, if one was constructed
    pub handle: Option<EnvironmentHandle>,
    pub result: Result<(), TaskFailure>,
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        self.result.is_ok()
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(()) => write!(f, "executed script {} ({})", self.index, self.path),
            Err(e) => write!(f, "script {} ({}) failed: {}", self.index, self.path, e),
        }
    }
}

/// Outcomes of a [`Host::run`], in command-line order
#[derive(Debug, Default)]
pub struct HostReport {
    pub outcomes: Vec<TaskOutcome>,
    /// Final state of the debug session, when one was configured
    pub debug: Option<DebugSessionStats>,
}

impl HostReport {
    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_completed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.completed()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// The aggregate line written after all scripts finish
    pub fn summary(&self) -> String {
        format!(
            "all scripts finished: {} completed, {} failed",
            self.completed(),
            self.failed()
        )
    }
}

/// Runs a batch of scripts concurrently
///
/// The debug session, if any, lives for exactly one [`run`](Self::run):
/// it stays up until every script thread has been joined and is stopped
/// once afterwards. `run` therefore consumes the host.
pub struct Host<E: ScriptEngine, S: DebugService = InspectorService> {
    config: HostConfig,
    engine: Arc<E>,
    service: Option<S>,
    bridge: Arc<HostBridge>,
}

impl<E: ScriptEngine> Host<E> {
    /// Host without a debug session
    pub fn new(config: HostConfig, engine: E) -> Self {
        if config.debug.is_some() {
            tracing::warn!("debug settings ignored: no debug service supplied");
        }
        Self {
            config,
            engine: Arc::new(engine),
            service: None,
            bridge: Arc::new(HostBridge::stdout()),
        }
    }
}

impl<E: ScriptEngine, S: DebugService> Host<E, S> {
    /// Host whose scripts all attach to one session on `service`
    ///
    /// Uses `config.debug`, or the default debug settings when unset.
    pub fn with_debug_service(config: HostConfig, engine: E, service: S) -> Self {
        Self {
            config,
            engine: Arc::new(engine),
            service: Some(service),
            bridge: Arc::new(HostBridge::stdout()),
        }
    }

    /// Send script output and notices to `bridge` instead of stdout
    pub fn with_bridge(mut self, bridge: Arc<HostBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    /// Run every script to completion
    ///
    /// Returns once every script thread has been joined. Failures of one
    /// script never affect the others.
    pub fn run(self, paths: &[String]) -> HostReport {
        if paths.is_empty() {
            return HostReport::default();
        }

        let Self {
            config,
            engine,
            service,
            bridge,
        } = self;

        let registry = Arc::new(SourceRegistry::new());
        let coordinator = service.map(|service| {
            let debug_config = config.debug.clone().unwrap_or_else(DebugConfig::default);
            Arc::new(DebugCoordinator::new(
                service,
                debug_config,
                Arc::clone(&registry),
            ))
        });

        let ctx = EnvironmentContext {
            engine,
            registry,
            debug: coordinator.clone(),
            bridge: Arc::clone(&bridge),
            limits: config.limits,
        };

        // Siblings may attach after an earlier script has detached
        let hold = coordinator.as_deref().map(DebugCoordinator::hold);

        tracing::info!(
            count = paths.len(),
            debug_session = coordinator.is_some(),
            "running scripts"
        );

        let handles: Vec<_> = paths
            .iter()
            .enumerate()
            .map(|(index, path)| {
                let ctx = ctx.clone();
                let thread_path = path.clone();
                let spawned = thread::Builder::new()
                    .name(format!("script-{}", index))
                    .spawn(move || run_script(&thread_path, &ctx));
                (index, path, spawned)
            })
            .collect();

        let outcomes: Vec<TaskOutcome> = handles
            .into_iter()
            .map(|(index, path, spawned)| {
                let (handle, result) = match spawned {
                    Ok(join) => match join.join() {
                        Ok((handle, result)) => (handle, result.map_err(TaskFailure::from)),
                        Err(panic) => (None, Err(TaskFailure::Panicked(panic_message(&*panic)))),
                    },
                    Err(e) => (None, Err(TaskFailure::Spawn(e))),
                };
                let outcome = TaskOutcome {
                    index,
                    path: path.clone(),
                    handle,
                    result,
                };
                notice(&bridge, &outcome.to_string());
                if let Err(e) = &outcome.result {
                    tracing::warn!(index, path = %outcome.path, kind = e.kind(), "script failed");
                }
                outcome
            })
            .collect();

        drop(hold);

        let report = HostReport {
            outcomes,
            debug: coordinator.map(|coordinator| coordinator.stats()),
        };
        notice(&bridge, &report.summary());
        report
    }
}

fn notice(bridge: &HostBridge, line: &str) {
    if let Err(e) = bridge.emit_line(line) {
        tracing::warn!("failed to write notice: {}", e);
    }
}

/// Body of one script thread; the environment is torn down on return
fn run_script<E: ScriptEngine, S: DebugService>(
    path: &str,
    ctx: &EnvironmentContext<E, S>,
) -> (Option<EnvironmentHandle>, Result<(), ScriptError>) {
    let mut env = match ExecutionEnvironment::construct(path, ctx) {
        Ok(env) => env,
        Err(e) => return (None, Err(e)),
    };
    let handle = env.handle();
    (Some(handle), env.run().into_result())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
