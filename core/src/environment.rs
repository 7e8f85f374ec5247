//! Execution environment
//!
//! One isolated engine runtime running exactly one script on one thread.
//!
//! # Lifecycle
//!
//! 1. [`ExecutionEnvironment::construct`] - load source, create the runtime
//!    (serialized process-wide), register the source, attach to the debug
//!    session
//! 2. [`ExecutionEnvironment::run`] - fresh global scope, standard bindings,
//!    host functions, debuggee hand-off, evaluation
//! 3. `Drop` - detach, unregister, release the runtime (on every path)

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::bridge::HostBridge;
use crate::debug::{DebugCoordinator, DebugService};
use crate::engine::{
    EngineError, EngineRuntime, ErrorReport, ErrorReporter, RuntimeLimits, ScriptEngine,
};
use crate::error::ScriptError;
use crate::registry::SourceRegistry;

/// Serializes runtime creation across all environments
///
/// Creating runtimes concurrently is not assumed to be safe; executing
/// them concurrently is.
static RUNTIME_CREATION_LOCK: Mutex<()> = Mutex::new(());

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one environment
///
/// Issued from a process-wide counter, so handles are never reused even if
/// the same script path is run twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvironmentHandle(u64);

impl EnvironmentHandle {
    /// Allocate a fresh handle
    pub fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// Handle for a raw id received from outside (e.g. a debug client)
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EnvironmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "env#{}", self.0)
    }
}

/// Progress of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Completed,
    Failed(String),
}

/// A script and its loaded source
#[derive(Debug, Clone)]
pub struct ScriptTask {
    pub path: String,
    pub source: Arc<str>,
    pub state: TaskState,
}

/// Stage at which [`ExecutionEnvironment::run`] failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    GlobalInit,
    StandardLibrary,
    FunctionRegistration,
    DebugAttach,
    Evaluation,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GlobalInit => "global init",
            Self::StandardLibrary => "standard library",
            Self::FunctionRegistration => "function registration",
            Self::DebugAttach => "debug attach",
            Self::Evaluation => "evaluation",
        };
        f.write_str(name)
    }
}

/// Outcome of running a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunResult {
    Completed,
    Failed {
        stage: RunStage,
        message: String,
        /// Engine error report, for evaluation failures
        report: Option<ErrorReport>,
    },
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Map a failure onto the script error taxonomy
    pub fn into_result(self) -> Result<(), ScriptError> {
        match self {
            Self::Completed => Ok(()),
            Self::Failed {
                stage,
                message,
                report,
            } => Err(match stage {
                RunStage::GlobalInit | RunStage::StandardLibrary => {
                    ScriptError::GlobalInitFailed(message)
                }
                RunStage::FunctionRegistration => ScriptError::FunctionRegistrationFailed(message),
                RunStage::DebugAttach => ScriptError::DebugAttachFailed(message),
                RunStage::Evaluation => ScriptError::EvaluationFailed(
                    report.unwrap_or_else(|| ErrorReport::new("", None, message)),
                ),
            }),
        }
    }
}

/// Shared collaborators every environment is constructed against
pub struct EnvironmentContext<E: ScriptEngine, S: DebugService> {
    pub engine: Arc<E>,
    pub registry: Arc<SourceRegistry>,
    pub debug: Option<Arc<DebugCoordinator<S>>>,
    pub bridge: Arc<HostBridge>,
    pub limits: RuntimeLimits,
}

impl<E: ScriptEngine, S: DebugService> Clone for EnvironmentContext<E, S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            registry: Arc::clone(&self.registry),
            debug: self.debug.clone(),
            bridge: Arc::clone(&self.bridge),
            limits: self.limits,
        }
    }
}

/// One script in its own engine runtime
pub struct ExecutionEnvironment<E: ScriptEngine, S: DebugService> {
    handle: EnvironmentHandle,
    task: ScriptTask,
    reporter: ErrorReporter,
    registry: Arc<SourceRegistry>,
    debug: Option<Arc<DebugCoordinator<S>>>,
    bridge: Arc<HostBridge>,
    // Declared last: released after Drop::drop has detached
    runtime: E::Runtime,
}

impl<E: ScriptEngine, S: DebugService> ExecutionEnvironment<E, S> {
    /// Load `path` and prepare an isolated runtime for it
    pub fn construct(path: &str, ctx: &EnvironmentContext<E, S>) -> Result<Self, ScriptError> {
        if path.is_empty() {
            return Err(ScriptError::EmptyPath);
        }

        let source: Arc<str> = std::fs::read_to_string(path)
            .map_err(|source| ScriptError::SourceUnavailable {
                path: path.to_string(),
                source,
            })?
            .into();

        let handle = EnvironmentHandle::next();
        let reporter = ErrorReporter::new();

        let runtime = {
            let _creation = RUNTIME_CREATION_LOCK
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            tracing::debug!(%handle, path, "creating runtime");
            ctx.engine
                .create_runtime(&ctx.limits, reporter.clone())
                .map_err(|e| ScriptError::EngineInitFailed(e.to_string()))?
        };

        let env = Self {
            handle,
            task: ScriptTask {
                path: path.to_string(),
                source: Arc::clone(&source),
                state: TaskState::Created,
            },
            reporter,
            registry: Arc::clone(&ctx.registry),
            debug: ctx.debug.clone(),
            bridge: Arc::clone(&ctx.bridge),
            runtime,
        };

        env.registry.insert(handle, source);

        // On failure `env` is dropped here, which runs the normal teardown
        if let Some(debug) = &env.debug {
            debug
                .attach(handle, path)
                .map_err(|e| ScriptError::DebugAttachFailed(e.to_string()))?;
        }

        tracing::info!(%handle, path, "environment ready");
        Ok(env)
    }

    pub fn handle(&self) -> EnvironmentHandle {
        self.handle
    }

    pub fn task(&self) -> &ScriptTask {
        &self.task
    }

    pub fn path(&self) -> &str {
        &self.task.path
    }

    /// Evaluate the script to completion
    ///
    /// Blocks until the script returns or fails; there is no way to
    /// interrupt it.
    pub fn run(&mut self) -> RunResult {
        self.task.state = TaskState::Running;

        let result = match self.run_stages() {
            Ok(()) => RunResult::Completed,
            Err((stage, error)) => {
                let (message, report) = match error {
                    EngineError::Evaluation(report) => (report.to_string(), Some(report)),
                    other => (other.to_string(), None),
                };
                RunResult::Failed {
                    stage,
                    message,
                    report,
                }
            }
        };

        self.task.state = match &result {
            RunResult::Completed => TaskState::Completed,
            RunResult::Failed { stage, message, .. } => {
                TaskState::Failed(format!("{}: {}", stage, message))
            }
        };
        result
    }

    fn run_stages(&mut self) -> Result<(), (RunStage, EngineError)> {
        let mut scope = self
            .runtime
            .new_global()
            .map_err(|e| (RunStage::GlobalInit, e))?;

        self.runtime
            .init_standard_bindings(&mut scope)
            .map_err(|e| (RunStage::StandardLibrary, e))?;

        self.runtime
            .register_host_functions(&mut scope, Arc::clone(&self.bridge))
            .map_err(|e| (RunStage::FunctionRegistration, e))?;

        if let Some(debug) = &self.debug {
            let resume = debug
                .add_debuggee(self.handle)
                .map_err(|e| (RunStage::DebugAttach, EngineError::Global(e.to_string())))?;
            if let Some(resume) = resume {
                tracing::info!(
                    handle = %self.handle,
                    path = %self.task.path,
                    "waiting for debugger to resume"
                );
                // A dropped sender also means "go"
                let _ = resume.recv();
            }
        }

        let result = self
            .runtime
            .evaluate(&mut scope, &self.task.source, &self.task.path);

        match result {
            Ok(()) => Ok(()),
            Err(EngineError::Evaluation(report)) => {
                Err((RunStage::Evaluation, EngineError::Evaluation(report)))
            }
            // Prefer what the engine handed its error reporter
            Err(other) => Err((
                RunStage::Evaluation,
                match self.reporter.last() {
                    Some(report) => EngineError::Evaluation(report),
                    None => other,
                },
            )),
        }
    }
}

impl<E: ScriptEngine, S: DebugService> Drop for ExecutionEnvironment<E, S> {
    fn drop(&mut self) {
        if let Some(debug) = &self.debug {
            debug.detach(self.handle);
        }
        if self.registry.remove(self.handle).is_none() {
            tracing::warn!(handle = %self.handle, "source was not registered at teardown");
        }
        tracing::debug!(handle = %self.handle, "environment released");
    }
}
