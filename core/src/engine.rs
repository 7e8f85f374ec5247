//! Script engine boundary
//!
//! The host never interprets scripts itself. Everything it needs from an
//! engine goes through the two traits here:
//!
//! - [`ScriptEngine`] - creates isolated runtimes (one per environment)
//! - [`EngineRuntime`] - a runtime/context pair that owns a global scope,
//!   installs bindings, and evaluates source text
//!
//! Compile and runtime errors flow back through a per-environment
//! [`ErrorReporter`], mirroring an engine-side error callback.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::bridge::HostBridge;

/// Default linear memory budget per runtime (8MB)
pub const DEFAULT_MEMORY_LIMIT: usize = 8 * 1024 * 1024;

/// Default native stack quota per runtime (256KB)
pub const DEFAULT_STACK_QUOTA: usize = 256 * 1024;

/// Resource budget applied to every runtime at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeLimits {
    /// Maximum script memory in bytes
    pub memory_limit: usize,
    /// Maximum native stack usage in bytes (bounds runaway recursion)
    pub stack_quota: usize,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            stack_quota: DEFAULT_STACK_QUOTA,
        }
    }
}

/// A compile or runtime error raised inside one environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Script the error originated from
    pub filename: String,
    /// 1-based line, when the engine can locate it
    pub line: Option<u32>,
    /// Engine-provided message
    pub message: String,
}

impl ErrorReport {
    pub fn new(filename: impl Into<String>, line: Option<u32>, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}: {}", self.filename, line, self.message),
            None => write!(f, "{}: {}", self.filename, self.message),
        }
    }
}

/// Error-reporting callback installed into a single runtime
///
/// Cloning shares the underlying sink, so the engine side and the owning
/// environment observe the same reports. Separate environments always hold
/// separate reporters.
#[derive(Debug, Clone, Default)]
pub struct ErrorReporter {
    reports: Arc<Mutex<Vec<ErrorReport>>>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error raised by the engine
    pub fn report(&self, report: ErrorReport) {
        tracing::debug!(error = %report, "script error reported");
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report);
    }

    /// Most recent report, if any
    pub fn last(&self) -> Option<ErrorReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Number of reports received so far
    pub fn count(&self) -> usize {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Failure at one of the engine-facing stages
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Runtime/context creation failed
    #[error("runtime creation failed: {0}")]
    Runtime(String),

    /// Global scope creation or standard binding install failed
    #[error("global scope setup failed: {0}")]
    Global(String),

    /// Host function registration failed
    #[error("host function registration failed: {0}")]
    Registration(String),

    /// Compile or runtime error in the script itself
    #[error("{0}")]
    Evaluation(ErrorReport),
}

/// Factory for isolated engine runtimes
///
/// Implementations must be shareable across threads; the runtimes they
/// produce are owned and driven by exactly one thread each.
pub trait ScriptEngine: Send + Sync + 'static {
    /// Runtime/context pair produced by this engine
    type Runtime: EngineRuntime;

    /// Create a runtime with the given budget and error callback
    ///
    /// Callers serialize this method process-wide; implementations need not
    /// be reentrant here.
    fn create_runtime(
        &self,
        limits: &RuntimeLimits,
        reporter: ErrorReporter,
    ) -> Result<Self::Runtime, EngineError>;
}

/// One isolated runtime/context pair
pub trait EngineRuntime {
    /// A global execution scope inside this runtime
    type Scope;

    /// Create a fresh, empty global scope
    fn new_global(&mut self) -> Result<Self::Scope, EngineError>;

    /// Install the engine's standard bindings into `scope`
    fn init_standard_bindings(&mut self, scope: &mut Self::Scope) -> Result<(), EngineError>;

    /// Expose the host bridge's functions to scripts evaluated in `scope`
    fn register_host_functions(
        &mut self,
        scope: &mut Self::Scope,
        bridge: Arc<HostBridge>,
    ) -> Result<(), EngineError>;

    /// Evaluate `source` against `scope`, blocking until it returns or fails
    fn evaluate(
        &mut self,
        scope: &mut Self::Scope,
        source: &str,
        filename: &str,
    ) -> Result<(), EngineError>;
}
