//! Scripthost Core - Concurrent isolated script environments
//!
//! This crate runs several scripts at once, each in its own engine
//! runtime on its own thread, optionally attaching all of them to one
//! shared, reference-counted debug session.
//!
//! # Architecture
//!
//! - [`ScriptEngine`] - Trait implemented by a script engine binding (e.g. [`WasmEngine`])
//! - [`ExecutionEnvironment`] - One script in one isolated runtime
//! - [`DebugCoordinator`] - Start-once/stop-once owner of the debug service
//! - [`Host`] - Spawns, joins and reports a batch of scripts

pub mod bridge;
pub mod config;
pub mod debug;
pub mod engine;
pub mod environment;
pub mod error;
pub mod ffi;
pub mod host;
#[cfg(test)]
mod integration;
pub mod registry;
#[cfg(test)]
pub mod test_utils;
pub mod wasm;

// Re-export core traits and types
pub use bridge::{BridgeError, HostBridge, ScriptValue};
pub use config::HostConfig;
pub use engine::{
    DEFAULT_MEMORY_LIMIT, DEFAULT_STACK_QUOTA, EngineError, EngineRuntime, ErrorReport,
    ErrorReporter, RuntimeLimits, ScriptEngine,
};
pub use environment::{
    EnvironmentContext, EnvironmentHandle, ExecutionEnvironment, RunResult, RunStage, ScriptTask,
    TaskState,
};
pub use error::ScriptError;
pub use host::{Host, HostReport, TaskFailure, TaskOutcome};
pub use registry::{SourceLoader, SourceRegistry};
pub use wasm::{WasmEngine, WasmRuntime};

// Re-export debug types
pub use debug::{
    DebugConfig, DebugCoordinator, DebugError, DebugService, DebugServiceError,
    DebugSessionStats, InspectorService, SessionHold, SessionPhase,
};
