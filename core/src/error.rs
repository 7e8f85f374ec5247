//! Per-script error taxonomy
//!
//! Every variant is local to one environment. The host catches them at the
//! task boundary; none of them affect sibling scripts.

use std::io;

use crate::engine::ErrorReport;

/// Failure of one script's environment
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Script path argument was empty
    #[error("empty script path")]
    EmptyPath,

    /// Script source could not be read
    #[error("cannot read {path}: {source}")]
    SourceUnavailable { path: String, source: io::Error },

    /// Engine runtime/context creation failed
    #[error("engine initialization failed: {0}")]
    EngineInitFailed(String),

    /// Global scope or standard library setup failed
    #[error("global initialization failed: {0}")]
    GlobalInitFailed(String),

    /// Host functions could not be registered
    #[error("function registration failed: {0}")]
    FunctionRegistrationFailed(String),

    /// Debug install, start, or add-debuggee failed
    #[error("debug attach failed: {0}")]
    DebugAttachFailed(String),

    /// Compile or runtime error in the script
    #[error("evaluation failed: {0}")]
    EvaluationFailed(ErrorReport),
}

impl ScriptError {
    /// Stable kind name for logs and notices
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyPath => "EmptyPath",
            Self::SourceUnavailable { .. } => "SourceUnavailable",
            Self::EngineInitFailed(_) => "EngineInitFailed",
            Self::GlobalInitFailed(_) => "GlobalInitFailed",
            Self::FunctionRegistrationFailed(_) => "FunctionRegistrationFailed",
            Self::DebugAttachFailed(_) => "DebugAttachFailed",
            Self::EvaluationFailed(_) => "EvaluationFailed",
        }
    }
}
