//! Debug service boundary
//!
//! The coordinator drives an external debug service through [`DebugService`].
//! The bundled implementation is [`super::InspectorService`].

use std::sync::mpsc::Receiver;

use crate::environment::EnvironmentHandle;
use crate::registry::SourceLoader;

/// Default bind address for the debug service
pub const DEFAULT_DEBUG_HOST: &str = "127.0.0.1";

/// Default debug service port
pub const DEFAULT_DEBUG_PORT: u16 = 8089;

/// Debug session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugConfig {
    /// Host to bind the service on
    pub bind_host: String,
    /// TCP port (0 = any free port)
    pub port: u16,
    /// Pause every attached script before evaluation until a client resumes it
    pub suspended: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_DEBUG_HOST.to_string(),
            port: DEFAULT_DEBUG_PORT,
            suspended: false,
        }
    }
}

impl DebugConfig {
    /// Per-debuggee options derived from this configuration
    pub fn options(&self) -> DebugOptions {
        DebugOptions {
            suspended: self.suspended,
        }
    }
}

/// Options passed with each install
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugOptions {
    /// Hold the script at entry until a client resumes it
    pub suspended: bool,
}

/// Signal a suspended debuggee waits on before it proceeds
///
/// The service sends (or drops its sender) to release the script.
pub type ResumeSignal = Receiver<()>;

/// Failure reported by the debug service
#[derive(Debug, Clone, thiserror::Error)]
pub enum DebugServiceError {
    #[error("configure failed: {0}")]
    Configure(String),
    #[error("install failed for {handle}: {reason}")]
    Install {
        handle: EnvironmentHandle,
        reason: String,
    },
    #[error("start failed: {0}")]
    Start(String),
    #[error("add debuggee failed for {handle}: {reason}")]
    AddDebuggee {
        handle: EnvironmentHandle,
        reason: String,
    },
    #[error("uninstall failed for {handle}: {reason}")]
    Uninstall {
        handle: EnvironmentHandle,
        reason: String,
    },
    #[error("stop failed: {0}")]
    Stop(String),
}

/// Contract of the external debug service
///
/// All calls are made under the coordinator's lock, so implementations see
/// them strictly ordered.
pub trait DebugService: Send + 'static {
    /// Apply configuration and the script loader, before any install
    fn configure(
        &mut self,
        config: &DebugConfig,
        loader: SourceLoader,
    ) -> Result<(), DebugServiceError>;

    /// Make an environment known to the service
    fn install(
        &mut self,
        handle: EnvironmentHandle,
        path: &str,
        options: &DebugOptions,
    ) -> Result<(), DebugServiceError>;

    /// Start serving clients (called once)
    fn start(&mut self) -> Result<(), DebugServiceError>;

    /// Declare the environment's global scope ready for inspection
    ///
    /// Returns a [`ResumeSignal`] when the debuggee should pause at entry.
    fn add_debuggee(
        &mut self,
        handle: EnvironmentHandle,
    ) -> Result<Option<ResumeSignal>, DebugServiceError>;

    /// Forget an environment
    fn uninstall(&mut self, handle: EnvironmentHandle) -> Result<(), DebugServiceError>;

    /// Stop serving clients and release resources (called once)
    fn stop(&mut self) -> Result<(), DebugServiceError>;
}
