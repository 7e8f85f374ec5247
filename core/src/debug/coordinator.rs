//! Debug session coordinator
//!
//! Wraps one [`DebugService`] shared by every environment. The service is
//! configured and started lazily on the first attach, reference counted by
//! attached environments, and stopped once when the last one detaches and
//! no [`SessionHold`] remains.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hashbrown::HashSet;

use super::service::{DebugConfig, DebugService, DebugServiceError, ResumeSignal};
use crate::environment::EnvironmentHandle;
use crate::registry::SourceRegistry;

/// Lifecycle phase of the shared debug session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Service not yet configured
    Uninitialized,
    /// Configured, first install in progress or pending start
    Starting,
    /// Started and serving attached environments
    Running,
    /// Stopped for the rest of the process (irreversible)
    Stopped,
}

/// Coordinator failure, reported to the attaching environment
#[derive(Debug, Clone, thiserror::Error)]
pub enum DebugError {
    #[error("debug session already stopped")]
    SessionStopped,
    #[error("{0} is already attached")]
    AlreadyAttached(EnvironmentHandle),
    #[error("{0} is not attached")]
    NotAttached(EnvironmentHandle),
    #[error(transparent)]
    Service(#[from] DebugServiceError),
}

/// Point-in-time view of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugSessionStats {
    pub phase: SessionPhase,
    pub reference_count: usize,
    /// Size of the attached set
    pub attached: usize,
    /// Times the service has been started
    pub starts: u32,
    /// Times the service has been stopped
    pub stops: u32,
}

struct SessionState<S> {
    phase: SessionPhase,
    reference_count: usize,
    attached: HashSet<EnvironmentHandle>,
    starts: u32,
    stops: u32,
    /// Outstanding [`SessionHold`]s; the session outlives detaches while > 0
    holds: usize,
    service: S,
}

impl<S: DebugService> SessionState<S> {
    fn stop_if_idle(&mut self) {
        if self.reference_count > 0 || self.holds > 0 {
            return;
        }
        if self.starts == 0 || self.phase == SessionPhase::Stopped {
            return;
        }
        if let Err(e) = self.service.stop() {
            tracing::warn!("debug service stop failed: {}", e);
        }
        self.stops += 1;
        self.phase = SessionPhase::Stopped;
        tracing::info!("debug service stopped");
    }
}

/// Keeps a session running while environments come and go
///
/// Dropping the last hold stops a started session with nothing attached.
#[must_use = "the session may stop as soon as the hold is dropped"]
pub struct SessionHold<'a, S: DebugService> {
    coordinator: &'a DebugCoordinator<S>,
}

impl<S: DebugService> Drop for SessionHold<'_, S> {
    fn drop(&mut self) {
        let mut state = self.coordinator.state();
        state.holds -= 1;
        state.stop_if_idle();
    }
}

/// Process-wide owner of the debug service
///
/// A single lock covers the phase, the attached set and every call into
/// the service, so `reference_count == attached.len()` whenever the lock
/// is released.
pub struct DebugCoordinator<S: DebugService> {
    state: Mutex<SessionState<S>>,
    config: DebugConfig,
    registry: Arc<SourceRegistry>,
}

impl<S: DebugService> DebugCoordinator<S> {
    pub fn new(service: S, config: DebugConfig, registry: Arc<SourceRegistry>) -> Self {
        Self {
            state: Mutex::new(SessionState {
                phase: SessionPhase::Uninitialized,
                reference_count: 0,
                attached: HashSet::new(),
                starts: 0,
                stops: 0,
                holds: 0,
                service,
            }),
            config,
            registry,
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Defer the final stop until the returned hold is dropped
    ///
    /// Holds do not count as attachments; `reference_count` still tracks
    /// attached environments only.
    pub fn hold(&self) -> SessionHold<'_, S> {
        self.state().holds += 1;
        SessionHold { coordinator: self }
    }

    /// Attach an environment, starting the service on the first attach
    ///
    /// On failure the attached set and count are left untouched. A start
    /// failure stops the session for good; nothing is retried.
    pub fn attach(&self, handle: EnvironmentHandle, path: &str) -> Result<(), DebugError> {
        let mut guard = self.state();
        let state = &mut *guard;

        if state.phase == SessionPhase::Stopped {
            return Err(DebugError::SessionStopped);
        }
        if state.attached.contains(&handle) {
            return Err(DebugError::AlreadyAttached(handle));
        }

        if state.phase == SessionPhase::Uninitialized {
            if let Err(e) = state.service.configure(&self.config, self.registry.loader()) {
                state.phase = SessionPhase::Stopped;
                return Err(e.into());
            }
            tracing::info!(
                host = %self.config.bind_host,
                port = self.config.port,
                "debug service configured"
            );
            state.phase = SessionPhase::Starting;
        }

        state
            .service
            .install(handle, path, &self.config.options())?;

        if state.starts == 0 {
            if let Err(e) = state.service.start() {
                if let Err(undo) = state.service.uninstall(handle) {
                    tracing::warn!(%handle, "rollback uninstall failed: {}", undo);
                }
                state.phase = SessionPhase::Stopped;
                return Err(e.into());
            }
            state.starts += 1;
            state.phase = SessionPhase::Running;
            tracing::info!("debug service started");
        }

        state.reference_count += 1;
        state.attached.insert(handle);
        tracing::debug!(%handle, path, count = state.reference_count, "attached");
        Ok(())
    }

    /// Declare an attached environment's scope ready for inspection
    pub fn add_debuggee(
        &self,
        handle: EnvironmentHandle,
    ) -> Result<Option<ResumeSignal>, DebugError> {
        let mut state = self.state();
        if !state.attached.contains(&handle) {
            return Err(DebugError::NotAttached(handle));
        }
        Ok(state.service.add_debuggee(handle)?)
    }

    /// Detach an environment; a no-op for handles that are not attached
    ///
    /// The last detach stops the service unless a [`SessionHold`] is out.
    pub fn detach(&self, handle: EnvironmentHandle) {
        let mut guard = self.state();
        let state = &mut *guard;

        if !state.attached.remove(&handle) {
            return;
        }
        if let Err(e) = state.service.uninstall(handle) {
            tracing::warn!(%handle, "uninstall failed: {}", e);
        }
        state.reference_count -= 1;
        tracing::debug!(%handle, count = state.reference_count, "detached");

        state.stop_if_idle();
    }

    pub fn is_attached(&self, handle: EnvironmentHandle) -> bool {
        self.state().attached.contains(&handle)
    }

    pub fn stats(&self) -> DebugSessionStats {
        let state = self.state();
        DebugSessionStats {
            phase: state.phase,
            reference_count: state.reference_count,
            attached: state.attached.len(),
            starts: state.starts,
            stops: state.stops,
        }
    }
}
