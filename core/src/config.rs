//! Host configuration

use crate::debug::DebugConfig;
use crate::engine::RuntimeLimits;

/// Settings shared by every environment a [`Host`](crate::host::Host) creates
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    /// Memory and stack budget of each runtime
    pub limits: RuntimeLimits,
    /// Debug session settings; `None` runs without a debug session
    pub debug: Option<DebugConfig>,
}

impl HostConfig {
    /// Enable the shared debug session
    pub fn with_debug(mut self, debug: DebugConfig) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn with_limits(mut self, limits: RuntimeLimits) -> Self {
        self.limits = limits;
        self
    }
}
