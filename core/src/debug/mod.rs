//! Remote debugging support
//!
//! One debug session is shared by every environment in the process.
//!
//! # Overview
//!
//! - [`DebugService`] - contract of the external debug service
//! - [`DebugCoordinator`] - lazily starts the service on first attach,
//!   reference counts attached environments, stops it after the last detach
//!   once no [`SessionHold`] is outstanding
//! - [`InspectorService`] - bundled service: JSON-over-TCP source inspector
//!   with suspend-on-attach support
//!
//! # Usage
//!
//! ```rust,ignore
//! let registry = Arc::new(SourceRegistry::new());
//! let debug = Arc::new(DebugCoordinator::new(
//!     InspectorService::new(),
//!     DebugConfig::default(),
//!     Arc::clone(&registry),
//! ));
//!
//! let hold = debug.hold();
//! debug.attach(handle, "a.wat")?;   // configures + starts the service
//! debug.detach(handle);             // still running
//! debug.attach(other, "b.wat")?;    // install only
//! debug.detach(other);
//! drop(hold);                       // stops the service
//! ```

mod coordinator;
mod inspector;
mod service;


pub use coordinator::{
    DebugCoordinator, DebugError, DebugSessionStats, SessionHold, SessionPhase,
};
pub use inspector::{DebuggeeInfo, InspectorRequest, InspectorResponse, InspectorService};
pub use service::{
    DEFAULT_DEBUG_HOST, DEFAULT_DEBUG_PORT, DebugConfig, DebugOptions, DebugService,
    DebugServiceError, ResumeSignal,
};
