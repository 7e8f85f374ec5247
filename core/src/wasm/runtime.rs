//! Script runtime implementation for WASM modules

use std::sync::Arc;

use wasmtime::{Engine, Linker, Module, Store, Trap};

use super::engine::WasmEngine;
use super::state::ScriptContext;
use crate::bridge::HostBridge;
use crate::engine::{EngineError, EngineRuntime, ErrorReport, ErrorReporter, RuntimeLimits};
use crate::ffi::{register_bridge_ffi, register_standard_ffi};

/// Exports tried, in order, as the script's entry point
pub const ENTRY_POINTS: [&str; 2] = ["main", "_start"];

/// Global scope of a WASM script: the imports it may link against
pub struct WasmScope {
    linker: Linker<ScriptContext>,
}

/// One script's engine + store
pub struct WasmRuntime {
    // Store must drop before the engine that created it
    store: Store<ScriptContext>,
    engine: Engine,
    reporter: ErrorReporter,
    limits: RuntimeLimits,
}

impl WasmRuntime {
    pub(super) fn new(
        engine: Engine,
        store: Store<ScriptContext>,
        reporter: ErrorReporter,
        limits: RuntimeLimits,
    ) -> Self {
        Self {
            store,
            engine,
            reporter,
            limits,
        }
    }

    fn fail(&self, filename: &str, line: Option<u32>, message: String) -> EngineError {
        let report = ErrorReport::new(filename, line, message);
        self.reporter.report(report.clone());
        EngineError::Evaluation(report)
    }

    /// Describe a failed instantiate/call, preferring an `abort` code
    fn describe_failure(&self, error: &anyhow::Error) -> String {
        if let Some(code) = self.store.data().abort_code {
            return format!("script aborted with code {}", code);
        }
        match error.downcast_ref::<Trap>() {
            Some(Trap::StackOverflow) => format!(
                "stack quota of {} bytes exhausted: {:#}",
                self.limits.stack_quota, error
            ),
            _ => format!("{:#}", error),
        }
    }
}

impl EngineRuntime for WasmRuntime {
    type Scope = WasmScope;

    fn new_global(&mut self) -> Result<WasmScope, EngineError> {
        Ok(WasmScope {
            linker: Linker::new(&self.engine),
        })
    }

    fn init_standard_bindings(&mut self, scope: &mut WasmScope) -> Result<(), EngineError> {
        register_standard_ffi(&mut scope.linker).map_err(|e| EngineError::Global(format!("{:#}", e)))
    }

    fn register_host_functions(
        &mut self,
        scope: &mut WasmScope,
        bridge: Arc<HostBridge>,
    ) -> Result<(), EngineError> {
        register_bridge_ffi(&mut scope.linker, bridge)
            .map_err(|e| EngineError::Registration(format!("{:#}", e)))
    }

    fn evaluate(
        &mut self,
        scope: &mut WasmScope,
        source: &str,
        filename: &str,
    ) -> Result<(), EngineError> {
        let module = match Module::new(&self.engine, source) {
            Ok(module) => module,
            Err(e) => {
                let message = format!("{:#}", e).replace("<anon>", filename);
                let line = wat_error_line(&message);
                return Err(self.fail(filename, line, message));
            }
        };

        if let Err(e) = WasmEngine::validate_module_memory(&module, self.limits.memory_limit) {
            return Err(self.fail(filename, None, e.to_string()));
        }

        // Instantiation runs the module's start function, if any
        let instance = match scope.linker.instantiate(&mut self.store, &module) {
            Ok(instance) => instance,
            Err(e) => {
                let message = self.describe_failure(&e);
                return Err(self.fail(filename, None, message));
            }
        };

        if let Some(memory) = instance.get_memory(&mut self.store, "memory") {
            self.store.data_mut().memory = Some(memory);
        }

        let Some((name, func)) = ENTRY_POINTS
            .iter()
            .find_map(|name| Some((*name, instance.get_func(&mut self.store, name)?)))
        else {
            return Ok(());
        };

        let entry = match func.typed::<(), ()>(&self.store) {
            Ok(entry) => entry,
            Err(e) => {
                let message = format!(
                    "entry point `{}` must take no parameters and return nothing: {:#}",
                    name, e
                );
                return Err(self.fail(filename, None, message));
            }
        };

        if let Err(e) = entry.call(&mut self.store, ()) {
            let message = self.describe_failure(&e);
            return Err(self.fail(filename, None, message));
        }
        Ok(())
    }
}

/// Line number from a WAT parse error location (`--> file:line:col`)
pub(crate) fn wat_error_line(message: &str) -> Option<u32> {
    let location = message.split("--> ").nth(1)?.lines().next()?;
    let mut parts = location.trim().rsplitn(3, ':');
    let _column = parts.next()?;
    parts.next()?.parse().ok()
}
