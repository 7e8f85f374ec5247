//! WASM engine factory for isolated script runtimes

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use wasmtime::{Config, Engine, ExternType, Module, Store};

use super::runtime::WasmRuntime;
use super::state::{ScriptContext, WASM_PAGE_SIZE};
use crate::engine::{EngineError, ErrorReporter, RuntimeLimits, ScriptEngine};

/// Default seed for the per-runtime random streams
pub const DEFAULT_RANDOM_SEED: u64 = 0x5EED_5C21_97A1;

/// Creates one independent wasmtime engine + store per script
///
/// Runtimes share nothing: each gets its own `wasmtime::Engine` configured
/// with the requested stack quota, and its own `Store` limited to the
/// requested memory budget.
#[derive(Debug)]
pub struct WasmEngine {
    debug_info: bool,
    seed: u64,
    created: AtomicU64,
}

impl WasmEngine {
    /// Create a new WASM engine factory with default configuration
    pub fn new() -> Result<Self> {
        // Check the platform once so unsupported configurations fail early
        Engine::new(&Config::new())?;
        Ok(Self {
            debug_info: false,
            seed: DEFAULT_RANDOM_SEED,
            created: AtomicU64::new(0),
        })
    }

    /// Emit native debug info for compiled scripts
    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.debug_info = enabled;
        self
    }

    /// Base seed for the deterministic random bindings
    ///
    /// Runtime N (in creation order) is seeded with `seed + N`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn config(&self, limits: &RuntimeLimits) -> Config {
        let mut config = Config::new();
        config.max_wasm_stack(limits.stack_quota);
        config.debug_info(self.debug_info);
        config
    }

    /// Validate that a module's memory requirements fit the runtime budget
    ///
    /// Gives a clear error rather than a failure during instantiation.
    pub fn validate_module_memory(module: &Module, memory_limit: usize) -> Result<()> {
        for export in module.exports() {
            if let ExternType::Memory(mem_type) = export.ty() {
                let min_pages = mem_type.minimum();
                let min_bytes = min_pages as usize * WASM_PAGE_SIZE;

                if min_bytes > memory_limit {
                    anyhow::bail!(
                        "memory '{}' requires {} bytes ({} pages) minimum, \
                         but scripts may only use {} bytes",
                        export.name(),
                        min_bytes,
                        min_pages,
                        memory_limit
                    );
                }

                if mem_type.maximum().is_none() {
                    tracing::debug!(
                        "memory '{}' has no maximum declared; host will limit to {} bytes",
                        export.name(),
                        memory_limit
                    );
                }
            }
        }
        Ok(())
    }
}

impl ScriptEngine for WasmEngine {
    type Runtime = WasmRuntime;

    fn create_runtime(
        &self,
        limits: &RuntimeLimits,
        reporter: ErrorReporter,
    ) -> Result<WasmRuntime, EngineError> {
        let engine = Engine::new(&self.config(limits))
            .map_err(|e| EngineError::Runtime(format!("{:#}", e)))?;

        let index = self.created.fetch_add(1, Ordering::SeqCst);
        let mut store = Store::new(
            &engine,
            ScriptContext::new(limits.memory_limit, self.seed.wrapping_add(index)),
        );
        // Enable resource limiter to enforce the memory budget
        store.limiter(|ctx| &mut ctx.limits);

        Ok(WasmRuntime::new(engine, store, reporter, *limits))
    }
}
