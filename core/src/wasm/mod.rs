//! WASM runtime wrapper
//!
//! The bundled [`ScriptEngine`](crate::engine::ScriptEngine): scripts are
//! WebAssembly modules in WAT text form.
//!
//! # Module Organization
//!
//! - [`engine`] - [`WasmEngine`], the runtime factory
//! - [`runtime`] - [`WasmRuntime`] and its global scope
//! - [`state`] - per-store state visible to host functions
//!
//! # Script Shape
//!
//! ```wat
//! (module
//!     (import "env" "log" (func $log (param i32 i32)))
//!     (memory (export "memory") 1)
//!     (data (i32.const 0) "hi")
//!     (func (export "main")
//!         (call $log (i32.const 0) (i32.const 2))))
//! ```
//!
//! The entry point is the first of `main` or `_start` the module exports;
//! a module with neither just runs its start function.

pub mod engine;
pub mod runtime;
pub mod state;


pub use engine::{DEFAULT_RANDOM_SEED, WasmEngine};
pub use runtime::{ENTRY_POINTS, WasmRuntime, WasmScope};
pub use state::{ScriptContext, WASM_PAGE_SIZE, read_bytes_from_memory};
