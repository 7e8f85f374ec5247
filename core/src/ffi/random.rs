//! Random number generation FFI functions

use wasmtime::Caller;

use crate::wasm::ScriptContext;

/// Generate deterministic random i32 (full 32-bit range)
pub(super) fn random(mut caller: Caller<'_, ScriptContext>) -> i32 {
    caller.data_mut().random() as i32
}

/// Generate deterministic random i32 in range [min, max)
pub(super) fn random_range(mut caller: Caller<'_, ScriptContext>, min: i32, max: i32) -> i32 {
    caller.data_mut().random_range(min, max)
}
