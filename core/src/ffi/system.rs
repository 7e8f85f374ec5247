//! System and timing FFI functions

use wasmtime::Caller;

use crate::wasm::ScriptContext;

/// Seconds since the script's runtime was created
pub(super) fn elapsed_time(caller: Caller<'_, ScriptContext>) -> f32 {
    caller.data().started.elapsed().as_secs_f32()
}

/// Terminate the script with an error code
pub(super) fn abort(mut caller: Caller<'_, ScriptContext>, code: i32) -> anyhow::Result<()> {
    caller.data_mut().abort_code = Some(code);
    anyhow::bail!("script aborted with code {}", code)
}
