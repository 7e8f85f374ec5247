//! Host functions linked into script scopes
//!
//! - [`register_standard_ffi`] - standard bindings every script gets
//!   (timing, deterministic random, abort)
//! - [`register_bridge_ffi`] - the Host Function Bridge (`log`, `log_args`)
//!
//! All functions live in the `env` import module.

mod log;
mod random;
mod system;


use std::sync::Arc;

use anyhow::Result;
use wasmtime::{Caller, Linker};

use crate::bridge::HostBridge;
use crate::wasm::ScriptContext;

/// Register the standard bindings with the linker
pub fn register_standard_ffi(linker: &mut Linker<ScriptContext>) -> Result<()> {
    // System functions
    linker.func_wrap("env", "elapsed_time", system::elapsed_time)?;
    linker.func_wrap("env", "abort", system::abort)?;

    // Deterministic random
    linker.func_wrap("env", "random", random::random)?;
    linker.func_wrap("env", "random_range", random::random_range)?;

    Ok(())
}

/// Register the Host Function Bridge with the linker
pub fn register_bridge_ffi(
    linker: &mut Linker<ScriptContext>,
    bridge: Arc<HostBridge>,
) -> Result<()> {
    let single = Arc::clone(&bridge);
    linker.func_wrap(
        "env",
        "log",
        move |caller: Caller<'_, ScriptContext>, ptr: u32, len: u32| {
            log::log_message(&single, caller, ptr, len)
        },
    )?;
    linker.func_wrap(
        "env",
        "log_args",
        move |caller: Caller<'_, ScriptContext>, argv: u32, argc: u32| {
            log::log_args(&bridge, caller, argv, argc)
        },
    )?;
    Ok(())
}
