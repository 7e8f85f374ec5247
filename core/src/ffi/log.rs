//! `log` host functions
//!
//! Guest strings are `(ptr, len)` slices of linear memory. Slices that are
//! not valid UTF-8 reach the bridge as [`ScriptValue::Bytes`] and are
//! rejected there.

use wasmtime::Caller;

use crate::bridge::{HostBridge, ScriptValue};
use crate::wasm::{ScriptContext, read_bytes_from_memory};

/// Upper bound on `log_args` argument count
pub const MAX_LOG_ARGS: u32 = 256;

fn to_value(bytes: Vec<u8>) -> ScriptValue {
    match String::from_utf8(bytes) {
        Ok(text) => ScriptValue::String(text),
        Err(e) => ScriptValue::Bytes(e.into_bytes()),
    }
}

/// `log(ptr, len)` - log a single string
pub(super) fn log_message(
    bridge: &HostBridge,
    mut caller: Caller<'_, ScriptContext>,
    ptr: u32,
    len: u32,
) -> anyhow::Result<()> {
    let bytes = read_bytes_from_memory(&mut caller, ptr, len)?;
    bridge.log(&[to_value(bytes)])?;
    Ok(())
}

/// `log_args(argv, argc)` - log `argc` strings described by `(ptr, len)`
/// pairs of little-endian u32s starting at `argv`
pub(super) fn log_args(
    bridge: &HostBridge,
    mut caller: Caller<'_, ScriptContext>,
    argv: u32,
    argc: u32,
) -> anyhow::Result<()> {
    if argc > MAX_LOG_ARGS {
        anyhow::bail!("log_args: {} arguments exceeds the limit of {}", argc, MAX_LOG_ARGS);
    }

    let table = read_bytes_from_memory(&mut caller, argv, argc * 8)?;
    let mut args = Vec::with_capacity(argc as usize);
    for pair in table.chunks_exact(8) {
        let ptr = u32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]);
        let len = u32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);
        args.push(to_value(read_bytes_from_memory(&mut caller, ptr, len)?));
    }

    bridge.log(&args)?;
    Ok(())
}
