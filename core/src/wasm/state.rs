//! Per-runtime store state
//!
//! Everything a script's host calls can see lives here, owned by that
//! script's `Store`. Nothing in it is shared between environments.

use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use wasmtime::{Caller, Memory, StoreLimits, StoreLimitsBuilder};

/// WASM pages are 64KB
pub const WASM_PAGE_SIZE: usize = 64 * 1024;

/// Store data for one script runtime
pub struct ScriptContext {
    /// Resource limiter enforcing the runtime's memory budget
    pub limits: StoreLimits,
    /// Exported linear memory (set after instantiation)
    pub memory: Option<Memory>,
    /// Runtime creation time, for `elapsed_time`
    pub started: Instant,
    /// Deterministic RNG for `random`/`random_range`
    rng: Pcg32,
    /// Exit code passed to `abort`, if the script aborted
    pub abort_code: Option<i32>,
}

impl ScriptContext {
    pub fn new(memory_limit: usize, seed: u64) -> Self {
        Self {
            limits: StoreLimitsBuilder::new()
                .memory_size(memory_limit)
                .trap_on_grow_failure(true)
                .build(),
            memory: None,
            started: Instant::now(),
            rng: Pcg32::seed_from_u64(seed),
            abort_code: None,
        }
    }

    /// Next deterministic random value
    pub fn random(&mut self) -> u32 {
        self.rng.random()
    }

    /// Deterministic random value in `[min, max)`; `min` if the range is empty
    pub fn random_range(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        self.rng.random_range(min..max)
    }
}

/// Copy `len` bytes at `ptr` out of the calling module's memory
///
/// Looks the memory up through the caller so it also works while the
/// module's start function is still running.
pub fn read_bytes_from_memory(
    caller: &mut Caller<'_, ScriptContext>,
    ptr: u32,
    len: u32,
) -> anyhow::Result<Vec<u8>> {
    let memory = match caller.data().memory {
        Some(memory) => memory,
        None => caller
            .get_export("memory")
            .and_then(|export| export.into_memory())
            .ok_or_else(|| anyhow::anyhow!("module does not export a memory"))?,
    };

    let data = memory.data(&*caller);
    let start = ptr as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or_else(|| anyhow::anyhow!("memory range overflows: ptr={} len={}", ptr, len))?;
    data.get(start..end).map(<[u8]>::to_vec).ok_or_else(|| {
        anyhow::anyhow!(
            "memory access out of bounds: {}..{} (memory is {} bytes)",
            start,
            end,
            data.len()
        )
    })
}
