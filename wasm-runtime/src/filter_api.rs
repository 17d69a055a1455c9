//! Host side of the filter module ABI: imports provided to filter modules.
//!
//! Modules may import a bounded `env.memory`, an `env.log(ptr, len)`
//! debugging hook and the WASI preview1 functions toolchains like
//! Emscripten emit for standalone builds.

use wasmtime::{Caller, Linker, Memory, MemoryType, Store};
use wasmtime_wasi::WasiCtx;

use tint_shared::wasm::MEMORY_EXPORT;

/// Size of one wasm page in bytes
pub const WASM_PAGE_SIZE: u64 = 64 * 1024;

/// Per-store host state visible to imported functions.
pub struct FilterState {
    pub(crate) wasi: WasiCtx,
}

impl FilterState {
    pub fn new() -> Self {
        Self {
            wasi: wasmtime_wasi::sync::WasiCtxBuilder::new().build(),
        }
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new()
    }
}

/// Register host functions with the linker.
pub fn register_host_functions(linker: &mut Linker<FilterState>) -> anyhow::Result<()> {
    // Log function for debugging filters
    linker.func_wrap(
        "env",
        "log",
        |mut caller: Caller<'_, FilterState>, ptr: u32, len: u32| {
            if let Some(memory) = caller.get_export(MEMORY_EXPORT).and_then(|e| e.into_memory()) {
                let mut buf = vec![0u8; len as usize];
                if memory.read(&caller, ptr as usize, &mut buf).is_ok() {
                    if let Ok(msg) = String::from_utf8(buf) {
                        tracing::debug!("[filter module] {}", msg);
                    }
                }
            }
        },
    )?;

    wasmtime_wasi::sync::add_to_linker(linker, |state: &mut FilterState| &mut state.wasi)?;

    Ok(())
}

/// Define a fixed-size `env.memory` for modules that import their memory.
///
/// `initial == maximum`, so callers must not count on growth.
pub fn define_env_memory(
    linker: &mut Linker<FilterState>,
    store: &mut Store<FilterState>,
    pages: u32,
) -> anyhow::Result<Memory> {
    let memory = Memory::new(&mut *store, MemoryType::new(pages, Some(pages)))?;
    linker.define(&*store, "env", MEMORY_EXPORT, memory)?;
    Ok(memory)
}
