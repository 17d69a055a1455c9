//! WASM runtime implementation for pixel filtering.
//!
//! Compiles and instantiates an external filter module, resolves its
//! exports under the accepted aliases and exposes it as a
//! [`FilterModule`] the marshaler can drive.

use std::collections::HashMap;
use std::path::PathBuf;

use tint_shared::wasm::{Capability, DEFAULT_MODULE_FILE, INITIALIZE_EXPORT, MEMORY_EXPORT};
use tint_shared::MemoryRegion;
use tracing::{debug, info};
use wasmtime::*;

use crate::error::{MarshalError, ModuleLoadError};
use crate::filter_api::{self, FilterState, WASM_PAGE_SIZE};
use crate::marshal::Transform;
use crate::FilterModule;

/// Default linear memory: 16 MiB (256 pages of 64 KiB), fixed size
pub const DEFAULT_MEMORY_PAGES: u32 = 256;

/// Fuel limit per guest call (roughly ~1G instructions)
pub const DEFAULT_FUEL_PER_CALL: u64 = 1_000_000_000;

/// Resource bounds applied to every instantiated filter module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeLimits {
    /// Pages of the `env.memory` provided to modules that import it
    pub memory_pages: u32,
    /// Fuel granted before each guest call
    pub fuel_per_call: u64,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            memory_pages: DEFAULT_MEMORY_PAGES,
            fuel_per_call: DEFAULT_FUEL_PER_CALL,
        }
    }
}

/// WASM runtime for compiling filter modules.
#[derive(Clone)]
pub struct WasmRuntime {
    engine: Engine,
    limits: RuntimeLimits,
}

impl WasmRuntime {
    /// Create a new WASM runtime with security-hardened configuration.
    pub fn new(limits: RuntimeLimits) -> Result<Self, ModuleLoadError> {
        let mut config = Config::new();
        config.consume_fuel(true);
        config.wasm_bulk_memory(true);
        config.wasm_threads(false);
        config.wasm_backtrace_details(WasmBacktraceDetails::Enable);

        let engine = Engine::new(&config).map_err(|e| ModuleLoadError::Engine(format!("{e:#}")))?;
        Ok(Self { engine, limits })
    }

    pub fn limits(&self) -> RuntimeLimits {
        self.limits
    }

    /// Compile and instantiate a filter module from binary or text bytes.
    pub fn instantiate(&self, wasm_bytes: &[u8]) -> Result<WasmFilterModule, ModuleLoadError> {
        let module = Module::new(&self.engine, wasm_bytes)
            .map_err(|e| ModuleLoadError::Compile(format!("{e:#}")))?;

        let mut store = Store::new(&self.engine, FilterState::new());
        let mut linker = Linker::new(&self.engine);
        filter_api::register_host_functions(&mut linker)
            .map_err(|e| ModuleLoadError::Instantiate(format!("{e:#}")))?;
        let provided_memory =
            filter_api::define_env_memory(&mut linker, &mut store, self.limits.memory_pages)
                .map_err(|e| ModuleLoadError::Instantiate(format!("{e:#}")))?;

        refuel(&mut store, self.limits.fuel_per_call)
            .map_err(|e| ModuleLoadError::Instantiate(e.to_string()))?;
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| ModuleLoadError::Instantiate(format!("{e:#}")))?;

        // WASI reactors expect their initializer to run exactly once
        if let Some(init) = instance.get_func(&mut store, INITIALIZE_EXPORT) {
            refuel(&mut store, self.limits.fuel_per_call)
                .map_err(|e| ModuleLoadError::Instantiate(e.to_string()))?;
            init.typed::<(), ()>(&store)
                .and_then(|f| f.call(&mut store, ()))
                .map_err(|e| ModuleLoadError::Instantiate(format!("{INITIALIZE_EXPORT}: {e:#}")))?;
        }

        // Prefer the module's own memory, fall back to the provided one
        let memory = instance
            .get_memory(&mut store, MEMORY_EXPORT)
            .or_else(|| {
                module
                    .imports()
                    .any(|i| i.module() == "env" && i.name() == MEMORY_EXPORT)
                    .then_some(provided_memory)
            })
            .ok_or(ModuleLoadError::MissingExport(MEMORY_EXPORT))?;

        let exports = Exports::resolve(&instance, &mut store)?;
        info!(
            memory_bytes = memory.data_size(&store),
            capabilities = ?exports.names.keys().collect::<Vec<_>>(),
            "filter module instantiated"
        );

        Ok(WasmFilterModule {
            store,
            instance,
            memory,
            exports,
            fuel_per_call: self.limits.fuel_per_call,
            poisoned: false,
        })
    }
}

fn refuel(store: &mut Store<FilterState>, fuel: u64) -> Result<(), MarshalError> {
    store
        .set_fuel(fuel)
        .map_err(|e| MarshalError::MemoryAccess(format!("failed to set fuel: {e:#}")))
}

/// Where the filter module binary comes from.
#[derive(Debug, Clone)]
pub enum ModuleSource {
    /// A file, typically `<asset_root>/image.wasm`
    Path(PathBuf),
    /// Bytes already in memory (binary or WAT text)
    Bytes(Vec<u8>),
}

impl ModuleSource {
    /// The well-known module file under a static asset root.
    pub fn from_asset_root(root: impl Into<PathBuf>) -> Self {
        ModuleSource::Path(root.into().join(DEFAULT_MODULE_FILE))
    }
}

/// Fetches and instantiates the filter module.
#[derive(Clone)]
pub struct ModuleLoader {
    runtime: WasmRuntime,
    source: ModuleSource,
}

impl ModuleLoader {
    pub fn new(runtime: WasmRuntime, source: ModuleSource) -> Self {
        Self { runtime, source }
    }

    pub fn source(&self) -> &ModuleSource {
        &self.source
    }

    /// Fetch the module bytes and instantiate them.
    pub async fn load(&self) -> Result<WasmFilterModule, ModuleLoadError> {
        let bytes = match &self.source {
            ModuleSource::Path(path) => {
                debug!(path = %path.display(), "fetching filter module");
                tokio::fs::read(path)
                    .await
                    .map_err(|source| ModuleLoadError::Fetch {
                        path: path.clone(),
                        source,
                    })?
            }
            ModuleSource::Bytes(bytes) => bytes.clone(),
        };
        self.runtime.instantiate(&bytes)
    }
}

/// Typed exports resolved from an instance.
struct Exports {
    allocate: TypedFunc<i32, i32>,
    free: TypedFunc<i32, ()>,
    grayscale: Option<TypedFunc<(i32, i32), ()>>,
    brightness: Option<TypedFunc<(i32, i32, i32), ()>>,
    contrast: Option<TypedFunc<(i32, i32, f32), ()>>,
    sepia: Option<TypedFunc<(i32, i32), ()>>,
    invert: Option<TypedFunc<(i32, i32), ()>>,
    /// Export name each resolved capability was found under
    names: HashMap<Capability, &'static str>,
}

impl Exports {
    fn resolve(instance: &Instance, store: &mut Store<FilterState>) -> Result<Self, ModuleLoadError> {
        let mut names = HashMap::new();

        let allocate = lookup(instance, store, Capability::Allocate, &mut names)?
            .ok_or(ModuleLoadError::MissingExport(Capability::Allocate.name()))?;
        let free = lookup(instance, store, Capability::Free, &mut names)?
            .ok_or(ModuleLoadError::MissingExport(Capability::Free.name()))?;

        Ok(Self {
            allocate,
            free,
            grayscale: lookup(instance, store, Capability::Grayscale, &mut names)?,
            brightness: lookup(instance, store, Capability::Brightness, &mut names)?,
            contrast: lookup(instance, store, Capability::Contrast, &mut names)?,
            sepia: lookup(instance, store, Capability::Sepia, &mut names)?,
            invert: lookup(instance, store, Capability::Invert, &mut names)?,
            names,
        })
    }
}

fn lookup<Params, Results>(
    instance: &Instance,
    store: &mut Store<FilterState>,
    capability: Capability,
    names: &mut HashMap<Capability, &'static str>,
) -> Result<Option<TypedFunc<Params, Results>>, ModuleLoadError>
where
    Params: WasmParams,
    Results: WasmResults,
{
    for &alias in capability.aliases() {
        let Some(func) = instance.get_func(&mut *store, alias) else {
            continue;
        };
        let typed = func
            .typed::<Params, Results>(&*store)
            .map_err(|e| ModuleLoadError::Signature {
                export: alias,
                reason: format!("{e:#}"),
            })?;
        debug!(%capability, export = alias, "resolved filter export");
        names.insert(capability, alias);
        return Ok(Some(typed));
    }
    Ok(None)
}

/// An instantiated filter module, ready for marshaling.
pub struct WasmFilterModule {
    store: Store<FilterState>,
    instance: Instance,
    memory: Memory,
    exports: Exports,
    fuel_per_call: u64,
    poisoned: bool,
}

impl WasmFilterModule {
    /// Export name a capability resolved to, if the module provides it.
    pub fn export_name(&self, capability: Capability) -> Option<&'static str> {
        self.exports.names.get(&capability).copied()
    }

    /// Current size of the linear memory in bytes.
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }

    /// Current size of the linear memory in wasm pages.
    pub fn memory_pages(&self) -> u64 {
        self.memory_size() as u64 / WASM_PAGE_SIZE
    }

    /// Call a zero-argument `() -> i32` export, such as a diagnostic counter.
    pub fn call_getter(&mut self, name: &str) -> anyhow::Result<i32> {
        refuel(&mut self.store, self.fuel_per_call)?;
        let func = self
            .instance
            .get_typed_func::<(), i32>(&mut self.store, name)?;
        func.call(&mut self.store, ())
    }

    fn trap(op: Capability) -> impl FnOnce(anyhow::Error) -> MarshalError {
        move |e| MarshalError::Trap {
            op,
            reason: format!("{e:#}"),
        }
    }
}

impl FilterModule for WasmFilterModule {
    fn has_capability(&self, capability: Capability) -> bool {
        self.exports.names.contains_key(&capability)
    }

    fn allocate(&mut self, len: u32) -> Result<MemoryRegion, MarshalError> {
        refuel(&mut self.store, self.fuel_per_call)?;
        let ptr = self
            .exports
            .allocate
            .call(&mut self.store, len as i32)
            .map_err(|e| MarshalError::Allocation {
                requested: len as usize,
                reason: format!("{e:#}"),
            })? as u32;

        if ptr == 0 {
            return Err(MarshalError::Allocation {
                requested: len as usize,
                reason: "allocator returned null".to_string(),
            });
        }

        let region = MemoryRegion::new(ptr, len);
        if region.end() > self.memory_size() as u64 {
            let end = region.end();
            self.release(region)?;
            return Err(MarshalError::Allocation {
                requested: len as usize,
                reason: format!("region ends at {end:#x}, past linear memory"),
            });
        }
        Ok(region)
    }

    fn release(&mut self, region: MemoryRegion) -> Result<(), MarshalError> {
        let ptr = region.into_ptr();
        refuel(&mut self.store, self.fuel_per_call)?;
        self.exports
            .free
            .call(&mut self.store, ptr as i32)
            .map_err(|e| MarshalError::Release {
                ptr,
                reason: format!("{e:#}"),
            })
    }

    fn write(&mut self, region: &MemoryRegion, bytes: &[u8]) -> Result<(), MarshalError> {
        debug_assert!(bytes.len() <= region.len() as usize);
        self.memory
            .write(&mut self.store, region.ptr() as usize, bytes)
            .map_err(|e| MarshalError::MemoryAccess(e.to_string()))
    }

    fn read(&mut self, region: &MemoryRegion, out: &mut [u8]) -> Result<(), MarshalError> {
        debug_assert!(out.len() <= region.len() as usize);
        self.memory
            .read(&self.store, region.ptr() as usize, out)
            .map_err(|e| MarshalError::MemoryAccess(e.to_string()))
    }

    fn invoke(&mut self, transform: Transform, region: &MemoryRegion) -> Result<(), MarshalError> {
        let op = transform.capability();
        refuel(&mut self.store, self.fuel_per_call)?;
        let (ptr, len) = (region.ptr() as i32, region.len() as i32);
        let missing = || MarshalError::MissingCapability(op);

        let result = match transform {
            Transform::Grayscale => self
                .exports
                .grayscale
                .as_ref()
                .ok_or_else(missing)?
                .call(&mut self.store, (ptr, len)),
            Transform::Brightness(amount) => self
                .exports
                .brightness
                .as_ref()
                .ok_or_else(missing)?
                .call(&mut self.store, (ptr, len, amount)),
            Transform::Contrast(factor) => self
                .exports
                .contrast
                .as_ref()
                .ok_or_else(missing)?
                .call(&mut self.store, (ptr, len, factor)),
            Transform::Sepia => self
                .exports
                .sepia
                .as_ref()
                .ok_or_else(missing)?
                .call(&mut self.store, (ptr, len)),
            Transform::Invert => self
                .exports
                .invert
                .as_ref()
                .ok_or_else(missing)?
                .call(&mut self.store, (ptr, len)),
        };
        result.map_err(Self::trap(op))
    }

    fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn poison(&mut self) {
        self.poisoned = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_creation() {
        let runtime = WasmRuntime::new(RuntimeLimits::default()).unwrap();
        assert_eq!(runtime.limits().memory_pages, 256);
    }

    #[test]
    fn test_rejects_garbage() {
        let runtime = WasmRuntime::new(RuntimeLimits::default()).unwrap();
        let err = runtime.instantiate(b"definitely not wasm").err().unwrap();
        assert!(matches!(err, ModuleLoadError::Compile(_)));
    }

    #[test]
    fn test_requires_allocator() {
        let runtime = WasmRuntime::new(RuntimeLimits::default()).unwrap();
        let wat = r#"(module (memory (export "memory") 1) (func (export "free") (param i32)))"#;
        let err = runtime.instantiate(wat.as_bytes()).err().unwrap();
        assert!(matches!(err, ModuleLoadError::MissingExport("allocate")));
    }

    #[test]
    fn test_signature_mismatch() {
        let runtime = WasmRuntime::new(RuntimeLimits::default()).unwrap();
        let wat = r#"(module
            (memory (export "memory") 1)
            (func (export "allocate") (param i32 i32) (result i32) i32.const 0)
            (func (export "free") (param i32)))"#;
        let err = runtime.instantiate(wat.as_bytes()).err().unwrap();
        assert!(matches!(err, ModuleLoadError::Signature { export: "allocate", .. }));
    }

    #[test]
    fn test_imported_memory_is_bounded() {
        let runtime = WasmRuntime::new(RuntimeLimits {
            memory_pages: 2,
            ..Default::default()
        })
        .unwrap();
        let wat = r#"(module
            (import "env" "memory" (memory 1))
            (func (export "_malloc") (param i32) (result i32) i32.const 16)
            (func (export "_free") (param i32)))"#;
        let module = runtime.instantiate(wat.as_bytes()).unwrap();
        assert_eq!(module.memory_pages(), 2);
        assert_eq!(module.export_name(Capability::Allocate), Some("_malloc"));
        assert!(!module.has_capability(Capability::Grayscale));
    }

    #[test]
    fn test_missing_memory() {
        let runtime = WasmRuntime::new(RuntimeLimits::default()).unwrap();
        let wat = r#"(module
            (func (export "allocate") (param i32) (result i32) i32.const 16)
            (func (export "free") (param i32)))"#;
        let err = runtime.instantiate(wat.as_bytes()).err().unwrap();
        assert!(matches!(err, ModuleLoadError::MissingExport("memory")));
    }
}
