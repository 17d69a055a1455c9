//! WASM filter module host
//!
//! Loads an externally built filter module, and moves RGBA pixel buffers
//! in and out of its linear memory to run the module's transforms.
//! The transforms themselves are opaque: any module exporting the ABI in
//! [`tint_shared::wasm`] can be plugged in.

pub mod error;
pub mod filter_api;
pub mod marshal;
pub mod runtime;
pub mod shared;

pub use error::{FilterError, MarshalError, ModuleLoadError};
pub use marshal::{apply_filters, apply_to_bytes, plan, Transform};
pub use runtime::{ModuleLoader, ModuleSource, RuntimeLimits, WasmFilterModule, WasmRuntime};
pub use shared::SharedFilterModule;

use tint_shared::wasm::Capability;
use tint_shared::MemoryRegion;

/// The capability set a filter module offers to the marshaler.
///
/// Implementations own a linear memory the host can copy into and out
/// of, an allocator handing out disjoint regions of it, and in-place
/// transforms over those regions.
pub trait FilterModule {
    /// Whether the module exports `capability`.
    fn has_capability(&self, capability: Capability) -> bool;

    /// Allocate `len` bytes of linear memory.
    fn allocate(&mut self, len: u32) -> Result<MemoryRegion, MarshalError>;

    /// Return a region to the module allocator.
    fn release(&mut self, region: MemoryRegion) -> Result<(), MarshalError>;

    /// Copy `bytes` to the start of `region`.
    fn write(&mut self, region: &MemoryRegion, bytes: &[u8]) -> Result<(), MarshalError>;

    /// Copy the start of `region` into `out`.
    fn read(&mut self, region: &MemoryRegion, out: &mut [u8]) -> Result<(), MarshalError>;

    /// Run one transform over `region` in place.
    fn invoke(&mut self, transform: Transform, region: &MemoryRegion) -> Result<(), MarshalError>;

    /// True once the module has hit a fatal error and must be reloaded.
    fn is_poisoned(&self) -> bool {
        false
    }

    /// Mark the module unusable.
    fn poison(&mut self) {}
}
