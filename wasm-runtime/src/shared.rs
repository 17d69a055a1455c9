//! Session-wide filter module handle.
//!
//! The module is instantiated lazily on first use and memoised. All
//! marshaling goes through one mutex, so two filter runs can never hold
//! regions of the same linear memory at once. A poisoned module is
//! dropped and reloaded on the next use.

use tokio::sync::Mutex;
use tracing::{info, warn};

use tint_shared::wasm::Capability;
use tint_shared::{PixelBuffer, TransformParams};

use crate::error::{FilterError, ModuleLoadError};
use crate::marshal::apply_filters;
use crate::runtime::{ModuleLoader, WasmFilterModule};
use crate::FilterModule;

pub struct SharedFilterModule {
    loader: ModuleLoader,
    slot: Mutex<Option<WasmFilterModule>>,
    loads: std::sync::atomic::AtomicU32,
}

impl SharedFilterModule {
    pub fn new(loader: ModuleLoader) -> Self {
        Self {
            loader,
            slot: Mutex::new(None),
            loads: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Number of times the module has been instantiated.
    pub fn load_count(&self) -> u32 {
        self.loads.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Instantiate the module now if it is not loaded yet.
    pub async fn ensure_loaded(&self) -> Result<(), ModuleLoadError> {
        let mut slot = self.slot.lock().await;
        self.load_into(&mut slot).await.map(|_| ())
    }

    /// Capabilities of the loaded module, loading it if needed.
    pub async fn capabilities(&self) -> Result<Vec<(Capability, Option<&'static str>)>, ModuleLoadError> {
        let mut slot = self.slot.lock().await;
        let module = self.load_into(&mut slot).await?;
        Ok(Capability::ALL
            .iter()
            .map(|cap| (*cap, module.export_name(*cap)))
            .collect())
    }

    /// Filter `pixels` with the shared module.
    ///
    /// The module is loaded (or reloaded) even for neutral parameters, so
    /// a missing module is reported on every path; neutral parameters
    /// still never touch its memory.
    pub async fn apply(
        &self,
        pixels: &PixelBuffer,
        params: &TransformParams,
    ) -> Result<PixelBuffer, FilterError> {
        let mut slot = self.slot.lock().await;
        let module = self.load_into(&mut slot).await?;
        Ok(apply_filters(module, pixels, params)?)
    }

    /// Run `f` against the loaded module while holding the lock.
    pub async fn with_module<R>(
        &self,
        f: impl FnOnce(&mut WasmFilterModule) -> R,
    ) -> Result<R, ModuleLoadError> {
        let mut slot = self.slot.lock().await;
        let module = self.load_into(&mut slot).await?;
        Ok(f(module))
    }

    async fn load_into<'a>(
        &self,
        slot: &'a mut Option<WasmFilterModule>,
    ) -> Result<&'a mut WasmFilterModule, ModuleLoadError> {
        let module = match slot.take() {
            Some(module) if !module.is_poisoned() => module,
            stale => {
                if stale.is_some() {
                    warn!("discarding poisoned filter module");
                }
                let module = self.loader.load().await?;
                let n = self
                    .loads
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
                    + 1;
                info!(load = n, "filter module ready");
                module
            }
        };
        Ok(slot.insert(module))
    }
}
