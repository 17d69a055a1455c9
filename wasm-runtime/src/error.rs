//! Error taxonomy for loading filter modules and marshaling pixels

use std::path::PathBuf;
use thiserror::Error;
use tint_shared::wasm::Capability;

/// The filter module could not be fetched or instantiated.
#[derive(Debug, Error)]
pub enum ModuleLoadError {
    #[error("failed to create wasm engine: {0}")]
    Engine(String),

    #[error("failed to read filter module {path}: {source}")]
    Fetch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to compile filter module: {0}")]
    Compile(String),

    #[error("failed to instantiate filter module: {0}")]
    Instantiate(String),

    #[error("filter module does not export `{0}`")]
    MissingExport(&'static str),

    #[error("filter module export `{export}` has the wrong signature: {reason}")]
    Signature { export: &'static str, reason: String },
}

/// A pixel buffer could not be pushed through the filter module.
#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("pixel buffer length {0} is not a multiple of 4")]
    InvalidBuffer(usize),

    #[error("failed to allocate {requested} bytes in module memory: {reason}")]
    Allocation { requested: usize, reason: String },

    #[error("failed to release module memory at {ptr:#x}: {reason}")]
    Release { ptr: u32, reason: String },

    #[error("module memory access out of bounds: {0}")]
    MemoryAccess(String),

    #[error("filter `{op}` trapped: {reason}")]
    Trap { op: Capability, reason: String },

    #[error("filter module does not provide `{0}`")]
    MissingCapability(Capability),

    #[error("filter module state is unusable and must be reloaded")]
    Poisoned,
}

impl MarshalError {
    /// Errors after which the module instance can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MarshalError::Release { .. } | MarshalError::Trap { .. } | MarshalError::Poisoned
        )
    }
}

/// Either half of a filter application through the shared handle.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Load(#[from] ModuleLoadError),

    #[error(transparent)]
    Marshal(#[from] MarshalError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(MarshalError::Poisoned.is_fatal());
        assert!(MarshalError::Release {
            ptr: 8,
            reason: "trap".into()
        }
        .is_fatal());
        assert!(!MarshalError::InvalidBuffer(3).is_fatal());
        assert!(!MarshalError::Allocation {
            requested: 8,
            reason: "null".into()
        }
        .is_fatal());
    }
}
