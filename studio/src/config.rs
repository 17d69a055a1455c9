//! Studio configuration
//!
//! Layered with the `config` crate: built-in defaults, then an optional
//! TOML file, then `TINT_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use tint_shared::wasm::DEFAULT_MODULE_FILE;
use tint_wasm::runtime::{DEFAULT_FUEL_PER_CALL, DEFAULT_MEMORY_PAGES};
use tint_wasm::{ModuleLoadError, ModuleLoader, ModuleSource, RuntimeLimits, WasmRuntime};

use crate::session::SessionConfig;

/// Largest linear memory we are willing to provide (1 GiB)
const MAX_MEMORY_PAGES: u32 = 16 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Static asset directory the filter module is fetched from
    pub asset_root: PathBuf,

    /// Filter module file name under `asset_root`
    pub module_file: String,

    /// Pages of linear memory provided to the module (64 KiB each)
    pub memory_pages: u32,

    /// Fuel granted to each guest call
    pub fuel_per_call: u64,

    /// Quiet period before a burst of control changes is rendered
    pub debounce_ms: u64,

    /// Notices buffered per subscriber
    pub notice_capacity: usize,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("public"),
            module_file: DEFAULT_MODULE_FILE.to_string(),
            memory_pages: DEFAULT_MEMORY_PAGES,
            fuel_per_call: DEFAULT_FUEL_PER_CALL,
            debounce_ms: 30,
            notice_capacity: 64,
        }
    }
}

impl StudioConfig {
    /// Load configuration from defaults, `file` (if any) and the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        match file {
            Some(path) => {
                builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
            }
            None => {
                builder = builder.add_source(config::File::with_name("tint").required(false));
            }
        }
        builder = builder.add_source(config::Environment::with_prefix("TINT").try_parsing(true));

        let config: StudioConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.module_file.trim().is_empty() {
            return Err(ConfigError::Invalid("module_file must not be empty".into()));
        }

        if self.memory_pages == 0 || self.memory_pages > MAX_MEMORY_PAGES {
            return Err(ConfigError::Invalid(format!(
                "memory_pages must be within 1..={}",
                MAX_MEMORY_PAGES
            )));
        }

        if self.fuel_per_call == 0 {
            return Err(ConfigError::Invalid("fuel_per_call must be greater than 0".into()));
        }

        if self.notice_capacity == 0 {
            return Err(ConfigError::Invalid("notice_capacity must be greater than 0".into()));
        }

        Ok(())
    }

    pub fn module_path(&self) -> PathBuf {
        self.asset_root.join(&self.module_file)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn runtime_limits(&self) -> RuntimeLimits {
        RuntimeLimits {
            memory_pages: self.memory_pages,
            fuel_per_call: self.fuel_per_call,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            debounce: self.debounce(),
            notice_capacity: self.notice_capacity,
        }
    }

    /// Loader for the configured module path.
    pub fn module_loader(&self) -> Result<ModuleLoader, ModuleLoadError> {
        let runtime = WasmRuntime::new(self.runtime_limits())?;
        Ok(ModuleLoader::new(runtime, ModuleSource::Path(self.module_path())))
    }
}
