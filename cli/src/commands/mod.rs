//! Subcommands and the pieces they share

pub mod apply;
#[cfg(feature = "camera")]
pub mod capture;
pub mod inspect;
pub mod session;

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use tint_shared::{PixelBuffer, TransformParams};
use tint_studio::acquire::encode_png;
use tint_studio::StudioConfig;
use tint_wasm::{ModuleLoader, ModuleSource, SharedFilterModule, WasmRuntime};

/// Filter controls shared by the commands that render an image.
#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    /// Brightness offset (-100..=100)
    #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
    pub brightness: i32,

    /// Contrast (-100..=100)
    #[arg(short, long, default_value_t = 0, allow_hyphen_values = true)]
    pub contrast: i32,

    /// Grayscale intensity (0..=100)
    #[arg(short, long, default_value_t = 0)]
    pub grayscale: i32,

    /// Sepia toning
    #[arg(long)]
    pub sepia: bool,

    /// Invert colors
    #[arg(long)]
    pub invert: bool,
}

impl FilterArgs {
    pub fn params(&self) -> Result<TransformParams> {
        Ok(TransformParams::new(self.brightness, self.contrast, self.grayscale)?
            .with_sepia(self.sepia)
            .with_invert(self.invert))
    }
}

pub fn load_config(path: Option<&Path>) -> Result<StudioConfig> {
    StudioConfig::load(path).context("Failed to load configuration")
}

/// Shared module for `config`, or for `module` if given.
pub fn shared_module(config: &StudioConfig, module: Option<PathBuf>) -> Result<SharedFilterModule> {
    let loader = match module {
        Some(path) => ModuleLoader::new(
            WasmRuntime::new(config.runtime_limits()).context("Failed to create WASM runtime")?,
            ModuleSource::Path(path),
        ),
        None => config
            .module_loader()
            .context("Failed to create WASM runtime")?,
    };
    Ok(SharedFilterModule::new(loader))
}

pub async fn write_png(pixels: &PixelBuffer, path: &Path) -> Result<()> {
    let png = encode_png(pixels).context("Failed to encode PNG")?;
    tokio::fs::write(path, png)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
