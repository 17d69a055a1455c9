//! Run a filter module over a small gradient
//!
//! ```text
//! cargo build -p tint-filter --target wasm32-unknown-unknown --release
//! cargo run -p tint-wasm --example filter_example -- target/wasm32-unknown-unknown/release/tint_filter.wasm
//! ```

use std::path::PathBuf;

use tint_shared::{PixelBuffer, TransformParams};
use tint_wasm::{ModuleLoader, ModuleSource, RuntimeLimits, SharedFilterModule, WasmRuntime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("public/image.wasm"));

    let runtime = WasmRuntime::new(RuntimeLimits::default())?;
    let module = SharedFilterModule::new(ModuleLoader::new(runtime, ModuleSource::Path(path)));

    for (capability, export) in module.capabilities().await? {
        println!("{:<12} {}", capability.name(), export.unwrap_or("-"));
    }

    // 4x1 red-to-blue gradient
    let data = (0..4u8)
        .flat_map(|i| [255 - i * 60, 40, i * 60, 255])
        .collect();
    let pixels = PixelBuffer::new(4, 1, data)?;

    let params = TransformParams::new(10, 25, 100)?;
    let filtered = module.apply(&pixels, &params).await?;

    for (before, after) in pixels.pixels().zip(filtered.pixels()) {
        println!("{before:?} -> {after:?}");
    }
    Ok(())
}
