//! Capture command implementation

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use tint_studio::acquire::nokhwa_device::NokhwaDevice;
use tint_studio::acquire::CameraCapture;
use tint_studio::StudioConfig;

use super::FilterArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct CaptureArgs {
    /// Camera index
    #[arg(short, long, default_value_t = 0)]
    pub device: u32,

    /// Output file (PNG format)
    #[arg(short, long, default_value = "capture.png")]
    pub output: PathBuf,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Filter module to use instead of the configured one
    #[arg(short, long)]
    pub module: Option<PathBuf>,
}

pub async fn run(config: &StudioConfig, args: CaptureArgs) -> Result<()> {
    let params = args.filters.params().context("Invalid filter settings")?;

    let mut camera = CameraCapture::new(NokhwaDevice::new(args.device));
    camera.open().context("Failed to open camera")?;
    let still = camera.capture().context("Failed to capture still")?;
    output::info(&format!("Captured {} still", output::dimensions(&still.pixels)));

    let module = super::shared_module(config, args.module)?;
    let filtered = module
        .apply(&still.pixels, &params)
        .await
        .context("Failed to apply filters")?;

    super::write_png(&filtered, &args.output).await?;
    output::success(&format!("Wrote {}", args.output.display()));
    Ok(())
}
