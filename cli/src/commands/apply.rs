//! Apply command implementation

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use tint_studio::acquire::FileUpload;
use tint_studio::{ImageAcquirer, StudioConfig};

use super::FilterArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// PNG or JPEG image to filter
    pub input: PathBuf,

    /// Output file (PNG format)
    #[arg(short, long, default_value = "filtered.png")]
    pub output: PathBuf,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Filter module to use instead of the configured one
    #[arg(short, long)]
    pub module: Option<PathBuf>,

    /// Print a JSON summary instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct ApplySummary<'a> {
    input: String,
    output: String,
    width: u32,
    height: u32,
    params: &'a tint_shared::TransformParams,
}

pub async fn run(config: &StudioConfig, args: ApplyArgs) -> Result<()> {
    let params = args.filters.params().context("Invalid filter settings")?;

    let mut upload = FileUpload::from_path(&args.input);
    let source = upload
        .acquire()
        .await
        .with_context(|| format!("Failed to open {}", args.input.display()))?;

    let module = super::shared_module(config, args.module)?;
    let filtered = module
        .apply(&source.pixels, &params)
        .await
        .context("Failed to apply filters")?;

    super::write_png(&filtered, &args.output).await?;

    if args.json {
        let summary = ApplySummary {
            input: args.input.display().to_string(),
            output: args.output.display().to_string(),
            width: filtered.width(),
            height: filtered.height(),
            params: &params,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        output::success(&format!(
            "Wrote {} image to {}",
            output::dimensions(&filtered),
            args.output.display()
        ));
    }
    Ok(())
}
