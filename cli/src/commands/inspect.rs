//! Inspect command implementation

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

use tint_shared::wasm::{Capability, FILTER_ABI_VERSION};
use tint_studio::StudioConfig;

use crate::output;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Filter module to inspect instead of the configured one
    #[arg(short, long)]
    pub module: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct Report {
    abi_version: u32,
    memory_bytes: usize,
    memory_pages: u64,
    exports: Vec<ExportReport>,
}

#[derive(Serialize)]
struct ExportReport {
    capability: Capability,
    export: Option<&'static str>,
    required: bool,
}

pub async fn run(config: &StudioConfig, args: InspectArgs) -> Result<()> {
    let module = super::shared_module(config, args.module)?;
    let exports = module
        .capabilities()
        .await
        .context("Failed to load filter module")?;
    let (memory_bytes, memory_pages) = module
        .with_module(|m| (m.memory_size(), m.memory_pages()))
        .await?;

    let report = Report {
        abi_version: FILTER_ABI_VERSION,
        memory_bytes,
        memory_pages,
        exports: exports
            .into_iter()
            .map(|(capability, export)| ExportReport {
                capability,
                export,
                required: capability.is_required(),
            })
            .collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    output::info(&format!(
        "Linear memory: {} pages ({} bytes)",
        report.memory_pages, report.memory_bytes
    ));
    for entry in &report.exports {
        match entry.export {
            Some(name) => println!("  {} {:<18} {}", "✓".green(), entry.capability.name(), name.dimmed()),
            None => println!("  {} {}", "✗".red(), entry.capability.name()),
        }
    }
    if report.exports.iter().any(|e| e.export.is_none()) {
        output::warning("Some filters are unavailable with this module");
    }
    Ok(())
}
