//! Session command implementation
//!
//! Loads an image into a filter session, feeds it a sequence of control
//! changes as fast as possible, and writes the frame the session settles on.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};

use tint_shared::{ParamChange, TransformParams};
use tint_studio::acquire::FileUpload;
use tint_studio::{FilterSession, Notice, RenderedFrame, StudioConfig};

use crate::output;

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// PNG or JPEG image to filter
    pub input: PathBuf,

    /// Control changes applied in order, e.g. `--set brightness=20 --set grayscale=100`
    #[arg(short = 's', long = "set", value_name = "NAME=VALUE")]
    pub changes: Vec<ParamChange>,

    /// Output file (PNG format)
    #[arg(short, long, default_value = "filtered.png")]
    pub output: PathBuf,

    /// Filter module to use instead of the configured one
    #[arg(short, long)]
    pub module: Option<PathBuf>,

    /// Give up waiting for the final frame after this long (e.g. "10s")
    #[arg(long, default_value = "30s")]
    pub timeout: String,
}

enum Outcome {
    Frame(RenderedFrame),
    Rejected(Notice),
    TimedOut,
}

/// Print notices until one says the input image cannot be used.
///
/// Never resolves if the session closes first.
async fn image_rejection(notices: &mut broadcast::Receiver<Notice>) -> Notice {
    loop {
        match notices.recv().await {
            Ok(notice @ (Notice::UnsupportedFormat(_) | Notice::ImageFailed(_))) => {
                output::notice(&notice);
                return notice;
            }
            Ok(notice) => output::notice(&notice),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                output::warning(&format!("{n} notices dropped"))
            }
            Err(broadcast::error::RecvError::Closed) => std::future::pending().await,
        }
    }
}

pub async fn run(config: &StudioConfig, args: SessionArgs) -> Result<()> {
    let timeout: Duration =
        tint_shared::utils::parse_duration(&args.timeout).context("Failed to parse timeout")?;

    let module = Arc::new(super::shared_module(config, args.module)?);
    let session = FilterSession::spawn(module, config.session_config());
    let mut notices = session.notices();

    session.load(FileUpload::from_path(&args.input)).await?;

    // the session ignores changes it rejects, so fold the same way
    let mut expected = TransformParams::default();
    for change in args.changes {
        if let Ok(next) = expected.apply(change) {
            expected = next;
        }
        session.change(change).await?;
    }

    let outcome = tokio::select! {
        frame = session.frame_for(expected) => Outcome::Frame(frame?),
        notice = image_rejection(&mut notices) => Outcome::Rejected(notice),
        _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
    };

    loop {
        match notices.try_recv() {
            Ok(notice) => output::notice(&notice),
            Err(TryRecvError::Lagged(n)) => output::warning(&format!("{n} notices dropped")),
            Err(_) => break,
        }
    }

    let result = match outcome {
        Outcome::Frame(frame) => {
            super::write_png(&frame.image, &args.output).await?;
            if frame.filtered {
                output::success(&format!(
                    "Wrote {} image (generation {}) to {}",
                    output::dimensions(&frame.image),
                    frame.generation,
                    args.output.display()
                ));
            } else {
                output::warning(&format!(
                    "Filters unavailable, wrote unfiltered image to {}",
                    args.output.display()
                ));
            }
            Ok(())
        }
        Outcome::Rejected(notice) => Err(anyhow::anyhow!("{}", notice))
            .with_context(|| format!("Failed to load {}", args.input.display())),
        Outcome::TimedOut => {
            output::error("No frame rendered before the timeout");
            Err(anyhow::anyhow!("timed out after {:?}", timeout))
        }
    };

    session.shutdown().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDING_FILTERS: &str =
        include_str!("../../../wasm-runtime/tests/fixtures/recording_filters.wat");

    fn args(input: PathBuf, output: PathBuf) -> SessionArgs {
        SessionArgs {
            input,
            changes: vec![ParamChange::Grayscale(100)],
            output,
            module: None,
            timeout: "10m".to_string(),
        }
    }

    #[tokio::test]
    async fn test_rejected_upload_fails_without_waiting() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("image.wasm"), RECORDING_FILTERS).unwrap();
        let input = dir.path().join("cat.gif");
        std::fs::write(&input, b"GIF89a").unwrap();
        let out = dir.path().join("out.png");

        let config = StudioConfig {
            asset_root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run(&config, args(input, out.clone())),
        )
        .await
        .expect("a rejected upload should not wait for the timeout");

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("image/gif"));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_rejection_skips_other_notices() {
        let (tx, mut rx) = broadcast::channel(8);
        tx.send(Notice::InvalidParams("brightness".into())).unwrap();
        tx.send(Notice::ImageFailed("truncated".into())).unwrap();

        assert_eq!(
            image_rejection(&mut rx).await,
            Notice::ImageFailed("truncated".into())
        );
    }
}
