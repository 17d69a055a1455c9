//! Camera stills
//!
//! A capture device is opened on request, shows a live preview, and is
//! released as soon as a still has been taken.

use async_trait::async_trait;
use image::ImageFormat;
use tracing::{info, warn};

use tint_shared::PixelBuffer;

use super::{decode_rgba, encode_png, AcquireError, ImageAcquirer, SourceImage, SourceOrigin};

/// A live video source.
pub trait CaptureDevice {
    fn name(&self) -> String;

    /// Request access to the device and start streaming.
    fn open(&mut self) -> Result<(), AcquireError>;

    /// Most recent frame at the device's native resolution.
    fn frame(&mut self) -> Result<PixelBuffer, AcquireError>;

    /// Stop streaming and give the device back.
    fn release(&mut self) -> Result<(), AcquireError>;
}

pub struct CameraCapture<D: CaptureDevice> {
    /// Empty while a background capture owns the device
    device: Option<D>,
    name: String,
    is_open: bool,
}

impl<D: CaptureDevice> CameraCapture<D> {
    pub fn new(device: D) -> Self {
        Self {
            name: device.name(),
            device: Some(device),
            is_open: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    fn device(&mut self) -> Result<&mut D, AcquireError> {
        self.device
            .as_mut()
            .ok_or_else(|| AcquireError::CameraAccess("camera is busy".into()))
    }

    pub fn open(&mut self) -> Result<(), AcquireError> {
        if self.is_open {
            return Ok(());
        }
        self.device()?.open().map_err(|e| match e {
            AcquireError::CameraAccess(_) => e,
            other => AcquireError::CameraAccess(other.to_string()),
        })?;
        self.is_open = true;
        info!(device = %self.name, "camera opened");
        Ok(())
    }

    /// Current live frame.
    pub fn preview(&mut self) -> Result<PixelBuffer, AcquireError> {
        if !self.is_open {
            return Err(AcquireError::CameraAccess("camera is not open".into()));
        }
        self.device()?.frame()
    }

    /// Take a still from the live stream, then release the device.
    ///
    /// The frame is encoded to PNG and decoded back, so a still carries
    /// exactly what a saved capture would.
    pub fn capture(&mut self) -> Result<SourceImage, AcquireError> {
        let frame = self.preview();
        let released = self.close();
        let frame = frame?;
        released?;

        let png = encode_png(&frame)?;
        let image = decode_rgba(&png, ImageFormat::Png)?;
        SourceImage::from_rgba(
            image,
            SourceOrigin::Camera {
                device: self.name.clone(),
            },
        )
    }

    /// Release the device if it is open.
    pub fn close(&mut self) -> Result<(), AcquireError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;
        self.device()?.release()
    }
}

impl<D: CaptureDevice> Drop for CameraCapture<D> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to release camera: {}", e);
        }
    }
}

#[async_trait]
impl<D: CaptureDevice + Send + 'static> ImageAcquirer for CameraCapture<D> {
    fn describe(&self) -> String {
        format!("camera {}", self.name)
    }

    /// Opens, captures and releases on the blocking pool; device calls
    /// and the PNG round trip may block.
    async fn acquire(&mut self) -> Result<SourceImage, AcquireError> {
        let device = self.device.take().ok_or_else(|| {
            AcquireError::CameraAccess("camera is busy".into())
        })?;
        let mut worker = CameraCapture {
            device: Some(device),
            name: self.name.clone(),
            is_open: std::mem::take(&mut self.is_open),
        };

        let (mut worker, result) = tokio::task::spawn_blocking(move || {
            let result = worker.open().and_then(|()| worker.capture());
            (worker, result)
        })
        .await
        .map_err(|e| AcquireError::CameraAccess(format!("capture task failed: {e}")))?;

        // hand the device back without running the worker's Drop release
        self.device = worker.device.take();
        self.is_open = std::mem::take(&mut worker.is_open);
        result
    }
}
