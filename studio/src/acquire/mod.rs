//! Image acquisition
//!
//! Images come from a user-selected file or from a camera still. Either
//! way the result is a [`SourceImage`]: decoded RGBA pixels plus where
//! they came from.

pub mod camera;
pub mod file;
#[cfg(feature = "camera")]
pub mod nokhwa_device;

pub use camera::{CameraCapture, CaptureDevice};
pub use file::{FileUpload, ACCEPTED_MIME_TYPES};

use async_trait::async_trait;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use thiserror::Error;
use tint_shared::PixelBuffer;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("unsupported image type {0}: only PNG and JPEG are allowed")]
    UnsupportedFormat(String),

    #[error("camera unavailable: {0}")]
    CameraAccess(String),

    #[error("no camera frame available")]
    NoFrame,

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a source image came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    File { name: String, mime: String },
    Camera { device: String },
    Memory,
}

/// A decoded image ready to be filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub pixels: PixelBuffer,
    pub origin: SourceOrigin,
}

impl SourceImage {
    pub fn new(pixels: PixelBuffer, origin: SourceOrigin) -> Self {
        Self { pixels, origin }
    }

    pub fn from_rgba(image: RgbaImage, origin: SourceOrigin) -> Result<Self, AcquireError> {
        let (width, height) = image.dimensions();
        let pixels = PixelBuffer::new(width, height, image.into_raw())
            .map_err(|e| AcquireError::Decode(e.to_string()))?;
        Ok(Self { pixels, origin })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Encode the source pixels as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, AcquireError> {
        encode_png(&self.pixels)
    }
}

/// Anything that can produce a source image.
#[async_trait]
pub trait ImageAcquirer: Send {
    /// Human-readable description for logs and notices
    fn describe(&self) -> String;

    async fn acquire(&mut self) -> Result<SourceImage, AcquireError>;
}

/// Encode an RGBA buffer as PNG.
pub fn encode_png(pixels: &PixelBuffer) -> Result<Vec<u8>, AcquireError> {
    let image = RgbaImage::from_raw(pixels.width(), pixels.height(), pixels.as_bytes().to_vec())
        .ok_or_else(|| AcquireError::Encode("pixel buffer does not match its dimensions".into()))?;
    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| AcquireError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

/// Decode `bytes` in the given format to RGBA.
pub fn decode_rgba(bytes: &[u8], format: ImageFormat) -> Result<RgbaImage, AcquireError> {
    image::load_from_memory_with_format(bytes, format)
        .map(|img| img.to_rgba8())
        .map_err(|e| AcquireError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_roundtrip_keeps_pixels() {
        let pixels = PixelBuffer::new(2, 1, vec![10, 20, 30, 255, 200, 210, 220, 255]).unwrap();
        let png = encode_png(&pixels).unwrap();
        assert_eq!(&png[..4], b"\x89PNG");

        let decoded = decode_rgba(&png, ImageFormat::Png).unwrap();
        let source = SourceImage::from_rgba(decoded, SourceOrigin::Memory).unwrap();
        assert_eq!(source.pixels, pixels);
    }

    #[test]
    fn test_decode_wrong_format() {
        let err = decode_rgba(b"not a png", ImageFormat::Png).unwrap_err();
        assert!(matches!(err, AcquireError::Decode(_)));
    }
}
