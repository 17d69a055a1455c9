//! Packed RGBA pixel buffers
//!
//! A pixel buffer is the unit that crosses the host/guest boundary:
//! tightly packed RGBA, one byte per channel, row-major, no padding.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bytes per RGBA pixel
pub const CHANNELS: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("pixel buffer length {0} is not a multiple of 4")]
    NotRgba(usize),

    #[error("pixel buffer length {len} does not match {width}x{height} RGBA")]
    DimensionMismatch { width: u32, height: u32, len: usize },
}

/// An RGBA image owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap `data` as a `width` x `height` RGBA image.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, BufferError> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(BufferError::DimensionMismatch {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Wrap raw bytes as a single row of pixels.
    ///
    /// Only the multiple-of-4 precondition is checked.
    pub fn from_raw(data: Vec<u8>) -> Result<Self, BufferError> {
        if data.len() % CHANNELS != 0 {
            return Err(BufferError::NotRgba(data.len()));
        }
        Ok(Self {
            width: (data.len() / CHANNELS) as u32,
            height: 1,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Build a buffer with the same dimensions but different contents.
    pub fn with_data(&self, data: Vec<u8>) -> Result<Self, BufferError> {
        Self::new(self.width, self.height, data)
    }

    /// Iterate over pixels as `[r, g, b, a]` chunks.
    pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(CHANNELS)
    }
}
