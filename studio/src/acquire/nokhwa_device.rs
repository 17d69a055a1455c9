//! Platform camera backed by nokhwa

use nokhwa::{
    pixel_format::RgbAFormat,
    utils::{CameraIndex, RequestedFormat, RequestedFormatType},
    CallbackCamera,
};
use tint_shared::PixelBuffer;

use super::{AcquireError, CaptureDevice};

pub struct NokhwaDevice {
    index: u32,
    camera: Option<CallbackCamera>,
}

impl NokhwaDevice {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            camera: None,
        }
    }
}

impl CaptureDevice for NokhwaDevice {
    fn name(&self) -> String {
        format!("camera{}", self.index)
    }

    fn open(&mut self) -> Result<(), AcquireError> {
        let format = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestResolution);
        let mut camera = CallbackCamera::new(CameraIndex::Index(self.index), format, |_| {})
            .map_err(|e| AcquireError::CameraAccess(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| AcquireError::CameraAccess(e.to_string()))?;
        self.camera = Some(camera);
        Ok(())
    }

    fn frame(&mut self) -> Result<PixelBuffer, AcquireError> {
        let camera = self
            .camera
            .as_mut()
            .ok_or_else(|| AcquireError::CameraAccess("camera is not open".into()))?;
        let buffer = camera.last_frame().map_err(|_| AcquireError::NoFrame)?;
        let image = buffer
            .decode_image::<RgbAFormat>()
            .map_err(|e| AcquireError::Decode(e.to_string()))?;
        let (width, height) = image.dimensions();
        PixelBuffer::new(width, height, image.into_raw())
            .map_err(|e| AcquireError::Decode(e.to_string()))
    }

    fn release(&mut self) -> Result<(), AcquireError> {
        match self.camera.take() {
            Some(mut camera) => camera
                .stop_stream()
                .map_err(|e| AcquireError::CameraAccess(e.to_string())),
            None => Ok(()),
        }
    }
}
