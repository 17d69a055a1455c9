//! File uploads
//!
//! Only PNG and JPEG are accepted. The MIME type is the one the caller
//! declares (e.g. from a file picker or the file extension) or, failing
//! that, sniffed from the content.

use async_trait::async_trait;
use image::ImageFormat;
use std::path::PathBuf;
use tracing::debug;

use tint_shared::utils::mime_for_extension;

use super::{decode_rgba, AcquireError, ImageAcquirer, SourceImage, SourceOrigin};

pub const ACCEPTED_MIME_TYPES: [&str; 2] = ["image/png", "image/jpeg"];

enum Content {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

pub struct FileUpload {
    name: String,
    content: Content,
    declared_mime: Option<String>,
}

impl FileUpload {
    /// Upload a file from disk; its extension supplies the MIME type.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let declared_mime = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_for_extension)
            .map(str::to_string);
        Self {
            name: path.display().to_string(),
            content: Content::Path(path),
            declared_mime,
        }
    }

    /// Upload bytes already in memory, optionally with a declared MIME type.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>, mime: Option<String>) -> Self {
        Self {
            name: name.into(),
            content: Content::Bytes(bytes),
            declared_mime: mime,
        }
    }

    pub fn declared_mime(&self) -> Option<&str> {
        self.declared_mime.as_deref()
    }
}

/// Image format for an accepted MIME type.
pub fn accepted_format(mime: &str) -> Result<ImageFormat, AcquireError> {
    match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" => Ok(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Ok(ImageFormat::Jpeg),
        _ => Err(AcquireError::UnsupportedFormat(mime.to_string())),
    }
}

/// MIME type sniffed from the leading bytes.
pub fn sniff_mime(bytes: &[u8]) -> String {
    let mime = match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Bmp) => "image/bmp",
        _ => "application/octet-stream",
    };
    mime.to_string()
}

#[async_trait]
impl ImageAcquirer for FileUpload {
    fn describe(&self) -> String {
        format!("file {}", self.name)
    }

    async fn acquire(&mut self) -> Result<SourceImage, AcquireError> {
        // reject on the declared type before touching the content
        if let Some(mime) = &self.declared_mime {
            accepted_format(mime)?;
        }

        let bytes = match &self.content {
            Content::Path(path) => tokio::fs::read(path).await?,
            Content::Bytes(bytes) => bytes.clone(),
        };
        let mime = match &self.declared_mime {
            Some(mime) => mime.clone(),
            None => sniff_mime(&bytes),
        };
        let format = accepted_format(&mime)?;
        debug!(name = %self.name, %mime, size = bytes.len(), "decoding upload");

        let image = tokio::task::spawn_blocking(move || decode_rgba(&bytes, format))
            .await
            .map_err(|e| AcquireError::Decode(e.to_string()))??;

        SourceImage::from_rgba(
            image,
            SourceOrigin::File {
                name: self.name.clone(),
                mime,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::encode_png;
    use tint_shared::PixelBuffer;

    const GIF_HEADER: &[u8] = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";

    fn png_bytes() -> Vec<u8> {
        let pixels = PixelBuffer::new(1, 2, vec![1, 2, 3, 255, 4, 5, 6, 255]).unwrap();
        encode_png(&pixels).unwrap()
    }

    #[test]
    fn test_accepted_formats() {
        assert_eq!(accepted_format("image/png").unwrap(), ImageFormat::Png);
        assert_eq!(accepted_format("IMAGE/JPEG").unwrap(), ImageFormat::Jpeg);
        assert!(matches!(
            accepted_format("image/gif"),
            Err(AcquireError::UnsupportedFormat(m)) if m == "image/gif"
        ));
    }

    #[test]
    fn test_sniff_mime() {
        assert_eq!(sniff_mime(&png_bytes()), "image/png");
        assert_eq!(sniff_mime(GIF_HEADER), "image/gif");
        assert_eq!(sniff_mime(b"hello"), "application/octet-stream");
    }

    #[test]
    fn test_mime_from_extension() {
        assert_eq!(FileUpload::from_path("cat.JPG").declared_mime(), Some("image/jpeg"));
        assert_eq!(FileUpload::from_path("notes").declared_mime(), None);
    }

    #[tokio::test]
    async fn test_decodes_png_bytes() {
        let mut upload = FileUpload::from_bytes("a.png", png_bytes(), None);
        let image = upload.acquire().await.unwrap();
        assert_eq!((image.width(), image.height()), (1, 2));
        assert_eq!(image.pixels.as_bytes(), &[1, 2, 3, 255, 4, 5, 6, 255]);
        assert_eq!(
            image.origin,
            SourceOrigin::File {
                name: "a.png".into(),
                mime: "image/png".into()
            }
        );
    }

    #[tokio::test]
    async fn test_rejects_declared_gif() {
        let mut upload = FileUpload::from_bytes("a.gif", GIF_HEADER.to_vec(), Some("image/gif".into()));
        let err = upload.acquire().await.unwrap_err();
        assert!(matches!(err, AcquireError::UnsupportedFormat(m) if m == "image/gif"));
    }

    #[tokio::test]
    async fn test_rejects_sniffed_gif() {
        let mut upload = FileUpload::from_bytes("upload", GIF_HEADER.to_vec(), None);
        let err = upload.acquire().await.unwrap_err();
        assert!(matches!(err, AcquireError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.png");
        std::fs::write(&path, png_bytes()).unwrap();

        let mut upload = FileUpload::from_path(&path);
        let image = upload.acquire().await.unwrap();
        assert_eq!(image.pixels.len(), 8);
    }

    #[tokio::test]
    async fn test_mislabelled_content_fails_to_decode() {
        let mut upload = FileUpload::from_bytes("x.png", b"garbage".to_vec(), Some("image/png".into()));
        assert!(matches!(upload.acquire().await, Err(AcquireError::Decode(_))));
    }
}
