//! Encoded still image handed from capture to analysis.

use super::CaptureError;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Cursor;
use std::sync::{Arc, OnceLock};

/// MIME types forwarded to the vision service without re-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageMime {
    Jpeg,
    Png,
    Webp,
}

impl ImageMime {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
            ImageMime::Webp => "image/webp",
        }
    }

    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(ImageMime::Jpeg),
            ImageFormat::Png => Some(ImageMime::Png),
            ImageFormat::WebP => Some(ImageMime::Webp),
            _ => None,
        }
    }
}

/// An encoded still image plus its MIME type.
///
/// Immutable: a new capture replaces the payload wholesale. Cloning is
/// cheap because the bytes are shared.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    bytes: Arc<[u8]>,
    mime: ImageMime,
    width: u32,
    height: u32,
    digest: String,
}

impl ImagePayload {
    /// Validate and wrap encoded image bytes.
    ///
    /// JPEG, PNG and WebP pass through untouched. Any other format the
    /// decoder understands (GIF, BMP, TIFF, ...) is re-encoded to JPEG.
    pub fn from_encoded(bytes: Vec<u8>) -> Result<Self, CaptureError> {
        let format = image::guess_format(&bytes)
            .map_err(|e| CaptureError::UnreadableFile(format!("unrecognised image data: {}", e)))?;
        let decoded = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| CaptureError::UnreadableFile(format!("decode failed: {}", e)))?;

        match ImageMime::from_format(format) {
            Some(mime) => Ok(Self::build(bytes, mime, decoded.width(), decoded.height())),
            None => {
                log::info!("[CAPTURE] Re-encoding {:?} upload as JPEG", format);
                Self::from_frame(&decoded)
            }
        }
    }

    /// JPEG-encode a decoded frame at its native resolution.
    pub fn from_frame(frame: &DynamicImage) -> Result<Self, CaptureError> {
        // The JPEG encoder rejects alpha channels.
        let rgb = DynamicImage::ImageRgb8(frame.to_rgb8());
        let mut jpeg = Vec::new();
        rgb.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .map_err(|e| CaptureError::UnreadableFile(format!("JPEG encode failed: {}", e)))?;
        Ok(Self::build(jpeg, ImageMime::Jpeg, rgb.width(), rgb.height()))
    }

    /// Parse a `data:image/...;base64,...` URL, as produced by a canvas
    /// snapshot or a file reader in the webview.
    pub fn from_data_url(data_url: &str) -> Result<Self, CaptureError> {
        static DATA_URL: OnceLock<Regex> = OnceLock::new();
        let pattern = DATA_URL.get_or_init(|| {
            Regex::new(r"^data:image/[A-Za-z0-9.+-]+;base64,([A-Za-z0-9+/=\s]+)$")
                .expect("data URL pattern compiles")
        });

        let encoded = pattern
            .captures(data_url.trim())
            .and_then(|caps| caps.get(1))
            .ok_or_else(|| CaptureError::UnreadableFile("not an image data URL".to_string()))?;
        let compact: String = encoded
            .as_str()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| CaptureError::UnreadableFile(format!("bad base64: {}", e)))?;
        Self::from_encoded(bytes)
    }

    fn build(bytes: Vec<u8>, mime: ImageMime, width: u32, height: u32) -> Self {
        let hash = Sha256::digest(&bytes);
        let digest = format!("{:x}", hash)[..16].to_string();
        Self {
            bytes: bytes.into(),
            mime,
            width,
            height,
            digest,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> ImageMime {
        self.mime
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Short SHA-256 prefix identifying this exact image.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Preview source for the webview `<img>` element.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime.as_str(), self.to_base64())
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime", &self.mime.as_str())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.bytes.len())
            .field("digest", &self.digest)
            .finish()
    }
}
