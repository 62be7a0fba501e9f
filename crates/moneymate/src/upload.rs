//! Validation of uploaded slip images.

use image::ImageFormat;

use crate::error::UploadError;

/// Default upload size limit: 10 MiB.
pub const DEFAULT_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Image types accepted as slips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
}

impl ImageKind {
    pub const ALL: [ImageKind; 3] = [ImageKind::Jpeg, ImageKind::Png, ImageKind::Webp];

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Webp => "image/webp",
        }
    }

    /// Extension used for the stored blob.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Webp => "webp",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.mime_type() == essence)
    }

    fn from_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::Png => Some(ImageKind::Png),
            ImageFormat::WebP => Some(ImageKind::Webp),
            _ => None,
        }
    }
}

/// Size and type restrictions for uploads.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_bytes: usize,
    pub allowed: Vec<ImageKind>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            allowed: ImageKind::ALL.to_vec(),
        }
    }
}

impl UploadPolicy {
    /// Checks an upload and returns the detected image kind.
    ///
    /// The declared content type must be allowed, and the leading bytes of
    /// the file must actually be an image of that type.
    pub fn validate(&self, content_type: Option<&str>, bytes: &[u8]) -> Result<ImageKind, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                size: bytes.len(),
                limit_mb: self.max_bytes.div_ceil(1024 * 1024),
            });
        }

        let declared = content_type.unwrap_or_default();
        let kind = ImageKind::from_mime(declared)
            .filter(|k| self.allowed.contains(k))
            .ok_or_else(|| UploadError::UnsupportedType(declared.to_string()))?;

        let sniffed = image::guess_format(bytes).ok().and_then(ImageKind::from_format);
        if sniffed != Some(kind) {
            return Err(UploadError::ContentMismatch {
                declared: kind.mime_type().to_string(),
            });
        }

        Ok(kind)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Smallest byte strings `image::guess_format` recognises.
    pub const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
    pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    pub const WEBP: &[u8] = b"RIFF\x24\x00\x00\x00WEBPVP8 ";
}
