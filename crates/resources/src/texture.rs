//! Image loading for texture upload.

use std::path::Path;

use tracing::info;

use crate::error::ResourceResult;

/// Decoded image as tightly packed RGBA8 pixels.
///
/// `pixels` holds `width * height * 4` bytes in row-major order, ready
/// for a staging-buffer copy.
#[derive(Debug, Default)]
pub struct TextureData {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// RGBA8 pixel data.
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Loads and decodes an image file, converting to RGBA8.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ResourceError::Image`] when the file cannot
    /// be read or decoded.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        let image = image::open(path)?.into_rgba8();
        let (width, height) = image.dimensions();
        let pixels = image.into_raw();

        info!(
            "Loaded texture '{}': {}x{} ({} bytes)",
            path.display(),
            width,
            height,
            pixels.len()
        );

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Size of the pixel data in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}
