//! Image loading utilities for texture data
//!
//! Every source is decoded to tightly packed RGBA8, the only format the
//! texture binder uploads.

use std::path::Path;

use crate::assets::AssetError;

/// Bytes per RGBA8 texel
pub const RGBA8_TEXEL_SIZE: usize = 4;

/// Decoded RGBA8 image ready for GPU upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Raw RGBA pixel data, row-major, no padding
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Load an image from a file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path_ref = path.as_ref();
        log::debug!("Loading image from: {:?}", path_ref);

        let img = image::open(path_ref)
            .map_err(|e| AssetError::LoadFailed(format!("{}: {e}", path_ref.display())))?;
        Ok(Self::from_dynamic(&img))
    }

    /// Decode an encoded image (PNG, JPEG) held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AssetError::LoadFailed(format!("in-memory image: {e}")))?;
        Ok(Self::from_dynamic(&img))
    }

    fn from_dynamic(img: &image::DynamicImage) -> Self {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        log::debug!("Decoded image {}x{}", width, height);

        Self {
            data: rgba.into_raw(),
            width,
            height,
        }
    }

    /// Create a solid color image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = (width * height) as usize;
        Self {
            data: color.repeat(pixel_count),
            width,
            height,
        }
    }

    /// Get the size of the image data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Reject empty images and buffers that do not match the dimensions
    pub fn validate(&self) -> Result<(), AssetError> {
        if self.width == 0 || self.height == 0 {
            return Err(AssetError::InvalidData(format!(
                "image has zero extent {}x{}",
                self.width, self.height
            )));
        }
        let expected = self.width as usize * self.height as usize * RGBA8_TEXEL_SIZE;
        if self.data.len() != expected {
            return Err(AssetError::InvalidData(format!(
                "expected {expected} bytes for {}x{} RGBA8, found {}",
                self.width,
                self.height,
                self.data.len()
            )));
        }
        Ok(())
    }
}
