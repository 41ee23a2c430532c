//! Asset decoding
//!
//! Turns geometry and image sources into host-side data. Device upload
//! happens in the render resources.

pub mod obj_loader;
pub mod image_loader;

pub use obj_loader::{LoadedObj, MaterialSource, ObjLoader};
pub use image_loader::ImageData;

use thiserror::Error;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// Failed to load asset
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// Invalid asset data
    #[error("Invalid data: {0}")]
    InvalidData(String),
}
