//! Configuration system
//!
//! File-backed configuration (TOML or RON) for the resource subsystem.

use std::path::Path;

pub use serde::{Serialize, Deserialize};

/// On-disk encodings, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Ron,
}

impl Format {
    fn of(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// File-backed configuration in TOML or RON
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load from a `.toml` or `.ron` file; missing fields take their defaults
    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = Format::of(path)?;
        let contents = std::fs::read_to_string(path)?;

        match format {
            Format::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Format::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Write to a `.toml` or `.ron` file
    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match Format::of(path)? {
            Format::Toml => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            Format::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// What `DynamicUniformBlock::refresh` does when the instance table has grown
/// past the block's capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CapacityPolicy {
    /// Capacity is fixed at construction; a larger table is rejected.
    #[default]
    Fixed,
    /// Reallocate with doubled capacity and rewrite the bound descriptor.
    Grow,
}

/// How many indexed draws the frame coordinator issues per instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DrawGranularity {
    /// One draw over the whole index buffer, bound to the mesh descriptor.
    #[default]
    PerInstance,
    /// One draw per submesh, each bound to that submesh's material descriptor.
    PerSubmesh,
}

/// # Renderer Resource Configuration
///
/// Tuning for geometry loading, texture sampling and per-instance uniform
/// packing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Flip the V texture coordinate on load (OBJ is bottom-left origin)
    pub flip_texcoord_v: bool,
    /// Size of the material descriptor pool owned by the geometry store
    pub max_material_descriptor_sets: u32,
    /// Maximum sampler anisotropy
    pub max_anisotropy: f32,
    /// Growth policy for the per-instance uniform block
    pub uniform_capacity: CapacityPolicy,
    /// Draw call granularity used by the frame coordinator
    pub draw_granularity: DrawGranularity,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            flip_texcoord_v: true,
            max_material_descriptor_sets: 256,
            max_anisotropy: 16.0,
            uniform_capacity: CapacityPolicy::Fixed,
            draw_granularity: DrawGranularity::PerInstance,
        }
    }
}

impl Config for RendererConfig {}
