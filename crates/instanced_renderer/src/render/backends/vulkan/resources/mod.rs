//! Vulkan resource management
//!
//! Contains types for managing GPU resources: staged buffers, textures,
//! descriptor layouts and pools, and the per-instance dynamic uniform block.

/// Host-visible writes and device-local staged uploads
pub mod buffer;

/// Texture loading, layout transitions and material texture handles
pub mod texture;

/// Descriptor set management
pub mod descriptor_set;

/// Per-instance model matrices behind one dynamic uniform descriptor
pub mod dynamic_uniform;

pub use buffer::{write_data, DeviceLocalBuffer};
pub use texture::{transition_barrier, MaterialTextureBinder, TextureHandle, TextureRecord, TEXTURE_FORMAT};
pub use descriptor_set::{DescriptorAllocator, DescriptorSetLayoutBuilder};
pub use dynamic_uniform::{aligned_stride, DynamicUniformBlock};
