//! # Instanced Renderer
//!
//! GPU resource and instance management for a Vulkan mesh renderer that
//! draws many transformed copies of a few meshes.
//!
//! ## Features
//!
//! - **Geometry Store**: OBJ loading, vertex deduplication, staged upload to
//!   device-local buffers, per-material submeshes
//! - **Material Textures**: image decoding, layout transitions, samplers and
//!   stable texture handles
//! - **Instance Table**: column-oriented per-instance transforms with dirty
//!   tracking and motion integration
//! - **Dynamic Uniforms**: every model matrix in one buffer, addressed by an
//!   aligned dynamic offset
//! - **Frame Binding**: per-instance bind and draw recording
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use instanced_renderer::prelude::*;
//!
//! fn run(device: &dyn GpuDevice) -> VulkanResult<()> {
//!     let config = RendererConfig::default();
//!     let material_layout = DescriptorSetLayoutBuilder::material_sampler().build(device)?;
//!     let instance_layout = DescriptorSetLayoutBuilder::instance_uniform().build(device)?;
//!
//!     let mut textures = MaterialTextureBinder::new(&config);
//!     let mut geometry = GeometryStore::new(device, material_layout, &config)?;
//!     let ship = geometry.load_mesh(device, &mut textures, Path::new("models/ship.obj"))?;
//!
//!     let mut instances = InstanceTable::new();
//!     let id = instances.add_instance(ship);
//!     instances.set_moving_speed(id, 2.0)?;
//!
//!     let mut uniforms =
//!         DynamicUniformBlock::new(device, instance_layout, instances.len(), config.uniform_capacity)?;
//!
//!     // once per frame
//!     instances.update(1.0 / 60.0);
//!     instances.update_model_matrices();
//!     uniforms.refresh(device, &instances)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod foundation;
pub mod config;
pub mod assets;
pub mod render;
pub mod scene;

/// Common imports for renderer users
pub mod prelude {
    pub use crate::{
        assets::{ImageData, LoadedObj, ObjLoader},
        config::{CapacityPolicy, Config, DrawGranularity, RendererConfig},
        foundation::math::{Mat4, Vec3},
        render::backends::vulkan::{
            CommandBufferRecorder, DescriptorSetLayoutBuilder, DrawRecorder, DynamicUniformBlock,
            FrameBindingCoordinator, GpuDevice, MaterialTextureBinder, TextureHandle, VulkanContext,
            VulkanError, VulkanResult, VulkanVertexLayout,
        },
        render::{GeometryStore, Material, MeshData, MeshId, Submesh, Vertex},
        scene::{InstanceId, InstanceTable},
    };
}
