//! Vulkan backend implementation
//!
//! Organized into initialization, device, resources and rendering modules.
//! Everything above this layer talks to the GPU through [`GpuDevice`].

/// Vulkan initialization types (context, error type)
pub mod initialization;

/// Device seam: resource descriptions and the `GpuDevice` trait
pub mod device;

/// Vulkan resource management (buffers, textures, descriptors, uniforms)
pub mod resources;

/// Draw-time operations (recorder, frame coordinator, vertex layout)
pub mod rendering;

#[cfg(test)]
pub(crate) mod testing;

// Re-export core initialization types
pub use initialization::context::{VulkanContext, VulkanError, VulkanResult};

// Re-export device seam
pub use device::{
    AllocatedBuffer, AllocatedImage, BufferDesc, DescriptorWrite, GpuDevice, ImageBarrier, ImageDesc,
    SamplerDesc, TransferCommand,
};

// Re-export resource types
pub use resources::buffer::DeviceLocalBuffer;
pub use resources::texture::{MaterialTextureBinder, TextureHandle};
pub use resources::descriptor_set::{DescriptorAllocator, DescriptorSetLayoutBuilder};
pub use resources::dynamic_uniform::DynamicUniformBlock;

// Re-export rendering types
pub use rendering::draw_recorder::{CommandBufferRecorder, DrawRecorder};
pub use rendering::frame_binding::FrameBindingCoordinator;
pub use rendering::vertex_layout::VulkanVertexLayout;
