//! Vulkan-specific vertex layout definitions
//!
//! Keeps `Vertex` itself backend-agnostic; the external pipeline builder
//! reads its vertex input state from here.

use std::mem::offset_of;

use ash::vk;

use crate::render::primitives::mesh::Vertex;

/// Vulkan vertex input description for [`Vertex`]
pub struct VulkanVertexLayout;

impl VulkanVertexLayout {
    /// Binding 0, advanced per vertex
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Position (location 0), texture coordinate (1), color (2)
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, tex_coord) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
        ]
    }
}
