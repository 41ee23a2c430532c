//! Command recording for per-instance draws
//!
//! [`DrawRecorder`] is the narrow command-submission surface the frame
//! coordinator needs. [`CommandBufferRecorder`] records into a command buffer
//! that the caller has already begun inside a render pass with the graphics
//! pipeline bound.

use ash::vk;

/// Bind and draw commands issued by the frame coordinator
pub trait DrawRecorder {
    /// Bind a vertex buffer at binding 0, offset 0
    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer);

    /// Bind a `u32` index buffer at offset 0
    fn bind_index_buffer(&mut self, buffer: vk::Buffer);

    /// Bind one descriptor set at `set_index` with its dynamic offsets
    fn bind_descriptor_set(&mut self, set_index: u32, set: vk::DescriptorSet, dynamic_offsets: &[u32]);

    /// Draw `index_count` indices starting at `first_index`, one instance
    fn draw_indexed(&mut self, index_count: u32, first_index: u32);
}

/// Records draws into a live ash command buffer
pub struct CommandBufferRecorder<'a> {
    device: &'a ash::Device,
    command_buffer: vk::CommandBuffer,
    pipeline_layout: vk::PipelineLayout,
}

impl<'a> CommandBufferRecorder<'a> {
    /// Wrap a command buffer in the recording state
    pub fn new(
        device: &'a ash::Device,
        command_buffer: vk::CommandBuffer,
        pipeline_layout: vk::PipelineLayout,
    ) -> Self {
        Self {
            device,
            command_buffer,
            pipeline_layout,
        }
    }
}

impl DrawRecorder for CommandBufferRecorder<'_> {
    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_vertex_buffers(self.command_buffer, 0, &[buffer], &[0]);
        }
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(self.command_buffer, buffer, 0, vk::IndexType::UINT32);
        }
    }

    fn bind_descriptor_set(&mut self, set_index: u32, set: vk::DescriptorSet, dynamic_offsets: &[u32]) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                set_index,
                &[set],
                dynamic_offsets,
            );
        }
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32) {
        unsafe {
            self.device
                .cmd_draw_indexed(self.command_buffer, index_count, 1, first_index, 0, 0);
        }
    }
}
