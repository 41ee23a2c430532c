//! Per-frame bind and draw sequencing
//!
//! Every instance gets its own bind sequence and indexed draw:
//!
//! | set | contents                     | dynamic offset   |
//! |-----|------------------------------|------------------|
//! | 0   | camera, supplied by caller   | none             |
//! | 1   | instance model matrix        | `index * stride` |
//! | 2   | material sampler of the mesh | none             |
//!
//! Draw count grows linearly with instance count; nothing is batched.

use ash::vk;
use log::trace;

use crate::config::{DrawGranularity, RendererConfig};
use crate::render::backends::vulkan::rendering::DrawRecorder;
use crate::render::backends::vulkan::resources::dynamic_uniform::DynamicUniformBlock;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::render::resources::geometry_store::{GeometryStore, MeshRecord};
use crate::scene::instance_table::InstanceTable;

/// Descriptor set index of the camera uniform
pub const CAMERA_SET: u32 = 0;
/// Descriptor set index of the per-instance dynamic uniform
pub const INSTANCE_SET: u32 = 1;
/// Descriptor set index of the material sampler
pub const MATERIAL_SET: u32 = 2;

/// Records the draws for one frame
#[derive(Debug, Clone, Copy)]
pub struct FrameBindingCoordinator {
    granularity: DrawGranularity,
}

impl FrameBindingCoordinator {
    /// Create a coordinator using the configured draw granularity
    pub fn new(config: &RendererConfig) -> Self {
        Self::with_granularity(config.draw_granularity)
    }

    /// Create a coordinator with an explicit draw granularity
    pub fn with_granularity(granularity: DrawGranularity) -> Self {
        Self { granularity }
    }

    /// Configured draw granularity
    pub fn granularity(&self) -> DrawGranularity {
        self.granularity
    }

    /// Record bind and draw commands for every instance
    ///
    /// `uniforms` must have been refreshed from `instances` this frame. All
    /// lookups are resolved before anything is recorded, so on error the
    /// recorder is left untouched. Returns the number of draws issued.
    pub fn record_frame(
        &self,
        recorder: &mut dyn DrawRecorder,
        camera_set: vk::DescriptorSet,
        geometry: &GeometryStore,
        instances: &InstanceTable,
        uniforms: &DynamicUniformBlock,
    ) -> VulkanResult<u32> {
        let draws = Self::resolve(geometry, instances, uniforms)?;

        let mut draw_count = 0;
        for (mesh, dynamic_offset) in draws {
            recorder.bind_vertex_buffer(mesh.vertex_buffer());
            recorder.bind_index_buffer(mesh.index_buffer());
            recorder.bind_descriptor_set(CAMERA_SET, camera_set, &[]);
            recorder.bind_descriptor_set(INSTANCE_SET, uniforms.descriptor_set(), &[dynamic_offset]);

            match self.granularity {
                DrawGranularity::PerInstance => {
                    recorder.bind_descriptor_set(MATERIAL_SET, mesh.mesh_descriptor(), &[]);
                    recorder.draw_indexed(mesh.index_count(), 0);
                    draw_count += 1;
                }
                DrawGranularity::PerSubmesh => {
                    for submesh in mesh.submeshes() {
                        recorder.bind_descriptor_set(MATERIAL_SET, mesh.submesh_descriptor(submesh), &[]);
                        recorder.draw_indexed(submesh.index_count, submesh.start_index);
                        draw_count += 1;
                    }
                }
            }
        }

        trace!("Recorded {} draws for {} instances", draw_count, instances.len());
        Ok(draw_count)
    }

    fn resolve<'a>(
        geometry: &'a GeometryStore,
        instances: &InstanceTable,
        uniforms: &DynamicUniformBlock,
    ) -> VulkanResult<Vec<(&'a MeshRecord, u32)>> {
        if instances.len() > uniforms.capacity() {
            return Err(VulkanError::CapacityExceeded {
                capacity: uniforms.capacity(),
                requested: instances.len(),
            });
        }

        instances
            .ids()
            .map(|id| {
                let not_found = |kind| VulkanError::ResourceNotFound { kind, id: id.0 as u64 };
                let mesh_id = instances.mesh_id(id).ok_or_else(|| not_found("instance"))?;
                let mesh = geometry.mesh(mesh_id).ok_or(VulkanError::ResourceNotFound {
                    kind: "mesh",
                    id: mesh_id.0 as u64,
                })?;
                let offset = uniforms.dynamic_offset(id).ok_or_else(|| not_found("uniform slot"))?;
                Ok((mesh, offset))
            })
            .collect()
    }
}
