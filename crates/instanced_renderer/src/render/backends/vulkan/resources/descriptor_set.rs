//! Descriptor set layouts and pool-backed allocation
//!
//! The frame binding contract uses three sets: camera (0, owned by the
//! caller), per-instance dynamic uniform (1) and material sampler (2). This
//! module builds layouts for the two sets this crate fills and allocates sets
//! from fixed-size pools.

use ash::vk;

use crate::render::backends::vulkan::device::GpuDevice;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Descriptor set layout builder for creating reusable layouts
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self::default()
    }

    fn add(mut self, binding: u32, ty: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Add a dynamic uniform buffer binding
    pub fn add_uniform_buffer_dynamic(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, stage_flags)
    }

    /// Add a combined image sampler binding
    pub fn add_combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    /// Number of bindings added so far
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &dyn GpuDevice) -> VulkanResult<vk::DescriptorSetLayout> {
        device.create_descriptor_set_layout(&self.bindings)
    }

    /// Set 1 layout: model matrix at binding 0, read by the vertex stage
    pub fn instance_uniform() -> Self {
        Self::new().add_uniform_buffer_dynamic(0, vk::ShaderStageFlags::VERTEX)
    }

    /// Set 2 layout: diffuse sampler at binding 0, read by the fragment stage
    pub fn material_sampler() -> Self {
        Self::new().add_combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
    }
}

/// Fixed-capacity pool handing out sets of one layout and descriptor type
#[derive(Debug)]
pub struct DescriptorAllocator {
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    capacity: u32,
    allocated: u32,
}

impl DescriptorAllocator {
    /// Create a pool for up to `max_sets` sets with one `ty` descriptor each
    pub fn new(
        device: &dyn GpuDevice,
        layout: vk::DescriptorSetLayout,
        ty: vk::DescriptorType,
        max_sets: u32,
    ) -> VulkanResult<Self> {
        if max_sets == 0 {
            return Err(VulkanError::DescriptorAlloc {
                reason: "descriptor pool needs room for at least one set".to_string(),
            });
        }
        let pool_sizes = [vk::DescriptorPoolSize {
            ty,
            descriptor_count: max_sets,
        }];
        let pool = device.create_descriptor_pool(max_sets, &pool_sizes)?;

        Ok(Self {
            pool,
            layout,
            capacity: max_sets,
            allocated: 0,
        })
    }

    /// Allocate one set, failing once the pool is exhausted
    pub fn allocate(&mut self, device: &dyn GpuDevice) -> VulkanResult<vk::DescriptorSet> {
        if self.allocated >= self.capacity {
            return Err(VulkanError::DescriptorAlloc {
                reason: format!("pool exhausted after {} sets", self.capacity),
            });
        }
        let set = device.allocate_descriptor_set(self.pool, self.layout)?;
        self.allocated += 1;
        Ok(set)
    }

    /// Return sets from this pool so their slots can be handed out again
    pub fn free(&mut self, device: &dyn GpuDevice, sets: &[vk::DescriptorSet]) -> VulkanResult<()> {
        if sets.is_empty() {
            return Ok(());
        }
        device.free_descriptor_sets(self.pool, sets)?;
        self.allocated = self.allocated.saturating_sub(u32::try_from(sets.len()).unwrap_or(u32::MAX));
        Ok(())
    }

    /// Sets handed out so far
    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Destroy the pool and every set allocated from it
    pub fn destroy(self, device: &dyn GpuDevice) {
        device.destroy_descriptor_pool(self.pool);
    }
}
