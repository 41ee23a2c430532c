//! Per-instance model matrices packed into one dynamic uniform buffer
//!
//! Instance `i` lives at byte offset `i * stride`, where `stride` is the
//! matrix size rounded up to the device's `minUniformBufferOffsetAlignment`.
//! The whole host copy is written to the device every frame. The memory is
//! host-visible but not requested coherent, so each write is flushed.

use ash::vk;
use log::{debug, trace};

use crate::config::CapacityPolicy;
use crate::foundation::math::{mat4_bytes, MAT4_SIZE};
use crate::render::backends::vulkan::device::{AllocatedBuffer, BufferDesc, DescriptorWrite, GpuDevice};
use crate::render::backends::vulkan::resources::buffer::write_data;
use crate::render::backends::vulkan::resources::descriptor_set::DescriptorAllocator;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use crate::scene::instance_table::{InstanceId, InstanceTable};

/// Round `element_size` up to a multiple of `alignment`
///
/// `stride = (S / A) * A + (S % A > 0 ? A : 0)`, so `stride % A == 0` and
/// `stride >= S`. An alignment of zero is rejected.
pub fn aligned_stride(element_size: u64, alignment: u64) -> VulkanResult<u64> {
    if alignment == 0 {
        return Err(VulkanError::InvalidAlignment(alignment));
    }
    let whole = (element_size / alignment) * alignment;
    Ok(if element_size % alignment > 0 {
        whole + alignment
    } else {
        whole
    })
}

/// Model matrices for every instance in one dynamically offset buffer
pub struct DynamicUniformBlock {
    stride: u64,
    capacity: usize,
    host: Vec<u8>,
    buffer: AllocatedBuffer,
    descriptors: DescriptorAllocator,
    descriptor_set: vk::DescriptorSet,
    policy: CapacityPolicy,
}

impl DynamicUniformBlock {
    /// Allocate room for `capacity` instances and bind it to a set of `layout`
    ///
    /// `layout` must hold a dynamic uniform buffer at binding 0, see
    /// `DescriptorSetLayoutBuilder::instance_uniform`. A zero capacity still
    /// reserves one slot.
    pub fn new(
        device: &dyn GpuDevice,
        layout: vk::DescriptorSetLayout,
        capacity: usize,
        policy: CapacityPolicy,
    ) -> VulkanResult<Self> {
        let alignment = device.min_uniform_buffer_offset_alignment();
        let stride = aligned_stride(MAT4_SIZE, alignment)?;
        let capacity = capacity.max(1);

        let buffer = device.create_buffer(&BufferDesc::host_visible_uniform(stride * capacity as u64))?;

        let mut descriptors = match DescriptorAllocator::new(
            device,
            layout,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            1,
        ) {
            Ok(descriptors) => descriptors,
            Err(e) => {
                device.destroy_buffer(buffer);
                return Err(e);
            }
        };
        let descriptor_set = match descriptors.allocate(device) {
            Ok(set) => set,
            Err(e) => {
                descriptors.destroy(device);
                device.destroy_buffer(buffer);
                return Err(e);
            }
        };

        let block = Self {
            stride,
            capacity,
            host: vec![0; (stride as usize) * capacity],
            buffer,
            descriptors,
            descriptor_set,
            policy,
        };
        block.write_descriptor(device);

        debug!(
            "DynamicUniformBlock: alignment {}, stride {}, capacity {}, {} bytes",
            alignment,
            stride,
            capacity,
            block.buffer_size()
        );
        Ok(block)
    }

    fn write_descriptor(&self, device: &dyn GpuDevice) {
        device.write_descriptor(&DescriptorWrite::UniformBufferDynamic {
            set: self.descriptor_set,
            binding: 0,
            buffer: self.buffer.buffer,
            range: MAT4_SIZE,
        });
    }

    /// Copy every instance's cached model matrix to the device
    ///
    /// Writes matrix `i` at host offset `i * stride`, then maps the buffer,
    /// copies the whole host block, flushes and unmaps. Runs in full every
    /// call regardless of how many instances changed. A table larger than
    /// the block is rejected under `CapacityPolicy::Fixed` and reallocated
    /// under `CapacityPolicy::Grow`.
    pub fn refresh(&mut self, device: &dyn GpuDevice, table: &InstanceTable) -> VulkanResult<()> {
        let count = table.len();
        if count > self.capacity {
            match self.policy {
                CapacityPolicy::Fixed => {
                    return Err(VulkanError::CapacityExceeded {
                        capacity: self.capacity,
                        requested: count,
                    })
                }
                CapacityPolicy::Grow => self.grow(device, count)?,
            }
        }

        let stride = self.stride as usize;
        for (i, matrix) in table.model_matrices().iter().enumerate() {
            let offset = i * stride;
            self.host[offset..offset + MAT4_SIZE as usize].copy_from_slice(mat4_bytes(matrix));
        }

        trace!("Refreshing {} instance matrices ({} bytes)", count, self.host.len());
        write_data(device, &self.buffer, &self.host, true)
    }

    /// Reallocate with doubled capacity until `required` fits, then point the
    /// descriptor at the new buffer
    ///
    /// The old buffer is destroyed immediately, so the caller must not have
    /// frames in flight that still read it.
    fn grow(&mut self, device: &dyn GpuDevice, required: usize) -> VulkanResult<()> {
        let mut capacity = self.capacity;
        while capacity < required {
            capacity *= 2;
        }

        let buffer = device.create_buffer(&BufferDesc::host_visible_uniform(self.stride * capacity as u64))?;
        device.destroy_buffer(std::mem::replace(&mut self.buffer, buffer));
        self.host.resize(self.stride as usize * capacity, 0);
        self.capacity = capacity;
        self.write_descriptor(device);

        debug!("DynamicUniformBlock grew to {} instances", capacity);
        Ok(())
    }

    /// Byte offset to pass when binding the set for `id`
    ///
    /// `None` if the instance lies outside the allocated block.
    pub fn dynamic_offset(&self, id: InstanceId) -> Option<u32> {
        if id.0 >= self.capacity {
            return None;
        }
        u32::try_from(id.0 as u64 * self.stride).ok()
    }

    /// Bytes between consecutive instances
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Instances the buffer currently holds
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Device buffer size in bytes
    pub fn buffer_size(&self) -> u64 {
        self.buffer.size
    }

    /// Device buffer handle
    pub fn buffer(&self) -> vk::Buffer {
        self.buffer.buffer
    }

    /// Set bound at draw time with a per-instance dynamic offset
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Free the buffer and descriptor pool
    pub fn destroy(self, device: &dyn GpuDevice) {
        self.descriptors.destroy(device);
        device.destroy_buffer(self.buffer);
    }
}
