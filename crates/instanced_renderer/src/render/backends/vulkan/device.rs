//! Device abstraction used by every resource component
//!
//! Components never hold a device. They receive `&dyn GpuDevice` for the
//! duration of the call that needs it; the single top-level owner of the
//! device controls its lifetime.
//!
//! Covers buffer and image allocation, host mapping, one-time transfer
//! submission and descriptor updates. Pipeline, swapchain and render pass
//! objects belong to the external bootstrap.

use ash::vk;
use crate::render::backends::vulkan::VulkanResult;

/// Parameters for a buffer plus its dedicated memory allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    /// Size in bytes
    pub size: vk::DeviceSize,
    /// How the buffer will be used
    pub usage: vk::BufferUsageFlags,
    /// Required memory properties
    pub memory_properties: vk::MemoryPropertyFlags,
    /// Queue sharing mode
    pub sharing_mode: vk::SharingMode,
}

impl BufferDesc {
    /// Host-visible, host-coherent transfer source
    pub fn staging(size: vk::DeviceSize) -> Self {
        Self {
            size,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            memory_properties: vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
        }
    }

    /// Device-local transfer destination with the given extra usage
    pub fn device_local(size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        Self {
            size,
            usage: vk::BufferUsageFlags::TRANSFER_DST | usage,
            memory_properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
        }
    }

    /// Host-visible uniform buffer. Coherence is not requested, so writes
    /// must be flushed.
    pub fn host_visible_uniform(size: vk::DeviceSize) -> Self {
        Self {
            size,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
            memory_properties: vk::MemoryPropertyFlags::HOST_VISIBLE,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
        }
    }
}

/// A buffer bound to its own memory allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedBuffer {
    /// Buffer handle
    pub buffer: vk::Buffer,
    /// Backing memory
    pub memory: vk::DeviceMemory,
    /// Requested size in bytes
    pub size: vk::DeviceSize,
}

/// Parameters for a 2D, single-mip, single-layer image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    /// Image extent in texels
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
    /// Memory tiling
    pub tiling: vk::ImageTiling,
    /// Usage flags
    pub usage: vk::ImageUsageFlags,
    /// Required memory properties
    pub memory_properties: vk::MemoryPropertyFlags,
    /// Layout the image is created in
    pub initial_layout: vk::ImageLayout,
}

/// An image bound to its own memory allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedImage {
    /// Image handle
    pub image: vk::Image,
    /// Backing memory
    pub memory: vk::DeviceMemory,
    /// Image extent in texels
    pub extent: vk::Extent2D,
    /// Texel format
    pub format: vk::Format,
}

/// Sampler parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    /// Min and mag filter
    pub filter: vk::Filter,
    /// Addressing on U, V and W
    pub address_mode: vk::SamplerAddressMode,
    /// Maximum anisotropy; values <= 1.0 disable anisotropic filtering
    pub max_anisotropy: f32,
}

/// Image memory barrier with its access masks and pipeline stages resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    /// Image being transitioned
    pub image: vk::Image,
    /// Layout before the barrier
    pub old_layout: vk::ImageLayout,
    /// Layout after the barrier
    pub new_layout: vk::ImageLayout,
    /// Aspects covered by the barrier
    pub aspect_mask: vk::ImageAspectFlags,
    /// Accesses that must complete before the barrier
    pub src_access_mask: vk::AccessFlags,
    /// Accesses that wait on the barrier
    pub dst_access_mask: vk::AccessFlags,
    /// Producing stage
    pub src_stage: vk::PipelineStageFlags,
    /// Consuming stage
    pub dst_stage: vk::PipelineStageFlags,
}

/// A command recorded into a one-time transfer command buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferCommand {
    /// Copy `size` bytes from the start of `src` to the start of `dst`
    CopyBuffer {
        /// Source buffer
        src: vk::Buffer,
        /// Destination buffer
        dst: vk::Buffer,
        /// Byte count
        size: vk::DeviceSize,
    },
    /// Copy tightly packed texels into an image in `TRANSFER_DST_OPTIMAL`
    CopyBufferToImage {
        /// Source buffer
        src: vk::Buffer,
        /// Destination image
        image: vk::Image,
        /// Copied extent
        extent: vk::Extent2D,
    },
    /// Image layout transition
    ImageBarrier(ImageBarrier),
}

/// A single descriptor update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorWrite {
    /// Combined image + sampler in `SHADER_READ_ONLY_OPTIMAL`
    CombinedImageSampler {
        /// Target set
        set: vk::DescriptorSet,
        /// Target binding
        binding: u32,
        /// Sampled view
        view: vk::ImageView,
        /// Sampler
        sampler: vk::Sampler,
    },
    /// Dynamic uniform buffer; `range` is the window one draw sees
    UniformBufferDynamic {
        /// Target set
        set: vk::DescriptorSet,
        /// Target binding
        binding: u32,
        /// Source buffer
        buffer: vk::Buffer,
        /// Bytes visible per dynamic offset
        range: vk::DeviceSize,
    },
}

/// GPU operations needed by the geometry, texture and uniform components
pub trait GpuDevice {
    /// Device-reported `minUniformBufferOffsetAlignment` in bytes
    fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize;

    /// Create a buffer, allocate matching memory and bind it
    fn create_buffer(&self, desc: &BufferDesc) -> VulkanResult<AllocatedBuffer>;

    /// Destroy a buffer and free its memory
    fn destroy_buffer(&self, buffer: AllocatedBuffer);

    /// Map a range of host-visible memory
    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VulkanResult<*mut u8>;

    /// Make host writes in a mapped range visible to the device
    fn flush_mapped_range(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VulkanResult<()>;

    /// Unmap previously mapped memory
    fn unmap_memory(&self, memory: vk::DeviceMemory);

    /// Create an image, allocate matching memory and bind it
    fn create_image(&self, desc: &ImageDesc) -> VulkanResult<AllocatedImage>;

    /// Destroy an image and free its memory
    fn destroy_image(&self, image: AllocatedImage);

    /// Create a 2D color view over a whole image
    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VulkanResult<vk::ImageView>;

    /// Destroy an image view
    fn destroy_image_view(&self, view: vk::ImageView);

    /// Create a sampler
    fn create_sampler(&self, desc: &SamplerDesc) -> VulkanResult<vk::Sampler>;

    /// Destroy a sampler
    fn destroy_sampler(&self, sampler: vk::Sampler);

    /// Record `commands` into a one-time command buffer, submit it and block
    /// until the queue is idle
    fn execute_one_time(&self, commands: &[TransferCommand]) -> VulkanResult<()>;

    /// Create a descriptor set layout from its bindings
    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VulkanResult<vk::DescriptorSetLayout>;

    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    /// Create a descriptor pool whose sets can be freed individually
    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VulkanResult<vk::DescriptorPool>;

    /// Destroy a descriptor pool and every set allocated from it
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    /// Allocate one descriptor set
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet>;

    /// Return sets to the pool they were allocated from
    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VulkanResult<()>;

    /// Apply one descriptor update
    fn write_descriptor(&self, write: &DescriptorWrite);
}

/// Copy `bytes` into mapped memory starting at `offset` within the mapping
///
/// The mapping must have been created by `device.map_memory` and cover at
/// least `offset + bytes.len()` bytes.
pub(crate) fn copy_to_mapped(mapped: *mut u8, offset: usize, bytes: &[u8]) {
    // SAFETY: callers map at least `offset + bytes.len()` bytes and the source
    // is a host slice that cannot alias device-mapped memory.
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), mapped.add(offset), bytes.len());
    }
}
