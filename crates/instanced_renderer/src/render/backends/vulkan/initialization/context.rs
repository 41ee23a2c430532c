//! Vulkan context management
//!
//! `VulkanContext` wraps the handles produced by the external bootstrap
//! (instance, logical device, physical device, graphics queue) and implements
//! [`GpuDevice`] on top of them. It owns only the transient command pool used
//! for one-time transfers.

use ash::vk;
use log::{debug, trace};
use thiserror::Error;

use crate::render::backends::vulkan::device::{
    AllocatedBuffer, AllocatedImage, BufferDesc, DescriptorWrite, GpuDevice, ImageDesc,
    SamplerDesc, TransferCommand,
};

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// A geometry or image source could not be read or parsed
    #[error("Failed to load '{path}': {reason}")]
    Load {
        /// Path or name of the source
        path: String,
        /// What went wrong
        reason: String,
    },

    /// Buffer object creation failed
    #[error("Buffer creation failed: {reason}")]
    BufferCreate {
        /// Driver-reported reason
        reason: String,
    },

    /// Device memory allocation failed
    #[error("Memory allocation failed: {requested} bytes")]
    MemoryAlloc {
        /// Number of bytes that were requested
        requested: u64,
    },

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Image barrier requested outside the legal transition table
    #[error("Unsupported layout transition: {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Current layout
        old: vk::ImageLayout,
        /// Requested layout
        new: vk::ImageLayout,
    },

    /// Descriptor pool creation or set allocation failed
    #[error("Descriptor allocation failed: {reason}")]
    DescriptorAlloc {
        /// Driver-reported reason
        reason: String,
    },

    /// Resource with specified ID could not be found
    #[error("{kind} not found: {id}")]
    ResourceNotFound {
        /// Kind of resource ("mesh", "texture", "instance")
        kind: &'static str,
        /// The identifier that was looked up
        id: u64,
    },

    /// More instances than a fixed-capacity block was built for
    #[error("Capacity exceeded: block holds {capacity} instances, table has {requested}")]
    CapacityExceeded {
        /// Instances the block was allocated for
        capacity: usize,
        /// Instances present in the table
        requested: usize,
    },

    /// Device reported an unusable offset alignment
    #[error("Invalid uniform buffer offset alignment: {0}")]
    InvalidAlignment(u64),
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Device handles plus the transient command pool used for uploads
pub struct VulkanContext {
    instance: ash::Instance,
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    graphics_queue: vk::Queue,
    command_pool: vk::CommandPool,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    min_uniform_alignment: vk::DeviceSize,
}

impl VulkanContext {
    /// Wrap bootstrap-created handles and create the transfer command pool
    ///
    /// The caller still destroys the instance and device, after dropping this
    /// context. If textures use anisotropic filtering the device must have
    /// been created with `samplerAnisotropy` enabled.
    pub fn new(
        instance: ash::Instance,
        device: ash::Device,
        physical_device: vk::PhysicalDevice,
        graphics_queue: vk::Queue,
        queue_family_index: u32,
    ) -> VulkanResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe { device.create_command_pool(&pool_info, None)? };

        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let min_uniform_alignment = properties.limits.min_uniform_buffer_offset_alignment;

        debug!(
            "VulkanContext ready: queue family {}, uniform offset alignment {}",
            queue_family_index, min_uniform_alignment
        );

        Ok(Self {
            instance,
            device,
            physical_device,
            graphics_queue,
            command_pool,
            memory_properties,
            min_uniform_alignment,
        })
    }

    /// Logical device, for building a [`CommandBufferRecorder`](crate::render::backends::vulkan::CommandBufferRecorder)
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Instance the context was created from
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Physical device backing the logical device
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Find memory type index
    fn find_memory_type(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<u32> {
        (0..self.memory_properties.memory_type_count)
            .find(|&i| {
                (type_filter & (1 << i)) != 0
                    && self.memory_properties.memory_types[i as usize]
                        .property_flags
                        .contains(properties)
            })
            .ok_or(VulkanError::NoSuitableMemoryType)
    }

    fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<vk::DeviceMemory> {
        let memory_type_index = self.find_memory_type(requirements.memory_type_bits, properties)?;
        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        unsafe { self.device.allocate_memory(&allocate_info, None) }.map_err(|_| {
            VulkanError::MemoryAlloc {
                requested: requirements.size,
            }
        })
    }

    fn record_command(&self, command_buffer: vk::CommandBuffer, command: &TransferCommand) {
        match *command {
            TransferCommand::CopyBuffer { src, dst, size } => {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size,
                };
                unsafe {
                    self.device
                        .cmd_copy_buffer(command_buffer, src, dst, &[region]);
                }
            }
            TransferCommand::CopyBufferToImage { src, image, extent } => {
                let region = vk::BufferImageCopy::builder()
                    .buffer_offset(0)
                    .buffer_row_length(0)
                    .buffer_image_height(0)
                    .image_subresource(vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                    .image_extent(vk::Extent3D {
                        width: extent.width,
                        height: extent.height,
                        depth: 1,
                    });
                unsafe {
                    self.device.cmd_copy_buffer_to_image(
                        command_buffer,
                        src,
                        image,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region.build()],
                    );
                }
            }
            TransferCommand::ImageBarrier(barrier) => {
                let image_barrier = vk::ImageMemoryBarrier::builder()
                    .old_layout(barrier.old_layout)
                    .new_layout(barrier.new_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(barrier.image)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: barrier.aspect_mask,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
                    .src_access_mask(barrier.src_access_mask)
                    .dst_access_mask(barrier.dst_access_mask);
                unsafe {
                    self.device.cmd_pipeline_barrier(
                        command_buffer,
                        barrier.src_stage,
                        barrier.dst_stage,
                        vk::DependencyFlags::empty(),
                        &[],
                        &[],
                        &[image_barrier.build()],
                    );
                }
            }
        }
    }

    fn submit_and_wait(
        &self,
        command_buffer: vk::CommandBuffer,
        commands: &[TransferCommand],
    ) -> VulkanResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe { self.device.begin_command_buffer(command_buffer, &begin_info)? };
        for command in commands {
            self.record_command(command_buffer, command);
        }
        unsafe { self.device.end_command_buffer(command_buffer)? };

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit_info.build()], vk::Fence::null())?;
            self.device.queue_wait_idle(self.graphics_queue)?;
        }
        Ok(())
    }
}

impl GpuDevice for VulkanContext {
    fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.min_uniform_alignment
    }

    fn create_buffer(&self, desc: &BufferDesc) -> VulkanResult<AllocatedBuffer> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(desc.sharing_mode);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }.map_err(|e| {
            VulkanError::BufferCreate {
                reason: format!("{e:?}"),
            }
        })?;

        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory = match self.allocate(requirements, desc.memory_properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { self.device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
            }
            return Err(e.into());
        }

        trace!("Created buffer {:?} ({} bytes, {:?})", buffer, desc.size, desc.usage);
        Ok(AllocatedBuffer {
            buffer,
            memory,
            size: desc.size,
        })
    }

    fn destroy_buffer(&self, buffer: AllocatedBuffer) {
        unsafe {
            self.device.destroy_buffer(buffer.buffer, None);
            self.device.free_memory(buffer.memory, None);
        }
    }

    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VulkanResult<*mut u8> {
        let ptr = unsafe {
            self.device
                .map_memory(memory, offset, size, vk::MemoryMapFlags::empty())?
        };
        Ok(ptr.cast::<u8>())
    }

    fn flush_mapped_range(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VulkanResult<()> {
        let range = vk::MappedMemoryRange::builder()
            .memory(memory)
            .offset(offset)
            .size(size)
            .build();
        unsafe { self.device.flush_mapped_memory_ranges(&[range])? };
        Ok(())
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) };
    }

    fn create_image(&self, desc: &ImageDesc) -> VulkanResult<AllocatedImage> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(desc.format)
            .tiling(desc.tiling)
            .initial_layout(desc.initial_layout)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe { self.device.create_image(&image_info, None)? };

        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let memory = match self.allocate(requirements, desc.memory_properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { self.device.bind_image_memory(image, memory, 0) } {
            unsafe {
                self.device.destroy_image(image, None);
                self.device.free_memory(memory, None);
            }
            return Err(e.into());
        }

        Ok(AllocatedImage {
            image,
            memory,
            extent: desc.extent,
            format: desc.format,
        })
    }

    fn destroy_image(&self, image: AllocatedImage) {
        unsafe {
            self.device.destroy_image(image.image, None);
            self.device.free_memory(image.memory, None);
        }
    }

    fn create_image_view(&self, image: vk::Image, format: vk::Format) -> VulkanResult<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        Ok(unsafe { self.device.create_image_view(&view_info, None)? })
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> VulkanResult<vk::Sampler> {
        let anisotropy = desc.max_anisotropy > 1.0;
        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(desc.filter)
            .min_filter(desc.filter)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy { desc.max_anisotropy } else { 1.0 })
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0);

        Ok(unsafe { self.device.create_sampler(&sampler_info, None)? })
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) };
    }

    fn execute_one_time(&self, commands: &[TransferCommand]) -> VulkanResult<()> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(self.command_pool)
            .command_buffer_count(1);

        let command_buffer = unsafe { self.device.allocate_command_buffers(&allocate_info)? }
            .first()
            .copied()
            .ok_or(VulkanError::Api(vk::Result::ERROR_OUT_OF_HOST_MEMORY))?;

        let result = self.submit_and_wait(command_buffer, commands);

        unsafe {
            self.device
                .free_command_buffers(self.command_pool, &[command_buffer]);
        }
        result
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);
        Ok(unsafe { self.device.create_descriptor_set_layout(&layout_info, None)? })
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VulkanResult<vk::DescriptorPool> {
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        unsafe { self.device.create_descriptor_pool(&pool_info, None) }.map_err(|e| {
            VulkanError::DescriptorAlloc {
                reason: format!("pool creation: {e:?}"),
            }
        })
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) };
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&allocate_info) }.map_err(|e| {
            VulkanError::DescriptorAlloc {
                reason: format!("set allocation: {e:?}"),
            }
        })?;

        sets.first().copied().ok_or_else(|| VulkanError::DescriptorAlloc {
            reason: "driver returned no descriptor set".to_string(),
        })
    }

    fn free_descriptor_sets(&self, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VulkanResult<()> {
        unsafe { self.device.free_descriptor_sets(pool, sets) }.map_err(|e| VulkanError::DescriptorAlloc {
            reason: format!("set release: {e:?}"),
        })
    }

    fn write_descriptor(&self, write: &DescriptorWrite) {
        match *write {
            DescriptorWrite::CombinedImageSampler {
                set,
                binding,
                view,
                sampler,
            } => {
                let image_info = [vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                }];
                let descriptor_write = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_info);
                unsafe {
                    self.device
                        .update_descriptor_sets(&[descriptor_write.build()], &[]);
                }
            }
            DescriptorWrite::UniformBufferDynamic {
                set,
                binding,
                buffer,
                range,
            } => {
                let buffer_info = [vk::DescriptorBufferInfo {
                    buffer,
                    offset: 0,
                    range,
                }];
                let descriptor_write = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(binding)
                    .dst_array_element(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                    .buffer_info(&buffer_info);
                unsafe {
                    self.device
                        .update_descriptor_sets(&[descriptor_write.build()], &[]);
                }
            }
        }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}
