//! Host-memory implementations of the device and draw seams
//!
//! `RecordingDevice` backs every allocation with a `Vec<u8>`, performs buffer
//! copies on `execute_one_time` and logs each call so tests can check upload
//! ordering without a GPU.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use ash::vk::{self, Handle};

use crate::render::backends::vulkan::device::{
    AllocatedBuffer, AllocatedImage, BufferDesc, DescriptorWrite, GpuDevice, ImageDesc,
    SamplerDesc, TransferCommand,
};
use crate::render::backends::vulkan::rendering::DrawRecorder;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    CreateBuffer { buffer: vk::Buffer, desc: BufferDesc },
    DestroyBuffer(vk::Buffer),
    Map(vk::DeviceMemory),
    Flush { memory: vk::DeviceMemory, offset: vk::DeviceSize, size: vk::DeviceSize },
    Unmap(vk::DeviceMemory),
    CreateImage { image: vk::Image, desc: ImageDesc },
    DestroyImage(vk::Image),
    CreateImageView(vk::ImageView),
    DestroyImageView(vk::ImageView),
    CreateSampler(SamplerDesc),
    DestroySampler(vk::Sampler),
    Execute(Vec<TransferCommand>),
    CreateDescriptorSetLayout(usize),
    DestroyDescriptorSetLayout(vk::DescriptorSetLayout),
    CreateDescriptorPool(u32),
    DestroyDescriptorPool(vk::DescriptorPool),
    AllocateDescriptorSet(vk::DescriptorSet),
    FreeDescriptorSets(Vec<vk::DescriptorSet>),
    WriteDescriptor(DescriptorWrite),
}

pub struct RecordingDevice {
    alignment: vk::DeviceSize,
    calls: RefCell<Vec<DeviceCall>>,
    memory: RefCell<HashMap<u64, Vec<u8>>>,
    buffer_memory: RefCell<HashMap<u64, u64>>,
    mapped: RefCell<HashSet<u64>>,
    live_images: Cell<usize>,
    next_handle: Cell<u64>,
    fail_buffer_creation_after: Cell<Option<usize>>,
}

impl RecordingDevice {
    pub fn new(alignment: vk::DeviceSize) -> Self {
        Self {
            alignment,
            calls: RefCell::new(Vec::new()),
            memory: RefCell::new(HashMap::new()),
            buffer_memory: RefCell::new(HashMap::new()),
            mapped: RefCell::new(HashSet::new()),
            live_images: Cell::new(0),
            next_handle: Cell::new(1),
            fail_buffer_creation_after: Cell::new(None),
        }
    }

    /// Let `successes` more buffers be created, then fail every later one
    pub fn fail_buffers_after(&self, successes: usize) {
        self.fail_buffer_creation_after.set(Some(successes));
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Vec<u8> {
        let memory = self.buffer_memory.borrow()[&buffer.as_raw()];
        self.memory.borrow()[&memory].clone()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffer_memory.borrow().len()
    }

    pub fn live_images(&self) -> usize {
        self.live_images.get()
    }

    pub fn is_mapped(&self, memory: vk::DeviceMemory) -> bool {
        self.mapped.borrow().contains(&memory.as_raw())
    }

    fn next(&self) -> u64 {
        let handle = self.next_handle.get();
        self.next_handle.set(handle + 1);
        handle
    }

    fn log(&self, call: DeviceCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl GpuDevice for RecordingDevice {
    fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.alignment
    }

    fn create_buffer(&self, desc: &BufferDesc) -> VulkanResult<AllocatedBuffer> {
        if let Some(remaining) = self.fail_buffer_creation_after.get() {
            if remaining == 0 {
                return Err(VulkanError::BufferCreate {
                    reason: "ERROR_OUT_OF_DEVICE_MEMORY".to_string(),
                });
            }
            self.fail_buffer_creation_after.set(Some(remaining - 1));
        }

        let buffer = vk::Buffer::from_raw(self.next());
        let memory = vk::DeviceMemory::from_raw(self.next());
        self.memory
            .borrow_mut()
            .insert(memory.as_raw(), vec![0; desc.size as usize]);
        self.buffer_memory
            .borrow_mut()
            .insert(buffer.as_raw(), memory.as_raw());
        self.log(DeviceCall::CreateBuffer { buffer, desc: *desc });
        Ok(AllocatedBuffer {
            buffer,
            memory,
            size: desc.size,
        })
    }

    fn destroy_buffer(&self, buffer: AllocatedBuffer) {
        self.buffer_memory.borrow_mut().remove(&buffer.buffer.as_raw());
        self.memory.borrow_mut().remove(&buffer.memory.as_raw());
        self.log(DeviceCall::DestroyBuffer(buffer.buffer));
    }

    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VulkanResult<*mut u8> {
        let mut allocations = self.memory.borrow_mut();
        let bytes = allocations
            .get_mut(&memory.as_raw())
            .ok_or(VulkanError::Api(vk::Result::ERROR_MEMORY_MAP_FAILED))?;
        if size != vk::WHOLE_SIZE && offset + size > bytes.len() as u64 {
            return Err(VulkanError::Api(vk::Result::ERROR_MEMORY_MAP_FAILED));
        }
        assert!(
            self.mapped.borrow_mut().insert(memory.as_raw()),
            "memory mapped twice"
        );
        self.log(DeviceCall::Map(memory));
        // SAFETY: offset was bounds-checked against the allocation above
        Ok(unsafe { bytes.as_mut_ptr().add(offset as usize) })
    }

    fn flush_mapped_range(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> VulkanResult<()> {
        assert!(self.is_mapped(memory), "flush of unmapped memory");
        self.log(DeviceCall::Flush { memory, offset, size });
        Ok(())
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        assert!(
            self.mapped.borrow_mut().remove(&memory.as_raw()),
            "unmap of unmapped memory"
        );
        self.log(DeviceCall::Unmap(memory));
    }

    fn create_image(&self, desc: &ImageDesc) -> VulkanResult<AllocatedImage> {
        let image = vk::Image::from_raw(self.next());
        let memory = vk::DeviceMemory::from_raw(self.next());
        self.live_images.set(self.live_images.get() + 1);
        self.log(DeviceCall::CreateImage { image, desc: *desc });
        Ok(AllocatedImage {
            image,
            memory,
            extent: desc.extent,
            format: desc.format,
        })
    }

    fn destroy_image(&self, image: AllocatedImage) {
        self.live_images.set(self.live_images.get() - 1);
        self.log(DeviceCall::DestroyImage(image.image));
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> VulkanResult<vk::ImageView> {
        let view = vk::ImageView::from_raw(self.next());
        self.log(DeviceCall::CreateImageView(view));
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.log(DeviceCall::DestroyImageView(view));
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> VulkanResult<vk::Sampler> {
        self.log(DeviceCall::CreateSampler(*desc));
        Ok(vk::Sampler::from_raw(self.next()))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.log(DeviceCall::DestroySampler(sampler));
    }

    fn execute_one_time(&self, commands: &[TransferCommand]) -> VulkanResult<()> {
        for command in commands {
            if let TransferCommand::CopyBuffer { src, dst, size } = *command {
                let source = self.buffer_contents(src);
                let dst_memory = self.buffer_memory.borrow()[&dst.as_raw()];
                let mut allocations = self.memory.borrow_mut();
                let target = allocations
                    .get_mut(&dst_memory)
                    .ok_or(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))?;
                target[..size as usize].copy_from_slice(&source[..size as usize]);
            }
        }
        self.log(DeviceCall::Execute(commands.to_vec()));
        Ok(())
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        self.log(DeviceCall::CreateDescriptorSetLayout(bindings.len()));
        Ok(vk::DescriptorSetLayout::from_raw(self.next()))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.log(DeviceCall::DestroyDescriptorSetLayout(layout));
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        _pool_sizes: &[vk::DescriptorPoolSize],
    ) -> VulkanResult<vk::DescriptorPool> {
        self.log(DeviceCall::CreateDescriptorPool(max_sets));
        Ok(vk::DescriptorPool::from_raw(self.next()))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.log(DeviceCall::DestroyDescriptorPool(pool));
    }

    fn allocate_descriptor_set(
        &self,
        _pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet> {
        let set = vk::DescriptorSet::from_raw(self.next());
        self.log(DeviceCall::AllocateDescriptorSet(set));
        Ok(set)
    }

    fn free_descriptor_sets(&self, _pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) -> VulkanResult<()> {
        self.log(DeviceCall::FreeDescriptorSets(sets.to_vec()));
        Ok(())
    }

    fn write_descriptor(&self, write: &DescriptorWrite) {
        self.log(DeviceCall::WriteDescriptor(*write));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrawCall {
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    BindDescriptorSet { set_index: u32, set: vk::DescriptorSet, dynamic_offsets: Vec<u32> },
    DrawIndexed { index_count: u32, first_index: u32 },
}

#[derive(Default)]
pub struct RecordingRecorder {
    pub calls: Vec<DrawCall>,
}

impl RecordingRecorder {
    pub fn draw_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, DrawCall::DrawIndexed { .. }))
            .count()
    }
}

impl DrawRecorder for RecordingRecorder {
    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        self.calls.push(DrawCall::BindVertexBuffer(buffer));
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        self.calls.push(DrawCall::BindIndexBuffer(buffer));
    }

    fn bind_descriptor_set(&mut self, set_index: u32, set: vk::DescriptorSet, dynamic_offsets: &[u32]) {
        self.calls.push(DrawCall::BindDescriptorSet {
            set_index,
            set,
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }

    fn draw_indexed(&mut self, index_count: u32, first_index: u32) {
        self.calls.push(DrawCall::DrawIndexed {
            index_count,
            first_index,
        });
    }
}
