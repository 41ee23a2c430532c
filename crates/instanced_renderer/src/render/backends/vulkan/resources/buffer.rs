//! Buffer management for vertex and index data
//!
//! Resident geometry lives in device-local memory and is filled once through
//! a host-visible staging buffer. Every upload blocks until the transfer has
//! completed on the queue.

use ash::vk;
use log::trace;

use crate::render::backends::vulkan::device::{
    copy_to_mapped, AllocatedBuffer, BufferDesc, GpuDevice, TransferCommand,
};
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Write bytes to the start of a host-visible buffer
///
/// Maps the whole allocation, copies, optionally flushes the mapped range and
/// unmaps. The flush is required for memory that was not allocated
/// host-coherent.
pub fn write_data(
    device: &dyn GpuDevice,
    buffer: &AllocatedBuffer,
    bytes: &[u8],
    flush: bool,
) -> VulkanResult<()> {
    if bytes.len() as u64 > buffer.size {
        return Err(VulkanError::CapacityExceeded {
            capacity: buffer.size as usize,
            requested: bytes.len(),
        });
    }

    let mapped = device.map_memory(buffer.memory, 0, buffer.size)?;
    copy_to_mapped(mapped, 0, bytes);

    let flushed = if flush {
        device.flush_mapped_range(buffer.memory, 0, vk::WHOLE_SIZE)
    } else {
        Ok(())
    };
    device.unmap_memory(buffer.memory);
    flushed
}

/// Device-local buffer filled once through a staging copy
#[derive(Debug)]
pub struct DeviceLocalBuffer {
    allocation: AllocatedBuffer,
    element_count: u32,
}

impl DeviceLocalBuffer {
    /// Upload `data` into a new device-local buffer with the given usage
    ///
    /// 1. copy the bytes into a host-visible, host-coherent staging buffer
    /// 2. create the device-local destination
    /// 3. record a staging -> destination copy, submit and wait
    /// 4. destroy the staging buffer
    ///
    /// The staging buffer is released on every path; the destination only
    /// survives on success.
    pub fn upload<T: bytemuck::Pod>(
        device: &dyn GpuDevice,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Self> {
        let element_count = u32::try_from(data.len()).map_err(|_| VulkanError::BufferCreate {
            reason: format!("{} elements exceed the u32 element range", data.len()),
        })?;
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.is_empty() {
            return Err(VulkanError::BufferCreate {
                reason: "refusing to create a zero-sized buffer".to_string(),
            });
        }
        let size = bytes.len() as vk::DeviceSize;

        let staging = device.create_buffer(&BufferDesc::staging(size))?;
        let result = Self::copy_from_staging(device, &staging, bytes, usage);
        device.destroy_buffer(staging);

        let allocation = result?;
        trace!("Uploaded {} bytes to device-local buffer {:?}", size, allocation.buffer);

        Ok(Self {
            allocation,
            element_count,
        })
    }

    fn copy_from_staging(
        device: &dyn GpuDevice,
        staging: &AllocatedBuffer,
        bytes: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<AllocatedBuffer> {
        write_data(device, staging, bytes, false)?;

        let destination = device.create_buffer(&BufferDesc::device_local(staging.size, usage))?;
        let copy = TransferCommand::CopyBuffer {
            src: staging.buffer,
            dst: destination.buffer,
            size: staging.size,
        };
        if let Err(e) = device.execute_one_time(&[copy]) {
            device.destroy_buffer(destination);
            return Err(e);
        }
        Ok(destination)
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.allocation.buffer
    }

    /// Get size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.allocation.size
    }

    /// Number of elements uploaded
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    /// Free the buffer and its memory
    pub fn destroy(self, device: &dyn GpuDevice) {
        device.destroy_buffer(self.allocation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::testing::{DeviceCall, RecordingDevice};

    #[test]
    fn test_upload_follows_staging_protocol() {
        let device = RecordingDevice::new(256);
        let indices: [u32; 6] = [0, 1, 2, 2, 3, 0];

        let uploaded = DeviceLocalBuffer::upload(&device, &indices, vk::BufferUsageFlags::INDEX_BUFFER)
            .unwrap();

        let calls = device.calls();
        let staging = match &calls[0] {
            DeviceCall::CreateBuffer { buffer, desc } => {
                assert!(desc.memory_properties.contains(
                    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
                ));
                assert!(desc.usage.contains(vk::BufferUsageFlags::TRANSFER_SRC));
                assert_eq!(desc.sharing_mode, vk::SharingMode::EXCLUSIVE);
                *buffer
            }
            other => panic!("expected staging buffer creation, got {other:?}"),
        };
        assert!(matches!(calls[1], DeviceCall::Map(_)));
        assert!(matches!(calls[2], DeviceCall::Unmap(_)));
        match &calls[3] {
            DeviceCall::CreateBuffer { buffer, desc } => {
                assert_eq!(*buffer, uploaded.handle());
                assert_eq!(desc.memory_properties, vk::MemoryPropertyFlags::DEVICE_LOCAL);
                assert!(desc.usage.contains(vk::BufferUsageFlags::TRANSFER_DST));
                assert!(desc.usage.contains(vk::BufferUsageFlags::INDEX_BUFFER));
            }
            other => panic!("expected destination creation, got {other:?}"),
        }
        assert_eq!(
            calls[4],
            DeviceCall::Execute(vec![TransferCommand::CopyBuffer {
                src: staging,
                dst: uploaded.handle(),
                size: 24,
            }])
        );
        assert_eq!(calls[5], DeviceCall::DestroyBuffer(staging));
        assert_eq!(calls.len(), 6);

        assert_eq!(device.buffer_contents(uploaded.handle()), bytemuck::cast_slice::<u32, u8>(&indices));
        assert_eq!(uploaded.element_count(), 6);
        assert_eq!(device.live_buffers(), 1);
    }

    #[test]
    fn test_staging_buffer_is_released_when_destination_fails() {
        let device = RecordingDevice::new(256);
        device.fail_buffers_after(1);

        let err = DeviceLocalBuffer::upload(&device, &[1.0f32, 2.0], vk::BufferUsageFlags::VERTEX_BUFFER)
            .unwrap_err();

        assert!(matches!(err, VulkanError::BufferCreate { .. }));
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn test_empty_upload_is_rejected() {
        let device = RecordingDevice::new(256);
        let empty: [u32; 0] = [];
        let err = DeviceLocalBuffer::upload(&device, &empty, vk::BufferUsageFlags::INDEX_BUFFER)
            .unwrap_err();
        assert!(matches!(err, VulkanError::BufferCreate { .. }));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_element_count_beyond_u32_is_rejected() {
        let device = RecordingDevice::new(256);
        let mut huge: Vec<()> = Vec::new();
        // SAFETY: zero-sized elements need no storage or initialization
        unsafe { huge.set_len(u32::MAX as usize + 1) };
        let err = DeviceLocalBuffer::upload(&device, &huge, vk::BufferUsageFlags::INDEX_BUFFER)
            .unwrap_err();
        match err {
            VulkanError::BufferCreate { reason } => assert!(reason.contains("u32")),
            other => panic!("expected BufferCreate, got {other:?}"),
        }
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_write_data_flushes_before_unmap() {
        let device = RecordingDevice::new(256);
        let buffer = device.create_buffer(&BufferDesc::host_visible_uniform(8)).unwrap();
        device.clear_calls();

        write_data(&device, &buffer, &[1, 2, 3, 4], true).unwrap();

        let calls = device.calls();
        assert_eq!(calls[0], DeviceCall::Map(buffer.memory));
        assert_eq!(
            calls[1],
            DeviceCall::Flush { memory: buffer.memory, offset: 0, size: vk::WHOLE_SIZE }
        );
        assert_eq!(calls[2], DeviceCall::Unmap(buffer.memory));
        assert_eq!(device.buffer_contents(buffer.buffer), vec![1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn test_write_data_rejects_oversized_source() {
        let device = RecordingDevice::new(256);
        let buffer = device.create_buffer(&BufferDesc::staging(2)).unwrap();
        let err = write_data(&device, &buffer, &[0; 3], false).unwrap_err();
        assert!(matches!(err, VulkanError::CapacityExceeded { capacity: 2, requested: 3 }));
        assert!(!device.is_mapped(buffer.memory));
    }
}
