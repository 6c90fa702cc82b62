//! Raw-memory buffer helpers
//!
//! Buffers created here own a dedicated `vkAllocateMemory` allocation, bound at
//! offset 0. Handles are plain values; callers release them with
//! `RawBuffer::destroy` / `free_device_memory`.

use crate::vulkan_commands::record_single_time_commands;
use crate::vulkan_device::{raise_strict_validation_failure, VulkanDevice};
use ash::vk;
use cloudscapes_core::{cloud_err, cloud_trace, Result};

const SOURCE: &str = "cloudscapes::vulkan::buffer";

/// Device memory allocated without a buffer
#[derive(Debug)]
pub struct DeviceMemory {
    pub memory: vk::DeviceMemory,
    /// Allocation size in bytes
    pub size: u64,
    pub memory_type_index: u32,
}

/// Buffer with its own bound device memory
#[derive(Debug)]
pub struct RawBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    /// Requested size in bytes
    pub size: u64,
    /// Size of the backing allocation (driver requirement, >= `size`)
    pub allocation_size: u64,
    pub memory_type_index: u32,
}

impl RawBuffer {
    /// Destroy the buffer and free its memory
    pub fn destroy(self, device: &VulkanDevice) {
        destroy_handles(device, self.buffer, self.memory);
    }

    /// Copy `data` to the start of the buffer through a host mapping
    ///
    /// The buffer memory must be HOST_VISIBLE | HOST_COHERENT.
    pub fn write(&self, device: &VulkanDevice, data: &[u8]) -> Result<()> {
        let len = data.len() as u64;
        if len > self.size {
            return Err(cloud_err!(BackendError, SOURCE,
                "Write of {} bytes exceeds buffer size {}", len, self.size));
        }

        unsafe {
            let ptr = device.device()
                .map_memory(self.memory, 0, len, vk::MemoryMapFlags::empty())
                .map_err(|e| cloud_err!(BackendError, SOURCE, "Failed to map buffer memory: {:?}", e))?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr as *mut u8, data.len());
            device.device().unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Read the first `len` bytes of the buffer through a host mapping
    ///
    /// GPU writes are only visible here after a host memory dependency, such
    /// as the one recorded by `copy_buffer_for_readback`.
    pub fn read(&self, device: &VulkanDevice, len: u64) -> Result<Vec<u8>> {
        if len > self.size {
            return Err(cloud_err!(BackendError, SOURCE,
                "Read of {} bytes exceeds buffer size {}", len, self.size));
        }

        let mut out = vec![0u8; len as usize];
        unsafe {
            let ptr = device.device()
                .map_memory(self.memory, 0, len, vk::MemoryMapFlags::empty())
                .map_err(|e| cloud_err!(BackendError, SOURCE, "Failed to map buffer memory: {:?}", e))?;
            std::ptr::copy_nonoverlapping(ptr as *const u8, out.as_mut_ptr(), out.len());
            device.device().unmap_memory(self.memory);
        }
        Ok(out)
    }
}

fn destroy_handles(device: &VulkanDevice, buffer: vk::Buffer, memory: vk::DeviceMemory) {
    unsafe {
        device.device().destroy_buffer(buffer, None);
        device.device().free_memory(memory, None);
    }
    device.track_memory_freed();
}

/// Host-visible staging buffer released when the upload scope ends
struct StagingGuard<'a> {
    device: &'a VulkanDevice,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
}

impl Drop for StagingGuard<'_> {
    fn drop(&mut self) {
        destroy_handles(self.device, self.buffer, self.memory);
    }
}

/// Allocate `size` bytes of device memory from the lowest memory type allowed
/// by `type_bits` that has all of `properties`
pub fn create_device_memory(
    device: &VulkanDevice,
    size: u64,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<DeviceMemory> {
    let memory_type_index = device.memory_type_index(type_bits, properties)?;

    let allocate_info = vk::MemoryAllocateInfo::default()
        .allocation_size(size)
        .memory_type_index(memory_type_index);

    let memory = unsafe {
        device.device().allocate_memory(&allocate_info, None)
            .map_err(|e| cloud_err!(ResourceCreationError, SOURCE,
                "Failed to allocate {} bytes of device memory (type {}): {:?}", size, memory_type_index, e))?
    };
    device.track_memory_allocated();

    Ok(DeviceMemory { memory, size, memory_type_index })
}

/// Free memory returned by `create_device_memory`
pub fn free_device_memory(device: &VulkanDevice, memory: DeviceMemory) {
    unsafe {
        device.device().free_memory(memory.memory, None);
    }
    device.track_memory_freed();
}

/// Create an exclusive buffer of `size` bytes with memory satisfying
/// `properties`, bound at offset 0
///
/// # Errors
///
/// `ResourceCreationError` if buffer creation, memory type selection, memory
/// allocation or binding fails. Nothing is leaked on failure.
pub fn create_buffer(
    device: &VulkanDevice,
    usage: vk::BufferUsageFlags,
    size: u64,
    properties: vk::MemoryPropertyFlags,
) -> Result<RawBuffer> {
    let ash_device = device.device();

    let create_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    unsafe {
        let buffer = ash_device.create_buffer(&create_info, None)
            .map_err(|e| cloud_err!(ResourceCreationError, SOURCE,
                "Failed to create buffer of size {} bytes: {:?}", size, e))?;

        let requirements = ash_device.get_buffer_memory_requirements(buffer);

        let memory = match create_device_memory(device, requirements.size, requirements.memory_type_bits, properties) {
            Ok(memory) => memory,
            Err(e) => {
                ash_device.destroy_buffer(buffer, None);
                return Err(e);
            }
        };

        if let Err(e) = ash_device.bind_buffer_memory(buffer, memory.memory, 0) {
            destroy_handles(device, buffer, memory.memory);
            return Err(cloud_err!(ResourceCreationError, SOURCE, "Failed to bind buffer memory: {:?}", e));
        }
        raise_strict_validation_failure();

        cloud_trace!(SOURCE, "Created buffer {:?}: {} bytes ({} allocated, memory type {}, usage {:?})",
            buffer, size, memory.size, memory.memory_type_index, usage);

        Ok(RawBuffer {
            buffer,
            memory: memory.memory,
            size,
            allocation_size: memory.size,
            memory_type_index: memory.memory_type_index,
        })
    }
}

/// Copy `size` bytes from offset 0 of `source` to offset 0 of `destination`
///
/// Blocks until the copy has executed.
pub fn copy_buffer(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    source: vk::Buffer,
    destination: vk::Buffer,
    size: u64,
) -> Result<()> {
    record_single_time_commands(device, pool, |ash_device, command_buffer| {
        let region = vk::BufferCopy::default()
            .src_offset(0)
            .dst_offset(0)
            .size(size);
        unsafe {
            ash_device.cmd_copy_buffer(command_buffer, source, destination, &[region]);
        }
        Ok(())
    })
}

/// Copy `size` bytes like `copy_buffer`, then make the transfer writes
/// visible to host reads of `destination`
///
/// Use this when `destination` is mapped and read on the CPU afterwards.
pub fn copy_buffer_for_readback(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    source: vk::Buffer,
    destination: vk::Buffer,
    size: u64,
) -> Result<()> {
    record_single_time_commands(device, pool, |ash_device, command_buffer| {
        let region = vk::BufferCopy::default().size(size);
        let barrier = vk::MemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::HOST_READ);
        unsafe {
            ash_device.cmd_copy_buffer(command_buffer, source, destination, &[region]);
            ash_device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::HOST,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            );
        }
        Ok(())
    })
}

/// Upload `data` into a new device-local buffer through a staging buffer
///
/// `TRANSFER_DST` is added to `usage`. The staging buffer is destroyed before
/// returning, on success and on failure.
pub fn create_buffer_from_data(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    data: &[u8],
    usage: vk::BufferUsageFlags,
) -> Result<RawBuffer> {
    upload_through_staging(device, pool, data, usage, copy_buffer)
}

/// Staged upload with the copy step supplied by the caller
pub(crate) fn upload_through_staging<C>(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    data: &[u8],
    usage: vk::BufferUsageFlags,
    copy: C,
) -> Result<RawBuffer>
where
    C: FnOnce(&VulkanDevice, vk::CommandPool, vk::Buffer, vk::Buffer, u64) -> Result<()>,
{
    let size = data.len() as u64;

    let staging = create_buffer(
        device,
        vk::BufferUsageFlags::TRANSFER_SRC,
        size,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    let guard = StagingGuard { device, buffer: staging.buffer, memory: staging.memory };
    staging.write(device, data)?;

    let destination = create_buffer(
        device,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        size,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;

    if let Err(e) = copy(device, pool, guard.buffer, destination.buffer, size) {
        destination.destroy(device);
        return Err(e);
    }

    Ok(destination)
}

#[cfg(test)]
#[path = "vulkan_buffer_tests.rs"]
mod tests;
