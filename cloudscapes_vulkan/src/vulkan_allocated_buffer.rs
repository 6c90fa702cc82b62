//! Allocator-backed buffer helpers
//!
//! Same contracts as the raw-memory helpers, with memory-type selection and
//! pooling delegated to the `GpuAllocator`. Staging buffers are scoped guards
//! released on every exit path.

use crate::vulkan_allocator::{GpuAllocator, MemoryIntent};
use crate::vulkan_buffer::{copy_buffer, copy_buffer_for_readback};
use crate::vulkan_commands::record_single_time_commands;
use crate::vulkan_device::{raise_strict_validation_failure, VulkanDevice};
use ash::vk;
use bytemuck::Pod;
use cloudscapes_core::{cloud_debug, cloud_err, cloud_trace, Result};
use gpu_allocator::vulkan::Allocation;

const SOURCE: &str = "cloudscapes::vulkan::buffer";

/// Buffer backed by a `GpuAllocator` allocation
///
/// Release with `GpuAllocator::destroy_buffer`.
#[derive(Debug)]
pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub(crate) allocation: Allocation,
    /// Requested size in bytes
    pub size: u64,
}

impl AllocatedBuffer {
    pub fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    /// Property flags of the memory type backing this buffer
    pub fn memory_properties(&self) -> vk::MemoryPropertyFlags {
        self.allocation.memory_properties()
    }
}

impl GpuAllocator {
    /// Destroy an allocator-backed buffer and free its allocation
    pub fn destroy_buffer(&self, buffer: AllocatedBuffer) -> Result<()> {
        unsafe {
            self.device().destroy_buffer(buffer.buffer, None);
        }
        self.free(buffer.allocation)
    }
}

/// Create a buffer and bind a fresh allocation to it
fn create_bound_buffer(
    allocator: &GpuAllocator,
    name: &str,
    usage: vk::BufferUsageFlags,
    size: u64,
    intent: MemoryIntent,
) -> Result<(vk::Buffer, Allocation)> {
    let device = allocator.device();

    let create_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    unsafe {
        let buffer = device.create_buffer(&create_info, None)
            .map_err(|e| cloud_err!(ResourceCreationError, SOURCE,
                "Failed to create {} of size {} bytes: {:?}", name, size, e))?;

        let requirements = device.get_buffer_memory_requirements(buffer);

        let allocation = match allocator.allocate(name, requirements, intent) {
            Ok(allocation) => allocation,
            Err(e) => {
                device.destroy_buffer(buffer, None);
                return Err(e);
            }
        };

        if let Err(e) = device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
            device.destroy_buffer(buffer, None);
            allocator.free(allocation).ok();
            return Err(cloud_err!(ResourceCreationError, SOURCE, "Failed to bind {} memory: {:?}", name, e));
        }
        raise_strict_validation_failure();

        Ok((buffer, allocation))
    }
}

/// Host-visible buffer living for the duration of one transfer
struct StagingBuffer<'a> {
    allocator: &'a GpuAllocator,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
}

impl<'a> StagingBuffer<'a> {
    fn new(
        allocator: &'a GpuAllocator,
        usage: vk::BufferUsageFlags,
        size: u64,
        intent: MemoryIntent,
    ) -> Result<Self> {
        let (buffer, allocation) = create_bound_buffer(allocator, "staging_buffer", usage, size, intent)?;
        Ok(Self { allocator, buffer, allocation: Some(allocation), size })
    }

    /// Upload staging buffer holding a copy of `data`
    fn with_data(allocator: &'a GpuAllocator, data: &[u8]) -> Result<Self> {
        let mut staging = Self::new(allocator, vk::BufferUsageFlags::TRANSFER_SRC, data.len() as u64, MemoryIntent::CpuOnly)?;

        let mapped = staging.allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or_else(|| cloud_err!(BackendError, SOURCE, "Staging buffer is not mapped"))?;
        mapped[..data.len()].copy_from_slice(data);

        Ok(staging)
    }

    fn read(&self) -> Result<Vec<u8>> {
        let mapped = self.allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_slice())
            .ok_or_else(|| cloud_err!(BackendError, SOURCE, "Readback buffer is not mapped"))?;
        Ok(mapped[..self.size as usize].to_vec())
    }
}

impl Drop for StagingBuffer<'_> {
    fn drop(&mut self) {
        unsafe {
            self.allocator.device().destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.allocator.free(allocation).ok();
        }
    }
}

/// Create a buffer of `size` bytes whose memory matches `intent`
pub fn create_allocated_buffer(
    allocator: &GpuAllocator,
    usage: vk::BufferUsageFlags,
    size: u64,
    intent: MemoryIntent,
) -> Result<AllocatedBuffer> {
    let (buffer, allocation) = create_bound_buffer(allocator, "buffer", usage, size, intent)?;
    cloud_trace!(SOURCE, "Created allocated buffer {:?}: {} bytes ({:?})", buffer, size, intent);
    Ok(AllocatedBuffer { buffer, allocation, size })
}

/// Upload `data` into a new GPU-only buffer through a CPU-only staging buffer
///
/// `TRANSFER_DST` is added to `usage`.
pub fn create_allocated_buffer_from_data(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    allocator: &GpuAllocator,
    data: &[u8],
    usage: vk::BufferUsageFlags,
) -> Result<AllocatedBuffer> {
    upload_allocated_through_staging(device, pool, allocator, data, usage, copy_buffer)
}

/// Staged allocator upload with the copy step supplied by the caller
pub(crate) fn upload_allocated_through_staging<C>(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    allocator: &GpuAllocator,
    data: &[u8],
    usage: vk::BufferUsageFlags,
    copy: C,
) -> Result<AllocatedBuffer>
where
    C: FnOnce(&VulkanDevice, vk::CommandPool, vk::Buffer, vk::Buffer, u64) -> Result<()>,
{
    let size = data.len() as u64;
    let staging = StagingBuffer::with_data(allocator, data)?;

    let destination = create_allocated_buffer(
        allocator,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        size,
        MemoryIntent::GpuOnly,
    )?;

    if let Err(e) = copy(device, pool, staging.buffer, destination.buffer, size) {
        allocator.destroy_buffer(destination).ok();
        return Err(e);
    }

    Ok(destination)
}

/// Upload a vertex buffer and a `u32` index buffer with a single submission
///
/// Returns `(vertex_buffer, index_buffer)`, both GPU-only. Both staging
/// buffers are released before returning.
pub fn create_vertex_and_index_buffers<V: Pod>(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    allocator: &GpuAllocator,
    vertices: &[V],
    indices: &[u32],
) -> Result<(AllocatedBuffer, AllocatedBuffer)> {
    create_vertex_and_index_buffers_with_usage(device, pool, allocator, vertices, indices, vk::BufferUsageFlags::empty())
}

/// Same as `create_vertex_and_index_buffers`, with `extra_usage` added to both
/// buffers (e.g. `TRANSFER_SRC` to read them back)
pub fn create_vertex_and_index_buffers_with_usage<V: Pod>(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    allocator: &GpuAllocator,
    vertices: &[V],
    indices: &[u32],
    extra_usage: vk::BufferUsageFlags,
) -> Result<(AllocatedBuffer, AllocatedBuffer)> {
    let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(indices);

    let vertex_staging = StagingBuffer::with_data(allocator, vertex_bytes)?;
    let index_staging = StagingBuffer::with_data(allocator, index_bytes)?;

    let vertex_buffer = create_allocated_buffer(
        allocator,
        vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST | extra_usage,
        vertex_staging.size,
        MemoryIntent::GpuOnly,
    )?;

    let index_buffer = match create_allocated_buffer(
        allocator,
        vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST | extra_usage,
        index_staging.size,
        MemoryIntent::GpuOnly,
    ) {
        Ok(buffer) => buffer,
        Err(e) => {
            allocator.destroy_buffer(vertex_buffer).ok();
            return Err(e);
        }
    };

    let copies = record_single_time_commands(device, pool, |ash_device, command_buffer| {
        unsafe {
            let vertex_region = vk::BufferCopy::default().size(vertex_staging.size);
            ash_device.cmd_copy_buffer(command_buffer, vertex_staging.buffer, vertex_buffer.buffer, &[vertex_region]);

            let index_region = vk::BufferCopy::default().size(index_staging.size);
            ash_device.cmd_copy_buffer(command_buffer, index_staging.buffer, index_buffer.buffer, &[index_region]);
        }
        Ok(())
    });

    if let Err(e) = copies {
        allocator.destroy_buffer(vertex_buffer).ok();
        allocator.destroy_buffer(index_buffer).ok();
        return Err(e);
    }

    cloud_debug!(SOURCE, "Uploaded {} vertices ({} bytes) and {} indices ({} bytes)",
        vertices.len(), vertex_bytes.len(), indices.len(), index_bytes.len());

    Ok((vertex_buffer, index_buffer))
}

/// Read back the first `size` bytes of `source`
///
/// `source` must have been created with `TRANSFER_SRC` usage.
pub fn download_buffer(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    allocator: &GpuAllocator,
    source: vk::Buffer,
    size: u64,
) -> Result<Vec<u8>> {
    let readback = StagingBuffer::new(allocator, vk::BufferUsageFlags::TRANSFER_DST, size, MemoryIntent::Readback)?;
    copy_buffer_for_readback(device, pool, source, readback.buffer, size)?;
    readback.read()
}

#[cfg(test)]
#[path = "vulkan_allocated_buffer_tests.rs"]
mod tests;
