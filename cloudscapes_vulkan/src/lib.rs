/*!
# CloudScapes - Vulkan buffer transfer helpers

Creates GPU buffers, allocates their memory and uploads host data into
device-local memory through staging buffers.

Two flavours of every operation are provided:

- raw memory (`create_buffer`, `create_buffer_from_data`, ...): one dedicated
  `vkAllocateMemory` per buffer, memory type picked by `VulkanDevice`
- allocator-backed (`create_allocated_buffer`, ...): memory from a
  `GpuAllocator` built on the `gpu-allocator` crate

All uploads are synchronous: they return once the GPU has executed the copy.

```no_run
use cloudscapes_core::Config;
use cloudscapes_vulkan::{create_allocated_buffer_from_data, GpuAllocator, VulkanDevice};
use ash::vk;

# fn main() -> cloudscapes_core::Result<()> {
let device = VulkanDevice::headless(&Config::default())?;
let allocator = GpuAllocator::new(&device)?;
let pool = device.create_upload_command_pool()?;

let buffer = create_allocated_buffer_from_data(
    &device, pool, &allocator, &[1, 2, 3, 4], vk::BufferUsageFlags::VERTEX_BUFFER)?;

allocator.destroy_buffer(buffer)?;
device.destroy_command_pool(pool);
# Ok(())
# }
```
*/

mod vulkan_device;
mod vulkan_commands;
mod vulkan_allocator;
mod vulkan_buffer;
mod vulkan_allocated_buffer;
#[cfg(feature = "vulkan-validation")]
mod vulkan_debug;

pub use vulkan_device::{find_memory_type_index, VulkanDevice};
pub use vulkan_commands::{begin_single_time_commands, end_single_time_commands, record_single_time_commands};
pub use vulkan_allocator::{GpuAllocator, MemoryIntent};
pub use vulkan_buffer::{
    copy_buffer, copy_buffer_for_readback, create_buffer, create_buffer_from_data, create_device_memory, free_device_memory,
    DeviceMemory, RawBuffer,
};
pub use vulkan_allocated_buffer::{
    create_allocated_buffer, create_allocated_buffer_from_data, create_vertex_and_index_buffers,
    create_vertex_and_index_buffers_with_usage, download_buffer, AllocatedBuffer,
};

// Re-export debug utilities
#[cfg(feature = "vulkan-validation")]
pub use vulkan_debug::{get_validation_stats, print_validation_stats_report};
