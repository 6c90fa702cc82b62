//! One-shot command buffers for transfer work
//!
//! A single-time command buffer is allocated from the caller's pool, recorded
//! with ONE_TIME_SUBMIT, submitted to the graphics queue and waited on with a
//! fence. It is freed back to the pool on every path, including failures.

use crate::vulkan_device::{raise_strict_validation_failure, VulkanDevice};
use ash::vk;
use cloudscapes_core::{cloud_err, cloud_trace, Result};

const SOURCE: &str = "cloudscapes::vulkan::commands";

/// Allocate a primary command buffer from `pool` and begin recording
pub fn begin_single_time_commands(device: &VulkanDevice, pool: vk::CommandPool) -> Result<vk::CommandBuffer> {
    let ash_device = device.device();

    let allocate_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    unsafe {
        let command_buffers = ash_device.allocate_command_buffers(&allocate_info)
            .map_err(|e| cloud_err!(BackendError, SOURCE, "Failed to allocate transfer command buffer: {:?}", e))?;
        let command_buffer = command_buffers[0];

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        if let Err(e) = ash_device.begin_command_buffer(command_buffer, &begin_info) {
            ash_device.free_command_buffers(pool, &[command_buffer]);
            return Err(cloud_err!(BackendError, SOURCE, "Failed to begin transfer command buffer: {:?}", e));
        }

        Ok(command_buffer)
    }
}

/// End recording, submit, block until the GPU has executed the commands and
/// free the command buffer
///
/// The command buffer is returned to `pool` whether or not submission succeeds.
pub fn end_single_time_commands(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
) -> Result<()> {
    let ash_device = device.device();
    let result = unsafe { submit_and_wait(device, command_buffer) };

    unsafe {
        ash_device.free_command_buffers(pool, &[command_buffer]);
    }
    raise_strict_validation_failure();

    result
}

unsafe fn submit_and_wait(device: &VulkanDevice, command_buffer: vk::CommandBuffer) -> Result<()> {
    let ash_device = device.device();

    ash_device.end_command_buffer(command_buffer)
        .map_err(|e| cloud_err!(BackendError, SOURCE, "Failed to end transfer command buffer: {:?}", e))?;

    let fence = ash_device.create_fence(&vk::FenceCreateInfo::default(), None)
        .map_err(|e| cloud_err!(BackendError, SOURCE, "Failed to create transfer fence: {:?}", e))?;

    let command_buffers = [command_buffer];
    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

    let result = device.submit(&[submit_info], fence).and_then(|_| {
        ash_device.wait_for_fences(&[fence], true, u64::MAX)
            .map_err(|e| cloud_err!(BackendError, SOURCE, "Failed to wait for transfer fence: {:?}", e))
    });

    ash_device.destroy_fence(fence, None);
    if result.is_ok() {
        cloud_trace!(SOURCE, "Transfer command buffer {:?} completed", command_buffer);
    }

    result
}

/// Record `record` into a single-time command buffer, submit it and wait
///
/// If `record` fails, nothing is submitted and the command buffer is freed.
pub fn record_single_time_commands<F>(device: &VulkanDevice, pool: vk::CommandPool, record: F) -> Result<()>
where
    F: FnOnce(&ash::Device, vk::CommandBuffer) -> Result<()>,
{
    let command_buffer = begin_single_time_commands(device, pool)?;

    if let Err(e) = record(device.device(), command_buffer) {
        unsafe {
            device.device().free_command_buffers(pool, &[command_buffer]);
        }
        return Err(e);
    }

    end_single_time_commands(device, pool, command_buffer)
}
