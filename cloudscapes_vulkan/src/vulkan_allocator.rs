//! GpuAllocator - explicitly owned general-purpose allocator
//!
//! Wraps `gpu_allocator::vulkan::Allocator` behind a mutex so a single
//! allocator can be shared by reference between upload calls. The lock is held
//! only for the allocate/free call itself.

use crate::vulkan_device::{DeviceContext, VulkanDevice};
use ash::vk;
use cloudscapes_core::{cloud_debug, cloud_err, cloud_error, Error, Result};
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocationError, MemoryLocation};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const SOURCE: &str = "cloudscapes::vulkan::allocator";

/// How an allocator-backed buffer will be accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryIntent {
    /// Host-visible, host-coherent and persistently mapped (staging uploads)
    CpuOnly,
    /// Device-local, not mappable
    GpuOnly,
    /// Host-visible memory written by the GPU and read back by the CPU
    Readback,
}

impl MemoryIntent {
    /// gpu-allocator location for this intent
    pub fn location(self) -> MemoryLocation {
        match self {
            MemoryIntent::CpuOnly => MemoryLocation::CpuToGpu,
            MemoryIntent::GpuOnly => MemoryLocation::GpuOnly,
            MemoryIntent::Readback => MemoryLocation::GpuToCpu,
        }
    }

    /// Whether allocations for this intent are mapped on the host
    pub fn is_host_visible(self) -> bool {
        !matches!(self, MemoryIntent::GpuOnly)
    }
}

/// Map a gpu-allocator failure to a CloudScapes error (logged)
pub(crate) fn allocation_error(error: AllocationError, name: &str, size: u64) -> Error {
    match error {
        AllocationError::OutOfMemory => {
            let size_mb = size as f64 / (1024.0 * 1024.0);
            cloud_error!(SOURCE, "Out of GPU memory for '{}' (required: {:.2} MB)", name, size_mb);
            Error::OutOfMemory
        }
        other => cloud_err!(AllocatorError, SOURCE, "Failed to allocate '{}' ({} bytes): {}", name, size, other),
    }
}

/// General-purpose GPU allocator
///
/// Keeps the device alive until the allocator itself is dropped. Every
/// allocation must be freed (through `destroy_buffer` or the staging guards)
/// before the allocator goes away.
pub struct GpuAllocator {
    // Declared before `ctx` so memory blocks are released before the device
    allocator: Mutex<Allocator>,
    live_allocations: AtomicUsize,
    ctx: Arc<DeviceContext>,
}

impl GpuAllocator {
    /// Create an allocator bound to `device`
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: device.instance().clone(),
            device: device.device().clone(),
            physical_device: device.physical_device(),
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| cloud_err!(InitializationFailed, SOURCE, "Failed to create GPU allocator: {:?}", e))?;

        cloud_debug!(SOURCE, "GPU allocator created");

        Ok(Self {
            allocator: Mutex::new(allocator),
            live_allocations: AtomicUsize::new(0),
            ctx: Arc::clone(&device.ctx),
        })
    }

    pub(crate) fn device(&self) -> &ash::Device {
        &self.ctx.device
    }

    /// Number of allocations handed out and not yet freed
    pub fn live_allocations(&self) -> usize {
        self.live_allocations.load(Ordering::SeqCst)
    }

    /// Allocate memory for a linear resource (buffer)
    pub(crate) fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        intent: MemoryIntent,
    ) -> Result<Allocation> {
        let mut allocator = self.allocator.lock()
            .map_err(|_| cloud_err!(AllocatorError, SOURCE, "GPU allocator lock poisoned"))?;

        let allocation = allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: intent.location(),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| allocation_error(e, name, requirements.size))?;

        self.live_allocations.fetch_add(1, Ordering::SeqCst);
        Ok(allocation)
    }

    /// Return an allocation to the allocator
    pub(crate) fn free(&self, allocation: Allocation) -> Result<()> {
        let mut allocator = self.allocator.lock()
            .map_err(|_| cloud_err!(AllocatorError, SOURCE, "GPU allocator lock poisoned"))?;

        allocator.free(allocation)
            .map_err(|e| cloud_err!(AllocatorError, SOURCE, "Failed to free allocation: {}", e))?;

        self.live_allocations.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
#[path = "vulkan_allocator_tests.rs"]
mod tests;
