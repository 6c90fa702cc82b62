//! CloudScapes demo: upload a quad to the GPU and read it back
//!
//! Creates a headless device, uploads a vertex/index pair with a single
//! submission, then uploads the vertices again through dedicated device
//! memory. Every buffer is read back and compared; a mismatch fails the run.

use ash::vk;
use glam::{Vec2, Vec3};
use cloudscapes_core::{cloud_err, cloud_error, cloud_info, Config, Result, Vertex};
use cloudscapes_vulkan::{
    copy_buffer_for_readback, create_buffer, create_buffer_from_data,
    create_vertex_and_index_buffers_with_usage, download_buffer, print_validation_stats_report,
    AllocatedBuffer, GpuAllocator, RawBuffer, VulkanDevice,
};

const SOURCE: &str = "cloudscapes::demo";

fn quad() -> ([Vertex; 4], [u32; 6]) {
    let vertices = [
        Vertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec2::new(0.0, 0.0)),
        Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::new(0.0, 1.0, 0.0), Vec2::new(1.0, 0.0)),
        Vertex::new(Vec3::new(0.5, 0.5, 0.0), Vec3::new(0.0, 0.0, 1.0), Vec2::new(1.0, 1.0)),
        Vertex::new(Vec3::new(-0.5, 0.5, 0.0), Vec3::new(1.0, 1.0, 1.0), Vec2::new(0.0, 1.0)),
    ];
    (vertices, [0, 1, 2, 2, 3, 0])
}

/// Download `buffer` and compare it against `expected`
fn verify_download(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    allocator: &GpuAllocator,
    buffer: &AllocatedBuffer,
    expected: &[u8],
    label: &str,
) -> Result<()> {
    let downloaded = download_buffer(device, pool, allocator, buffer.buffer, buffer.size)?;
    if downloaded != expected {
        return Err(cloud_err!(BackendError, SOURCE,
            "{} buffer read back {} bytes that differ from the upload", label, downloaded.len()));
    }
    cloud_info!(SOURCE, "{} buffer: read back {} bytes, contents match", label, downloaded.len());
    Ok(())
}

/// Same check for a dedicated-memory buffer, through a host-visible copy
fn verify_raw_download(device: &VulkanDevice, pool: vk::CommandPool, buffer: &RawBuffer, expected: &[u8]) -> Result<()> {
    let readback = create_buffer(
        device,
        vk::BufferUsageFlags::TRANSFER_DST,
        buffer.size,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    let downloaded = copy_buffer_for_readback(device, pool, buffer.buffer, readback.buffer, buffer.size)
        .and_then(|_| readback.read(device, buffer.size));
    readback.destroy(device);

    if downloaded? != expected {
        return Err(cloud_err!(BackendError, SOURCE, "Raw buffer contents differ from the upload"));
    }
    Ok(())
}

fn run(device: &VulkanDevice, allocator: &GpuAllocator, pool: vk::CommandPool) -> Result<()> {
    let (vertices, indices) = quad();
    let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
    let index_bytes: &[u8] = bytemuck::cast_slice(&indices);

    let (vertex_buffer, index_buffer) = create_vertex_and_index_buffers_with_usage(
        device,
        pool,
        allocator,
        &vertices,
        &indices,
        vk::BufferUsageFlags::TRANSFER_SRC,
    )?;
    cloud_info!(SOURCE, "Quad uploaded: vertex buffer {} bytes, index buffer {} bytes",
        vertex_buffer.size, index_buffer.size);

    // Buffers are released before any verification error propagates
    let verified = verify_download(device, pool, allocator, &vertex_buffer, vertex_bytes, "Vertex")
        .and_then(|_| verify_download(device, pool, allocator, &index_buffer, index_bytes, "Index"));
    let released = allocator.destroy_buffer(vertex_buffer).and(allocator.destroy_buffer(index_buffer));
    verified?;
    released?;

    // Same upload through dedicated device memory
    let raw = create_buffer_from_data(
        device,
        pool,
        vertex_bytes,
        vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
    )?;
    cloud_info!(SOURCE, "Raw upload: {} bytes in memory type {} ({} bytes allocated)",
        raw.size, raw.memory_type_index, raw.allocation_size);
    let verified = verify_raw_download(device, pool, &raw, vertex_bytes);
    raw.destroy(device);
    verified?;

    cloud_info!(SOURCE, "Live allocations after cleanup: {}, dedicated memory blocks: {}",
        allocator.live_allocations(), device.live_device_memory());
    Ok(())
}

fn main() {
    let config = Config {
        app_name: "CloudScapes Demo".to_string(),
        enable_validation_stats: true,
        ..Config::default()
    };

    let device = match VulkanDevice::headless(&config) {
        Ok(device) => device,
        Err(e) => {
            cloud_error!(SOURCE, "Device creation failed: {}", e);
            std::process::exit(1);
        }
    };

    let result = GpuAllocator::new(&device).and_then(|allocator| {
        let pool = device.create_upload_command_pool()?;
        let result = run(&device, &allocator, pool);
        device.destroy_command_pool(pool);
        result
    });

    if config.enable_validation {
        print_validation_stats_report();
    }

    drop(device);

    if let Err(e) = result {
        cloud_error!(SOURCE, "Demo failed: {}", e);
        std::process::exit(1);
    }
}
