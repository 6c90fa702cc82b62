//! Buffer transfer integration tests
//!
//! All tests require a GPU and are marked with #[ignore].
//!
//! Run with: cargo test -p cloudscapes_vulkan --test buffer_transfer_tests -- --ignored


use ash::vk;
use cloudscapes_core::glam::{Vec2, Vec3};
use cloudscapes_core::Vertex;
use cloudscapes_vulkan::{
    copy_buffer_for_readback, create_allocated_buffer, create_allocated_buffer_from_data,
    create_buffer, create_buffer_from_data, create_device_memory, create_vertex_and_index_buffers,
    create_vertex_and_index_buffers_with_usage, download_buffer, free_device_memory, MemoryIntent,
    RawBuffer, VulkanDevice,
};
use gpu_test_utils::{get_test_gpu, pattern};
use serial_test::serial;

fn quad() -> ([Vertex; 4], [u32; 6]) {
    let vertices = [
        Vertex::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec2::new(0.0, 0.0)),
        Vertex::new(Vec3::new(0.5, -0.5, 0.0), Vec3::new(0.0, 1.0, 0.0), Vec2::new(1.0, 0.0)),
        Vertex::new(Vec3::new(0.5, 0.5, 0.0), Vec3::new(0.0, 0.0, 1.0), Vec2::new(1.0, 1.0)),
        Vertex::new(Vec3::new(-0.5, 0.5, 0.0), Vec3::new(1.0, 1.0, 1.0), Vec2::new(0.0, 1.0)),
    ];
    (vertices, [0, 1, 2, 2, 3, 0])
}

const HOST_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

fn host_buffer(device: &VulkanDevice, size: u64) -> RawBuffer {
    create_buffer(
        device,
        vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
        size,
        HOST_COHERENT,
    )
    .unwrap()
}

// ============================================================================
// RAW MEMORY PATH
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_create_buffer_allocation_satisfies_request() {
    let gpu = get_test_gpu();

    for properties in [vk::MemoryPropertyFlags::DEVICE_LOCAL, HOST_COHERENT] {
        let buffer = create_buffer(&gpu.device, vk::BufferUsageFlags::VERTEX_BUFFER, 1000, properties).unwrap();

        assert_eq!(buffer.size, 1000);
        assert!(buffer.allocation_size >= 1000);
        let memory_type = gpu.device.memory_properties().memory_types[buffer.memory_type_index as usize];
        assert!(memory_type.property_flags.contains(properties));

        buffer.destroy(&gpu.device);
    }
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_create_buffer_from_data_round_trip() {
    let gpu = get_test_gpu();

    for size in [1usize, 4096, 1000] {
        let data = pattern(size);
        let before = gpu.device.live_device_memory();
        let uploaded = create_buffer_from_data(
            &gpu.device,
            gpu.pool,
            &data,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
        )
        .unwrap();

        // Staging memory is already freed, only the destination remains
        assert_eq!(gpu.device.live_device_memory(), before + 1);

        let memory_type = gpu.device.memory_properties().memory_types[uploaded.memory_type_index as usize];
        assert!(memory_type.property_flags.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));

        let readback = host_buffer(&gpu.device, size as u64);
        copy_buffer_for_readback(&gpu.device, gpu.pool, uploaded.buffer, readback.buffer, size as u64).unwrap();
        assert_eq!(readback.read(&gpu.device, size as u64).unwrap(), data, "size {}", size);

        readback.destroy(&gpu.device);
        uploaded.destroy(&gpu.device);
        assert_eq!(gpu.device.live_device_memory(), before);
    }
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_copy_buffer_leaves_tail_untouched() {
    let gpu = get_test_gpu();

    let source = host_buffer(&gpu.device, 256);
    let destination = host_buffer(&gpu.device, 256);
    let data = pattern(256);
    source.write(&gpu.device, &data).unwrap();
    destination.write(&gpu.device, &[0xAB; 256]).unwrap();

    copy_buffer_for_readback(&gpu.device, gpu.pool, source.buffer, destination.buffer, 100).unwrap();

    let result = destination.read(&gpu.device, 256).unwrap();
    assert_eq!(&result[..100], &data[..100]);
    assert!(result[100..].iter().all(|&b| b == 0xAB));

    source.destroy(&gpu.device);
    destination.destroy(&gpu.device);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_create_device_memory() {
    let gpu = get_test_gpu();

    let before = gpu.device.live_device_memory();

    let memory = create_device_memory(&gpu.device, 4096, u32::MAX, HOST_COHERENT).unwrap();
    assert_eq!(memory.size, 4096);
    assert_eq!(gpu.device.live_device_memory(), before + 1);
    let memory_type = gpu.device.memory_properties().memory_types[memory.memory_type_index as usize];
    assert!(memory_type.property_flags.contains(HOST_COHERENT));

    free_device_memory(&gpu.device, memory);
    assert_eq!(gpu.device.live_device_memory(), before);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_create_device_memory_without_matching_type_fails() {
    let gpu = get_test_gpu();

    // No memory type is allowed by an empty mask
    let result = create_device_memory(&gpu.device, 4096, 0, vk::MemoryPropertyFlags::DEVICE_LOCAL);
    assert!(matches!(result, Err(cloudscapes_core::Error::ResourceCreationError(_))));
}

// ============================================================================
// ALLOCATOR PATH
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_allocated_buffer_intents() {
    let gpu = get_test_gpu();

    let gpu_only = create_allocated_buffer(&gpu.allocator, vk::BufferUsageFlags::STORAGE_BUFFER, 1000, MemoryIntent::GpuOnly).unwrap();
    assert!(gpu_only.allocation().size() >= 1000);
    assert!(gpu_only.memory_properties().contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));

    let cpu_only = create_allocated_buffer(&gpu.allocator, vk::BufferUsageFlags::TRANSFER_SRC, 1000, MemoryIntent::CpuOnly).unwrap();
    assert!(cpu_only.memory_properties().contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
    assert!(cpu_only.allocation().mapped_ptr().is_some());

    gpu.allocator.destroy_buffer(gpu_only).unwrap();
    gpu.allocator.destroy_buffer(cpu_only).unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_allocated_upload_round_trip_releases_staging() {
    let gpu = get_test_gpu();

    for size in [1usize, 4096, 1000] {
        let data = pattern(size);
        let before = gpu.allocator.live_allocations();

        let uploaded = create_allocated_buffer_from_data(
            &gpu.device,
            gpu.pool,
            &gpu.allocator,
            &data,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
        )
        .unwrap();

        // Only the destination buffer is still allocated
        assert_eq!(gpu.allocator.live_allocations(), before + 1);
        assert_eq!(uploaded.size, size as u64);

        let downloaded = download_buffer(&gpu.device, gpu.pool, &gpu.allocator, uploaded.buffer, size as u64).unwrap();
        assert_eq!(downloaded, data, "size {}", size);
        assert_eq!(gpu.allocator.live_allocations(), before + 1);

        gpu.allocator.destroy_buffer(uploaded).unwrap();
        assert_eq!(gpu.allocator.live_allocations(), before);
    }
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vertex_and_index_upload_releases_staging() {
    let gpu = get_test_gpu();
    let (vertices, indices) = quad();

    let before = gpu.allocator.live_allocations();
    let (vertex_buffer, index_buffer) =
        create_vertex_and_index_buffers(&gpu.device, gpu.pool, &gpu.allocator, &vertices, &indices).unwrap();

    assert_eq!(gpu.allocator.live_allocations(), before + 2);
    assert_eq!(vertex_buffer.size, 4 * Vertex::STRIDE as u64);
    assert_eq!(index_buffer.size, 6 * 4);
    assert!(vertex_buffer.memory_properties().contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
    assert!(index_buffer.memory_properties().contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));

    gpu.allocator.destroy_buffer(vertex_buffer).unwrap();
    gpu.allocator.destroy_buffer(index_buffer).unwrap();
    assert_eq!(gpu.allocator.live_allocations(), before);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vertex_and_index_upload_contents() {
    let gpu = get_test_gpu();
    let (vertices, indices) = quad();

    let (vertex_buffer, index_buffer) = create_vertex_and_index_buffers_with_usage(
        &gpu.device,
        gpu.pool,
        &gpu.allocator,
        &vertices,
        &indices,
        vk::BufferUsageFlags::TRANSFER_SRC,
    )
    .unwrap();

    let vertex_bytes = download_buffer(&gpu.device, gpu.pool, &gpu.allocator, vertex_buffer.buffer, vertex_buffer.size).unwrap();
    let index_bytes = download_buffer(&gpu.device, gpu.pool, &gpu.allocator, index_buffer.buffer, index_buffer.size).unwrap();
    assert_eq!(vertex_bytes.as_slice(), bytemuck::cast_slice::<Vertex, u8>(&vertices));
    assert_eq!(index_bytes.as_slice(), bytemuck::cast_slice::<u32, u8>(&indices));

    gpu.allocator.destroy_buffer(vertex_buffer).unwrap();
    gpu.allocator.destroy_buffer(index_buffer).unwrap();
}
