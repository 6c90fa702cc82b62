use crate::vertex::Vertex;
use glam::{Vec2, Vec3};

#[test]
fn test_vertex_stride() {
    assert_eq!(Vertex::STRIDE, 32);
    assert_eq!(std::mem::size_of::<Vertex>(), 32);
}

#[test]
fn test_vertex_offsets_match_layout() {
    assert_eq!(std::mem::offset_of!(Vertex, position) as u32, Vertex::OFFSETS[0]);
    assert_eq!(std::mem::offset_of!(Vertex, color) as u32, Vertex::OFFSETS[1]);
    assert_eq!(std::mem::offset_of!(Vertex, tex_coord) as u32, Vertex::OFFSETS[2]);
}

#[test]
fn test_vertex_bytes() {
    let vertices = [
        Vertex::new(Vec3::new(1.0, 2.0, 3.0), Vec3::ONE, Vec2::ZERO),
        Vertex::new(Vec3::ZERO, Vec3::X, Vec2::ONE),
    ];
    let bytes: &[u8] = bytemuck::cast_slice(&vertices);
    assert_eq!(bytes.len(), 64);
    assert_eq!(&bytes[0..4], &1.0f32.to_ne_bytes());
    assert_eq!(&bytes[56..60], &1.0f32.to_ne_bytes());
}
