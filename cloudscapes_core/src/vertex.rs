//! Default interleaved vertex layout

use glam::{Vec2, Vec3};
use bytemuck::{Pod, Zeroable};

/// Position, color and texture coordinate, tightly packed (32 bytes)
///
/// `Pod`, so a `&[Vertex]` can be handed to the upload helpers as raw bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    /// Byte stride between consecutive vertices
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    /// Byte offsets of (position, color, tex_coord)
    pub const OFFSETS: [u32; 3] = [0, 12, 24];

    pub fn new(position: Vec3, color: Vec3, tex_coord: Vec2) -> Self {
        Self { position, color, tex_coord }
    }
}

#[cfg(test)]
#[path = "vertex_tests.rs"]
mod tests;
