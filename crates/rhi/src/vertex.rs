//! Vertex format and vertex deduplication.
//!
//! # Overview
//!
//! [`MeshVertex`] is the single vertex format the renderer consumes:
//! position, color, and texture coordinates, 32 bytes per vertex. OBJ
//! loading produces one vertex per face corner; [`deduplicate`] collapses
//! corners with identical attribute bits into a shared indexed vertex.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Interleaved vertex: position, color, texture coordinates.
///
/// # Memory Layout
///
/// `#[repr(C)]`, matching the attribute descriptions:
/// - offset 0: position (12 bytes), location 0
/// - offset 12: color (12 bytes), location 1
/// - offset 24: tex_coord (8 bytes), location 2
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct MeshVertex {
    /// Object-space position.
    pub position: Vec3,
    /// Per-vertex color, multiplied into the sampled texel.
    pub color: Vec3,
    /// Texture coordinates with V pointing down (Vulkan convention).
    pub tex_coord: Vec2,
}

impl MeshVertex {
    /// Creates a vertex from its attributes.
    #[inline]
    pub const fn new(position: Vec3, color: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    /// Vertex input binding for binding 0, per-vertex rate.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute descriptions for the three shader input locations.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ]
    }

    /// Attribute bit pattern, the identity used for deduplication.
    fn bit_key(&self) -> [u32; 8] {
        [
            self.position.x.to_bits(),
            self.position.y.to_bits(),
            self.position.z.to_bits(),
            self.color.x.to_bits(),
            self.color.y.to_bits(),
            self.color.z.to_bits(),
            self.tex_coord.x.to_bits(),
            self.tex_coord.y.to_bits(),
        ]
    }
}

// Equality and hashing go through the bit pattern so vertices can key a
// HashMap; two corners count as the same vertex only when every attribute
// is bit-identical.
impl PartialEq for MeshVertex {
    fn eq(&self, other: &Self) -> bool {
        self.bit_key() == other.bit_key()
    }
}

impl Eq for MeshVertex {}

impl Hash for MeshVertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bit_key().hash(state);
    }
}

/// Collapses a flat triangle-list vertex stream into unique vertices plus
/// a `u32` index list.
///
/// Unique vertices keep their first-seen order, so the output is stable
/// for a given input.
pub fn deduplicate(vertices: &[MeshVertex]) -> (Vec<MeshVertex>, Vec<u32>) {
    let mut unique = Vec::new();
    let mut indices = Vec::with_capacity(vertices.len());
    let mut seen: HashMap<MeshVertex, u32> = HashMap::new();

    for &vertex in vertices {
        let index = *seen.entry(vertex).or_insert_with(|| {
            unique.push(vertex);
            (unique.len() - 1) as u32
        });
        indices.push(index);
    }

    (unique, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, u: f32) -> MeshVertex {
        MeshVertex::new(Vec3::new(x, 0.0, 0.0), Vec3::ONE, Vec2::new(u, 0.0))
    }

    #[test]
    fn vertex_is_32_bytes() {
        assert_eq!(std::mem::size_of::<MeshVertex>(), 32);
    }

    #[test]
    fn field_offsets_match_attribute_descriptions() {
        use std::mem::offset_of;

        assert_eq!(offset_of!(MeshVertex, position), 0);
        assert_eq!(offset_of!(MeshVertex, color), 12);
        assert_eq!(offset_of!(MeshVertex, tex_coord), 24);

        let attrs = MeshVertex::attribute_descriptions();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 12);
        assert_eq!(attrs[2].offset, 24);
        assert_eq!(attrs[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn binding_covers_whole_vertex() {
        let binding = MeshVertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn vertex_casts_to_bytes() {
        let v = vertex(1.0, 0.5);
        let bytes: &[u8] = bytemuck::bytes_of(&v);
        assert_eq!(bytes.len(), 32);

        let back: &MeshVertex = bytemuck::from_bytes(bytes);
        assert_eq!(*back, v);
    }

    #[test]
    fn identical_attributes_compare_equal() {
        assert_eq!(vertex(1.0, 0.5), vertex(1.0, 0.5));
        assert_ne!(vertex(1.0, 0.5), vertex(1.0, 0.25));
        assert_ne!(vertex(1.0, 0.5), vertex(2.0, 0.5));
    }

    #[test]
    fn deduplicate_collapses_shared_corners() {
        // Two triangles sharing an edge: 6 corners, 4 unique vertices.
        let a = vertex(0.0, 0.0);
        let b = vertex(1.0, 0.0);
        let c = vertex(0.0, 1.0);
        let d = vertex(1.0, 1.0);
        let stream = [a, b, c, b, d, c];

        let (unique, indices) = deduplicate(&stream);

        assert_eq!(unique, vec![a, b, c, d]);
        assert_eq!(indices, vec![0, 1, 2, 1, 3, 2]);
    }

    #[test]
    fn deduplicate_preserves_first_seen_order() {
        let stream = [vertex(2.0, 0.0), vertex(1.0, 0.0), vertex(2.0, 0.0)];
        let (unique, indices) = deduplicate(&stream);

        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0], vertex(2.0, 0.0));
        assert_eq!(unique[1], vertex(1.0, 0.0));
        assert_eq!(indices, vec![0, 1, 0]);
    }

    #[test]
    fn deduplicate_handles_empty_stream() {
        let (unique, indices) = deduplicate(&[]);
        assert!(unique.is_empty());
        assert!(indices.is_empty());
    }
}
