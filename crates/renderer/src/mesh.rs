//! GPU mesh upload.
//!
//! Takes the flat per-corner arrays produced by the OBJ loader, interleaves
//! them into [`MeshVertex`] form, collapses duplicate vertices and uploads
//! the result into device-local vertex and index buffers through a staging
//! copy.

use std::sync::Arc;

use glam::Vec3;
use tracing::info;

use aster_resources::MeshData;
use aster_rhi::RhiResult;
use aster_rhi::buffer::{Buffer, BufferUsage};
use aster_rhi::command::{CommandPool, submit_one_time};
use aster_rhi::device::Device;
use aster_rhi::vertex::{MeshVertex, deduplicate};
use aster_rhi::vk;

/// Vertex and index buffers for a single mesh, ready to bind.
pub struct MeshBuffers {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl MeshBuffers {
    /// Uploads `data` to the GPU.
    ///
    /// Corners with identical position and texture coordinate collapse to a
    /// single vertex buffer entry; the index buffer reconstructs the
    /// original triangle list over the collapsed vertices.
    pub fn upload(device: Arc<Device>, pool: &CommandPool, data: &MeshData) -> RhiResult<Self> {
        let (vertices, indices) = deduplicate(&interleave(data));

        info!(
            "Mesh upload: {} corners -> {} unique vertices, {} indices",
            data.corner_count(),
            vertices.len(),
            indices.len()
        );

        let vertex_buffer = upload_device_local(
            &device,
            pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&vertices),
        )?;
        let index_buffer = upload_device_local(
            &device,
            pool,
            BufferUsage::Index,
            bytemuck::cast_slice(&indices),
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }

    /// Returns the device-local vertex buffer.
    #[inline]
    pub fn vertex_buffer(&self) -> &Buffer {
        &self.vertex_buffer
    }

    /// Returns the device-local index buffer (u32 indices).
    #[inline]
    pub fn index_buffer(&self) -> &Buffer {
        &self.index_buffer
    }

    /// Returns the number of indices to draw.
    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Interleaves the loader's parallel arrays into vertex structs.
///
/// Vertex color is fixed white; the fragment shader multiplies it with the
/// sampled texel, so white passes the texture through unchanged.
fn interleave(data: &MeshData) -> Vec<MeshVertex> {
    data.positions
        .iter()
        .zip(&data.tex_coords)
        .map(|(&position, &tex_coord)| MeshVertex::new(position, Vec3::ONE, tex_coord))
        .collect()
}

/// Creates a device-local buffer and fills it through a staging buffer.
fn upload_device_local(
    device: &Arc<Device>,
    pool: &CommandPool,
    usage: BufferUsage,
    bytes: &[u8],
) -> RhiResult<Buffer> {
    let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, bytes)?;
    let buffer = Buffer::new(device.clone(), usage, bytes.len() as vk::DeviceSize)?;

    submit_one_time(device, pool, |cmd| {
        let region = vk::BufferCopy::default().size(bytes.len() as vk::DeviceSize);
        cmd.copy_buffer(staging.handle(), buffer.handle(), &[region]);
        Ok(())
    })?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn quad_with_shared_corners() -> MeshData {
        // Two triangles of a quad; corners 0 and 2 appear in both.
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(1.0, 0.0, 0.0);
        let c = Vec3::new(1.0, 1.0, 0.0);
        let d = Vec3::new(0.0, 1.0, 0.0);
        let uv = |v: Vec3| Vec2::new(v.x, v.y);

        MeshData {
            positions: vec![a, b, c, a, c, d],
            tex_coords: vec![uv(a), uv(b), uv(c), uv(a), uv(c), uv(d)],
        }
    }

    #[test]
    fn test_interleave_assigns_white_color() {
        let data = quad_with_shared_corners();
        let vertices = interleave(&data);

        assert_eq!(vertices.len(), 6);
        for vertex in &vertices {
            assert_eq!(vertex.color, Vec3::ONE);
        }
    }

    #[test]
    fn test_interleave_preserves_corner_order() {
        let data = quad_with_shared_corners();
        let vertices = interleave(&data);

        for (i, vertex) in vertices.iter().enumerate() {
            assert_eq!(vertex.position, data.positions[i]);
            assert_eq!(vertex.tex_coord, data.tex_coords[i]);
        }
    }

    #[test]
    fn test_interleave_then_dedup_collapses_shared_corners() {
        let data = quad_with_shared_corners();
        let (vertices, indices) = deduplicate(&interleave(&data));

        // 6 corners, 4 distinct: a, b, c, d
        assert_eq!(vertices.len(), 4);
        assert_eq!(indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_empty_mesh_interleaves_empty() {
        let data = MeshData {
            positions: Vec::new(),
            tex_coords: Vec::new(),
        };
        assert!(interleave(&data).is_empty());
    }
}
