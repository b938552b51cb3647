//! OBJ mesh loading.
//!
//! # Overview
//!
//! [`MeshData`] is the CPU-side shape of a model: one position and one
//! texture coordinate per face corner, already triangulated, as parallel
//! arrays. Deduplication and GPU upload happen downstream; this module
//! only gets the data off disk and into the right conventions:
//!
//! - Faces with more than three corners are triangulated on load.
//! - The V texture coordinate is flipped, since OBJ puts V=0 at the
//!   bottom of the image and Vulkan samples with V=0 at the top.
//! - Meshes without texture coordinates get (0, 0) for every corner.

use std::path::Path;

use glam::{Vec2, Vec3};
use tracing::info;

use crate::error::{ResourceError, ResourceResult};

/// Triangulated mesh data as parallel per-corner arrays.
#[derive(Debug, Default)]
pub struct MeshData {
    /// Object-space position per face corner.
    pub positions: Vec<Vec3>,
    /// Texture coordinate per face corner, V flipped for Vulkan.
    pub tex_coords: Vec<Vec2>,
}

impl MeshData {
    /// Loads every shape in an OBJ file into one flat triangle list.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::ObjLoad`] when the file cannot be read or parsed.
    /// - [`ResourceError::NoGeometry`] when no triangles survive loading.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        let load_options = tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ignore_points: true,
            ignore_lines: true,
            ..Default::default()
        };

        let (models, _materials) =
            tobj::load_obj(path, &load_options).map_err(|e| ResourceError::ObjLoad {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut positions = Vec::new();
        let mut tex_coords = Vec::new();

        for model in &models {
            let mesh = &model.mesh;
            for &index in &mesh.indices {
                let i = index as usize;
                positions.push(Vec3::new(
                    mesh.positions[3 * i],
                    mesh.positions[3 * i + 1],
                    mesh.positions[3 * i + 2],
                ));

                let uv = if mesh.texcoords.is_empty() {
                    Vec2::ZERO
                } else {
                    Vec2::new(mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1])
                };
                tex_coords.push(uv);
            }
        }

        if positions.is_empty() {
            return Err(ResourceError::NoGeometry(path.to_path_buf()));
        }

        info!(
            "Loaded OBJ '{}': {} corners, {} triangles",
            path.display(),
            positions.len(),
            positions.len() / 3
        );

        Ok(Self {
            positions,
            tex_coords,
        })
    }

    /// Number of face corners (three per triangle).
    #[inline]
    pub fn corner_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.positions.len() / 3
    }
}
