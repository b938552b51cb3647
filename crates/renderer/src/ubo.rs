//! Uniform buffer data for the mesh shaders.
//!
//! The struct must match the uniform block in `assets/shaders/mesh.vert`
//! field for field. Three column-major `mat4`s satisfy std140 layout with
//! no padding, so the Rust struct and the GLSL block are byte-identical.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Model spin rate, degrees per second.
const ROTATION_DEG_PER_SEC: f32 = 45.0;

/// Vertical field of view, degrees.
const FOV_DEG: f32 = 45.0;

/// Near and far clip planes.
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 10.0;

/// Camera position; the model sits at the origin.
const EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);

/// Per-frame transformation matrices.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct UniformBufferObject {
    /// Object-to-world transform.
    pub model: Mat4,
    /// World-to-view transform.
    pub view: Mat4,
    /// View-to-clip transform, Y flipped for Vulkan.
    pub proj: Mat4,
}

impl UniformBufferObject {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Builds the matrices for a frame `elapsed_secs` after startup.
    ///
    /// The model spins about the Z axis at 45° per second. The camera looks
    /// at the origin from (2, 2, 2) with +Z up. The projection is a
    /// right-handed perspective whose Y axis is negated: glam produces
    /// OpenGL-convention clip space where Y points up, Vulkan's points down.
    pub fn for_elapsed(elapsed_secs: f32, aspect: f32) -> Self {
        let model = Mat4::from_rotation_z(elapsed_secs * ROTATION_DEG_PER_SEC.to_radians());

        let view = Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Z);

        let mut proj = Mat4::perspective_rh(FOV_DEG.to_radians(), aspect, Z_NEAR, Z_FAR);
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ubo_size() {
        // 3 Mat4 (3 * 64) = 192 bytes, no padding
        assert_eq!(UniformBufferObject::SIZE, 192);
    }

    #[test]
    fn test_ubo_alignment() {
        // Mat4 requires 16-byte alignment
        assert_eq!(std::mem::align_of::<UniformBufferObject>(), 16);
    }

    #[test]
    fn test_ubo_pod_roundtrip() {
        let ubo = UniformBufferObject::for_elapsed(1.5, 16.0 / 9.0);
        let bytes: &[u8] = bytemuck::bytes_of(&ubo);
        assert_eq!(bytes.len(), UniformBufferObject::SIZE);
    }

    #[test]
    fn test_model_starts_unrotated() {
        let ubo = UniformBufferObject::for_elapsed(0.0, 1.0);
        assert_eq!(ubo.model, Mat4::IDENTITY);
    }

    #[test]
    fn test_model_quarter_turn_after_two_seconds() {
        // 45°/s for 2s is a 90° turn about Z: +X maps to +Y.
        let ubo = UniformBufferObject::for_elapsed(2.0, 1.0);
        let rotated = ubo.model.transform_point3(Vec3::X);
        assert!((rotated - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_view_places_eye_at_origin() {
        let ubo = UniformBufferObject::for_elapsed(0.0, 1.0);
        let eye_in_view = ubo.view.transform_point3(EYE);
        assert!(eye_in_view.length() < 1e-5);
    }

    #[test]
    fn test_projection_flips_y() {
        let ubo = UniformBufferObject::for_elapsed(0.0, 1.0);
        let unflipped = Mat4::perspective_rh(FOV_DEG.to_radians(), 1.0, Z_NEAR, Z_FAR);
        assert!(unflipped.y_axis.y > 0.0);
        assert!(ubo.proj.y_axis.y < 0.0);
        assert_eq!(ubo.proj.y_axis.y, -unflipped.y_axis.y);
    }
}
