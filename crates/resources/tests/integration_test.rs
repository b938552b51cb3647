//! Integration tests for asset loading.

use std::path::{Path, PathBuf};

use aster_resources::{MeshData, ResourceError, TextureData};

fn write_temp_obj(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(name);
    std::fs::write(&path, contents).expect("Failed to write temp OBJ");
    path
}

#[test]
fn load_obj_flips_v_coordinate() {
    let path = write_temp_obj(
        "aster_triangle.obj",
        "v 0.0 0.0 0.0\n\
         v 1.0 0.0 0.0\n\
         v 0.0 1.0 0.0\n\
         vt 0.0 0.25\n\
         vt 1.0 0.0\n\
         vt 0.0 1.0\n\
         f 1/1 2/2 3/3\n",
    );

    let mesh = MeshData::load(&path).expect("Failed to load triangle OBJ");
    let _ = std::fs::remove_file(&path);

    assert_eq!(mesh.corner_count(), 3);
    assert_eq!(mesh.triangle_count(), 1);
    assert_eq!(mesh.tex_coords.len(), mesh.positions.len());

    // OBJ V=0.25 becomes Vulkan V=0.75.
    assert!((mesh.tex_coords[0].y - 0.75).abs() < 1e-6);
    assert!((mesh.tex_coords[0].x - 0.0).abs() < 1e-6);
}

#[test]
fn load_obj_triangulates_quads() {
    let path = write_temp_obj(
        "aster_quad.obj",
        "v 0.0 0.0 0.0\n\
         v 1.0 0.0 0.0\n\
         v 1.0 1.0 0.0\n\
         v 0.0 1.0 0.0\n\
         vt 0.0 0.0\n\
         vt 1.0 0.0\n\
         vt 1.0 1.0\n\
         vt 0.0 1.0\n\
         f 1/1 2/2 3/3 4/4\n",
    );

    let mesh = MeshData::load(&path).expect("Failed to load quad OBJ");
    let _ = std::fs::remove_file(&path);

    // One quad becomes two triangles.
    assert_eq!(mesh.triangle_count(), 2);
    assert_eq!(mesh.corner_count(), 6);
}

#[test]
fn load_obj_without_tex_coords_defaults_to_zero() {
    let path = write_temp_obj(
        "aster_untextured.obj",
        "v 0.0 0.0 0.0\n\
         v 1.0 0.0 0.0\n\
         v 0.0 1.0 0.0\n\
         f 1 2 3\n",
    );

    let mesh = MeshData::load(&path).expect("Failed to load untextured OBJ");
    let _ = std::fs::remove_file(&path);

    assert_eq!(mesh.corner_count(), 3);
    assert!(mesh.tex_coords.iter().all(|uv| uv.x == 0.0 && uv.y == 0.0));
}

#[test]
fn load_obj_without_faces_is_rejected() {
    let path = write_temp_obj(
        "aster_pointcloud.obj",
        "v 0.0 0.0 0.0\n\
         v 1.0 0.0 0.0\n\
         v 0.0 1.0 0.0\n",
    );

    let result = MeshData::load(&path);
    let _ = std::fs::remove_file(&path);

    assert!(matches!(result, Err(ResourceError::NoGeometry(_))));
}

#[test]
fn load_bundled_model() {
    let model_path = Path::new("../../assets/models/viking_room.obj");

    // Skip when the asset is not checked out (CI may not have assets).
    if !model_path.exists() {
        println!("Skipping test: model file not found at {:?}", model_path);
        return;
    }

    let mesh = MeshData::load(model_path).expect("Failed to load OBJ model");

    assert!(mesh.corner_count() > 0, "Model should have geometry");
    assert_eq!(
        mesh.corner_count() % 3,
        0,
        "Corner count should be a multiple of three"
    );
    assert_eq!(
        mesh.tex_coords.len(),
        mesh.positions.len(),
        "Every corner should have a texture coordinate"
    );

    println!(
        "Loaded model: {} triangles, {} corners",
        mesh.triangle_count(),
        mesh.corner_count()
    );
}

#[test]
fn load_bundled_texture() {
    let texture_path = Path::new("../../assets/textures/viking_room.png");

    if !texture_path.exists() {
        println!("Skipping test: texture file not found at {:?}", texture_path);
        return;
    }

    let texture = TextureData::load(texture_path).expect("Failed to load texture");

    assert!(texture.width > 0 && texture.height > 0);
    assert_eq!(
        texture.byte_len(),
        (texture.width * texture.height * 4) as usize,
        "Pixel data should be tightly packed RGBA8"
    );
}
