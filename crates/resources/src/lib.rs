//! Asset loading.
//!
//! This crate handles loading of external assets:
//! - OBJ model loading (triangulated, Vulkan texture-coordinate convention)
//! - Image loading and RGBA8 conversion

pub mod error;
pub mod model;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use model::MeshData;
pub use texture::TextureData;
