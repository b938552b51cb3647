//! Frame orchestration.
//!
//! This crate ties the lower layers together into an on-screen renderer:
//! - Swapchain, render pass and pipeline setup
//! - Model and texture upload
//! - Per-frame resources and the draw loop itself

pub mod frame;
pub mod mesh;
pub mod renderer;
pub mod targets;
pub mod ubo;

pub use renderer::Renderer;
