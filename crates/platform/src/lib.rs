//! Platform layer: winit windowing and Vulkan surface plumbing.
//!
//! Everything OS-specific lives here so the RHI and renderer crates only see
//! raw handles and extension name lists.

mod window;

pub use window::{Surface, Window, required_extensions};
