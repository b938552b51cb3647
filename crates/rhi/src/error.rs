//! RHI error types.

use ash::vk;
use thiserror::Error;

/// Errors surfaced by the Vulkan wrappers.
///
/// Everything here is fatal to setup except where a caller explicitly maps
/// it (swapchain staleness never reaches this type; acquire/present report
/// it as a rebuild signal instead).
#[derive(Error, Debug)]
pub enum RhiError {
    /// Raw Vulkan API error
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Failed to load the Vulkan library
    #[error("failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// No physical device passed the suitability checks
    #[error("no suitable GPU found")]
    NoSuitableGpu,

    /// No device memory type satisfies the requested properties
    #[error("no suitable memory type (type bits {type_bits:#x}, properties {properties:?})")]
    NoSuitableMemoryType {
        type_bits: u32,
        properties: vk::MemoryPropertyFlags,
    },

    /// A format lacks a capability the renderer depends on
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Image layout transition outside the supported set
    #[error("unsupported image layout transition: {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },

    /// Shader module loading or validation error
    #[error("shader error: {0}")]
    Shader(String),

    /// Buffer misuse (zero size, out-of-bounds write, unmapped write)
    #[error("buffer error: {0}")]
    Buffer(String),

    /// Instance or validation-layer setup error
    #[error("instance error: {0}")]
    Instance(String),

    /// Swapchain creation error
    #[error("swapchain error: {0}")]
    Swapchain(String),

    /// Pipeline creation error
    #[error("pipeline error: {0}")]
    Pipeline(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
