//! Top-level error type.
//!
//! Lower layers carry their own error enums (`aster_rhi::RhiError`,
//! `aster_resources::ResourceError`); this type is what crosses the seam
//! into the application, where any variant is fatal.

use thiserror::Error;

/// Error type shared by the renderer-facing crates.
#[derive(Error, Debug)]
pub enum Error {
    /// Window or surface creation failed.
    #[error("window error: {0}")]
    Window(String),

    /// GPU setup or per-frame rendering failed.
    #[error("render error: {0}")]
    Render(String),

    /// A model, texture or shader file could not be loaded.
    #[error("asset error: {0}")]
    Asset(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
