//! Foundation utilities for the aster renderer.
//!
//! Small pieces every other crate leans on:
//! - The top-level error type and result alias
//! - Logging initialization
//! - An animation/frame clock

mod error;
mod logging;
mod timer;

pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
