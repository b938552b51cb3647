//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the global tracing subscriber.
///
/// Honors `RUST_LOG` when set; otherwise defaults to `info` overall with
/// `debug` for the renderer crates, which is chatty enough to follow GPU
/// setup without drowning the frame loop.
///
/// # Example
/// ```
/// aster_core::init_logging();
/// tracing::info!("starting up");
/// ```
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,aster_rhi=debug,aster_renderer=debug,aster_resources=debug")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
