//! Application entry point.
//!
//! Drives the winit event loop around [`Renderer`]: window and renderer are
//! created on `resumed`, every `RedrawRequested` draws a frame and
//! `about_to_wait` immediately requests the next one. The first fatal error
//! stops the loop and becomes the process exit code.

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use aster_core::Error;
use aster_platform::Window;
use aster_renderer::Renderer;

const WINDOW_TITLE: &str = "aster";
const WINDOW_WIDTH: u32 = 800;
const WINDOW_HEIGHT: u32 = 600;

struct App {
    window: Option<Window>,
    renderer: Option<Renderer>,
    /// First fatal error; set once, then the loop exits.
    fatal: Option<Error>,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            renderer: None,
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Error) {
        error!("Fatal: {}", error);
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, WINDOW_TITLE, WINDOW_WIDTH, WINDOW_HEIGHT) {
            Ok(window) => window,
            Err(e) => {
                self.fail(event_loop, e);
                return;
            }
        };

        match Renderer::new(&window) {
            Ok(renderer) => {
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.handle_resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(renderer) = self.renderer.as_mut() {
                    if let Err(e) = renderer.draw_frame() {
                        self.fail(event_loop, e);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    aster_core::init_logging();
    info!("Starting {}", WINDOW_TITLE);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    match app.fatal {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}
