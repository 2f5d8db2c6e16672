use std::rc::Rc;
use std::sync::Arc;

use anyhow::Context;
use canvas_bitmap_size::cli::Cli;
use canvas_bitmap_size::core::{
    run_until_quiescent, BitmapSizeBindingBuilder, CanvasSurface, ThreadTimer, WinitCanvas,
    WinitDisplay, WinitResizeObserver,
};
use canvas_bitmap_size::traits::CanvasElement;
use canvas_bitmap_size::SurfaceConfig;
use clap::Parser;
use futures::executor::LocalPool;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

// === Constants ===

const INITIAL_WINDOW_WIDTH: u32 = 800;
const INITIAL_WINDOW_HEIGHT: u32 = 600;

/// Host adapters for one window, kept alive alongside the surface
struct WindowHost {
    window: Arc<Window>,
    display: Rc<WinitDisplay>,
    canvas: Rc<WinitCanvas>,
    observer: Rc<WinitResizeObserver>,
    surface: CanvasSurface,
}

struct App {
    config: SurfaceConfig,
    snapshot: bool,
    pool: LocalPool,
    host: Option<WindowHost>,
}

impl App {
    fn new(config: SurfaceConfig, snapshot: bool) -> Self {
        Self {
            config,
            snapshot,
            pool: LocalPool::new(),
            host: None,
        }
    }

    fn create_host(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<WindowHost> {
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("Canvas Bitmap Size")
                        .with_inner_size(winit::dpi::LogicalSize::new(
                            INITIAL_WINDOW_WIDTH,
                            INITIAL_WINDOW_HEIGHT,
                        )),
                )
                .context("failed to create window")?,
        );

        let display = WinitDisplay::new(&window);
        let canvas = WinitCanvas::new(window.clone());
        let observer = WinitResizeObserver::new(&window);

        let binding = BitmapSizeBindingBuilder::new(canvas.clone(), display.clone())
            .options(self.config.binding)
            .resize_observer(observer.clone(), Rc::new(ThreadTimer))
            .build(&self.pool.spawner())?;
        binding.subscribe_bitmap_size_changed(|old, new| {
            log::info!("backing store {old} -> {new}");
        })?;

        let surface = CanvasSurface::new(binding, self.config.apply_policy)?;
        Ok(WindowHost { window, display, canvas, observer, surface })
    }

    fn shutdown(&mut self) {
        let Some(host) = self.host.take() else {
            return;
        };
        if self.snapshot {
            match host.surface.snapshot() {
                Ok(snapshot) => match serde_json::to_string_pretty(&snapshot) {
                    Ok(json) => println!("{json}"),
                    Err(e) => eprintln!("Failed to serialize snapshot: {}", e),
                },
                Err(e) => eprintln!("Failed to read surface state: {}", e),
            }
        }
        if let Err(e) = host.surface.dispose() {
            eprintln!("Failed to dispose surface: {}", e);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.host.is_none() {
            match self.create_host(event_loop) {
                Ok(host) => self.host = Some(host),
                Err(e) => {
                    eprintln!("Failed to initialize surface: {:#}", e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(host) = &mut self.host else {
            return;
        };

        host.display.process_event(&event);
        host.canvas.process_event(&event);
        host.observer.process_event(&event);

        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => {
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(_) => {
                if let Err(e) = host.surface.resize_container(host.canvas.client_size()) {
                    eprintln!("Resize error: {}", e);
                }
                host.window.request_redraw();
            }
            WindowEvent::RedrawRequested => match host.surface.begin_frame() {
                Ok(frame) if frame.resized => log::info!("rendering at {}", frame.bitmap),
                Ok(_) => {}
                Err(e) => eprintln!("Frame error: {}", e),
            },
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        let Some(host) = &self.host else {
            self.pool.run_until_stalled();
            return;
        };
        run_until_quiescent(&mut self.pool, || host.observer.flush());
        if host.surface.needs_apply() {
            host.window.request_redraw();
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.surface_config()?;

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config, cli.snapshot);

    println!("Canvas Bitmap Size - resize the window or move it between displays, Escape to quit");
    event_loop.run_app(&mut app)?;

    Ok(())
}
