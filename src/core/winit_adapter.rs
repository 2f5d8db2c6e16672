use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::window::Window;

use crate::error::ObserverError;
use crate::size::Size;
use crate::traits::{
    CanvasElement, ClientRect, DisplayContext, ElementId, ListenerHandle, ResizeCallback,
    ResizeEntry, ResizeObservation, ResizeObserverHost, ResolutionListener, Timer,
};

use super::host::{DisplayRatio, ResizeQueue};

/// Element id of the window itself, observed by the capability probe
pub const WINDOW_ROOT_ID: ElementId = ElementId(0);

/// Element id of the window's content area
pub const WINDOW_CANVAS_ID: ElementId = ElementId(1);

fn logical_size(physical: PhysicalSize<u32>, scale_factor: f64) -> Size {
    let logical: LogicalSize<f64> = physical.to_logical(scale_factor);
    Size::new(logical.width.round() as u32, logical.height.round() as u32)
}

/// Display context driven by `ScaleFactorChanged` events
pub struct WinitDisplay {
    ratio: DisplayRatio,
}

impl WinitDisplay {
    pub fn new(window: &Window) -> Rc<Self> {
        Rc::new(Self { ratio: DisplayRatio::new(window.scale_factor()) })
    }

    /// Process a Winit WindowEvent and update the ratio
    pub fn process_event(&self, event: &WindowEvent) {
        if let WindowEvent::ScaleFactorChanged { scale_factor, .. } = event {
            self.ratio.set(*scale_factor);
        }
    }
}

impl DisplayContext for WinitDisplay {
    fn device_pixel_ratio(&self) -> f64 {
        self.ratio.device_pixel_ratio()
    }

    fn add_resolution_listener(&self, dppx: f64, listener: ResolutionListener) -> ListenerHandle {
        self.ratio.add_resolution_listener(dppx, listener)
    }

    fn remove_resolution_listener(&self, handle: ListenerHandle) {
        self.ratio.remove_resolution_listener(handle)
    }
}

/// Window content area presented as a canvas
///
/// Client size is the logical inner size; the bitmap is the size the
/// render surface was last configured with.
pub struct WinitCanvas {
    window: Arc<Window>,
    client: Cell<Size>,
    bitmap: Cell<Size>,
}

impl WinitCanvas {
    pub fn new(window: Arc<Window>) -> Rc<Self> {
        let client = logical_size(window.inner_size(), window.scale_factor());
        Rc::new(Self {
            window,
            client: Cell::new(client),
            bitmap: Cell::new(Size::zero()),
        })
    }

    /// Track layout changes made by the user or the window manager
    pub fn process_event(&self, event: &WindowEvent) {
        if let WindowEvent::Resized(physical) = event {
            self.client.set(logical_size(*physical, self.window.scale_factor()));
        }
    }
}

impl CanvasElement for WinitCanvas {
    fn id(&self) -> ElementId {
        WINDOW_CANVAS_ID
    }

    fn client_size(&self) -> Size {
        self.client.get()
    }

    fn set_style_size(&self, size: Size) {
        if self.client.replace(size) != size {
            let _ = self
                .window
                .request_inner_size(LogicalSize::new(size.width, size.height));
        }
    }

    fn bitmap_size(&self) -> Size {
        self.bitmap.get()
    }

    fn set_bitmap_size(&self, size: Size) {
        self.bitmap.set(size);
    }

    fn client_rect(&self) -> Option<ClientRect> {
        let client = self.client.get();
        Some(ClientRect::new(0.0, 0.0, f64::from(client.width), f64::from(client.height)))
    }
}

/// Resize observer fed by physical `Resized` events
///
/// Physical inner sizes are exact device pixel boxes. The window root and
/// the content area are the same surface, so both report that size.
pub struct WinitResizeObserver {
    queue: ResizeQueue,
    physical: Cell<Size>,
}

impl WinitResizeObserver {
    pub fn new(window: &Window) -> Rc<Self> {
        let physical = window.inner_size();
        Rc::new(Self {
            queue: ResizeQueue::new(),
            physical: Cell::new(Size::new(physical.width, physical.height)),
        })
    }

    pub fn process_event(&self, event: &WindowEvent) {
        if let WindowEvent::Resized(physical) = event {
            let size = Size::new(physical.width, physical.height);
            self.physical.set(size);
            self.queue.push(ResizeEntry::with_device_pixels(
                WINDOW_CANVAS_ID,
                size.width,
                size.height,
            ));
        }
        self.flush();
    }

    /// Deliver initial observations and queued resizes, returns whether any
    /// were queued
    pub fn flush(&self) -> bool {
        self.queue.flush()
    }
}

impl ResizeObserverHost for WinitResizeObserver {
    fn root_element(&self) -> ElementId {
        WINDOW_ROOT_ID
    }

    fn observe(
        &self,
        target: ElementId,
        callback: ResizeCallback,
    ) -> Result<Box<dyn ResizeObservation>, ObserverError> {
        let observation = self.queue.register(target, callback);
        let size = self.physical.get();
        self.queue
            .push(ResizeEntry::with_device_pixels(target, size.width, size.height));
        Ok(observation)
    }
}

/// Timer backed by a sleeping thread per delay
#[derive(Debug, Default)]
pub struct ThreadTimer;

impl Timer for ThreadTimer {
    fn delay(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        let (sender, receiver) = oneshot::channel();
        std::thread::spawn(move || {
            std::thread::sleep(duration);
            let _ = sender.send(());
        });
        Box::pin(async move {
            let _ = receiver.await;
        })
    }
}
