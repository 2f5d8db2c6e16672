//! In-memory host environment
//!
//! Deterministic implementations of the display, canvas, resize observer and
//! timer seams. Nothing happens until the caller drives it: ratio changes fire
//! listeners synchronously, resize entries queue until [`HeadlessResizeObserver::flush`],
//! delays complete on [`ManualTimer::advance`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;

use crate::error::ObserverError;
use crate::size::Size;
use crate::traits::{
    CanvasElement, ClientRect, DisplayContext, ElementId, ListenerHandle, ResizeCallback,
    ResizeEntry, ResizeObservation, ResizeObserverHost, ResolutionListener, Timer,
};

use super::host::{DisplayRatio, ResizeQueue};

/// Display with a settable device pixel ratio
pub struct HeadlessDisplay {
    ratio: DisplayRatio,
}

impl HeadlessDisplay {
    pub fn new(device_pixel_ratio: f64) -> Rc<Self> {
        Rc::new(Self { ratio: DisplayRatio::new(device_pixel_ratio) })
    }

    /// Change the ratio and fire listeners whose match state flipped
    pub fn set_device_pixel_ratio(&self, ratio: f64) {
        self.ratio.set(ratio);
    }

    /// Live native listeners
    pub fn listener_count(&self) -> usize {
        self.ratio.listener_count()
    }
}

impl DisplayContext for HeadlessDisplay {
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

/// Default backing store of a fresh HTML canvas
pub const DEFAULT_CANVAS_BITMAP: Size = Size::new(300, 150);

/// Canvas element with in-memory layout
pub struct HeadlessCanvas {
    id: ElementId,
    client: Cell<Size>,
    origin: Cell<(f64, f64)>,
    laid_out: Cell<bool>,
    bitmap: Cell<Size>,
    bitmap_writes: Cell<u32>,
    style_writes: Cell<u32>,
}

impl HeadlessCanvas {
    /// Laid-out canvas at the origin with the default backing store
    pub fn new(id: u64, client_size: Size) -> Rc<Self> {
        Rc::new(Self {
            id: ElementId(id),
            client: Cell::new(client_size),
            origin: Cell::new((0.0, 0.0)),
            laid_out: Cell::new(true),
            bitmap: Cell::new(DEFAULT_CANVAS_BITMAP),
            bitmap_writes: Cell::new(0),
            style_writes: Cell::new(0),
        })
    }

    /// Move the layout box, e.g. to a fractional offset
    pub fn set_origin(&self, left: f64, top: f64) {
        self.origin.set((left, top));
    }

    /// Toggle whether the element produces a layout box
    pub fn set_laid_out(&self, laid_out: bool) {
        self.laid_out.set(laid_out);
    }

    /// Overwrite the backing store without counting it as a resize
    pub fn set_initial_bitmap(&self, size: Size) {
        self.bitmap.set(size);
    }

    /// Number of backing store reallocations
    pub fn bitmap_resize_count(&self) -> u32 {
        self.bitmap_writes.get()
    }

    /// Number of CSS size writes
    pub fn style_write_count(&self) -> u32 {
        self.style_writes.get()
    }
}

impl CanvasElement for HeadlessCanvas {
    fn id(&self) -> ElementId {
        self.id
    }

    fn client_size(&self) -> Size {
        self.client.get()
    }

    fn set_style_size(&self, size: Size) {
        self.client.set(size);
        self.style_writes.set(self.style_writes.get() + 1);
    }

    fn bitmap_size(&self) -> Size {
        self.bitmap.get()
    }

    fn set_bitmap_size(&self, size: Size) {
        self.bitmap.set(size);
        self.bitmap_writes.set(self.bitmap_writes.get() + 1);
    }

    fn client_rect(&self) -> Option<ClientRect> {
        if !self.laid_out.get() {
            return None;
        }
        let (left, top) = self.origin.get();
        let client = self.client.get();
        Some(ClientRect::new(left, top, f64::from(client.width), f64::from(client.height)))
    }
}

/// Capability level of a [`HeadlessResizeObserver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverMode {
    /// Entries carry device pixel content boxes
    Supported,
    /// Entries are delivered without device pixel boxes
    Unsupported,
    /// `observe` fails outright
    Failing,
    /// `observe` succeeds but nothing is ever delivered
    Silent,
}

/// Resize observer with explicitly flushed deliveries
pub struct HeadlessResizeObserver {
    mode: ObserverMode,
    root: ElementId,
    queue: ResizeQueue,
    device_sizes: RefCell<HashMap<ElementId, Size>>,
    observe_calls: Cell<u32>,
}

impl HeadlessResizeObserver {
    pub fn new(mode: ObserverMode) -> Rc<Self> {
        Rc::new(Self {
            mode,
            root: ElementId(0),
            queue: ResizeQueue::new(),
            device_sizes: RefCell::new(HashMap::new()),
            observe_calls: Cell::new(0),
        })
    }

    /// Record a new device pixel box for `target` and queue its entry
    pub fn resize(&self, target: ElementId, device_pixels: Size) {
        self.device_sizes.borrow_mut().insert(target, device_pixels);
        if let Some(entry) = self.entry_for(target) {
            self.queue.push(entry);
        }
    }

    /// Deliver queued entries, returns whether any were queued
    pub fn flush(&self) -> bool {
        self.queue.flush()
    }

    /// Deliver `entries` verbatim to every active observation
    pub fn deliver_to_all(&self, entries: &[ResizeEntry]) {
        self.queue.deliver_to_all(entries);
    }

    pub fn active_observation_count(&self) -> usize {
        self.queue.active_count()
    }

    pub fn observe_call_count(&self) -> u32 {
        self.observe_calls.get()
    }

    fn entry_for(&self, target: ElementId) -> Option<ResizeEntry> {
        match self.mode {
            ObserverMode::Supported => {
                let size = self.device_sizes.borrow().get(&target).copied().unwrap_or_default();
                Some(ResizeEntry::with_device_pixels(target, size.width, size.height))
            }
            ObserverMode::Unsupported => Some(ResizeEntry::without_device_pixels(target)),
            ObserverMode::Failing | ObserverMode::Silent => None,
        }
    }
}

impl ResizeObserverHost for HeadlessResizeObserver {
    fn root_element(&self) -> ElementId {
        self.root
    }

    fn observe(
        &self,
        target: ElementId,
        callback: ResizeCallback,
    ) -> Result<Box<dyn ResizeObservation>, ObserverError> {
        self.observe_calls.set(self.observe_calls.get() + 1);
        if self.mode == ObserverMode::Failing {
            return Err(ObserverError::new("device-pixel-content-box is not supported"));
        }

        let observation = self.queue.register(target, callback);
        // Observers report the current box once after `observe`
        if let Some(entry) = self.entry_for(target) {
            self.queue.push(entry);
        }
        Ok(observation)
    }
}

/// Timer advanced by hand
#[derive(Default)]
pub struct ManualTimer {
    now: Cell<Duration>,
    pending: RefCell<Vec<(Duration, oneshot::Sender<()>)>>,
}

impl ManualTimer {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Move time forward and complete every delay that is due
    pub fn advance(&self, elapsed: Duration) {
        let now = self.now.get() + elapsed;
        self.now.set(now);

        let mut pending = self.pending.borrow_mut();
        let (due, waiting): (Vec<_>, Vec<_>) =
            pending.drain(..).partition(|(deadline, _)| *deadline <= now);
        *pending = waiting;
        drop(pending);

        for (_, sender) in due {
            let _ = sender.send(());
        }
    }

    /// Delays not yet completed
    pub fn pending_count(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl Timer for ManualTimer {
    fn delay(&self, duration: Duration) -> LocalBoxFuture<'static, ()> {
        let (sender, receiver) = oneshot::channel();
        self.pending.borrow_mut().push((self.now.get() + duration, sender));
        Box::pin(async move {
            let _ = receiver.await;
        })
    }
}
