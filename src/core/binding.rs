use std::cell::RefCell;
use std::rc::{Rc, Weak};

use futures::task::{LocalSpawn, LocalSpawnExt};
use serde::Serialize;

use crate::config::BindingOptions;
use crate::error::{Error, Result};
use crate::size::{round_half_up, Size};
use crate::traits::{
    CanvasElement, ClientRect, DisplayContext, ResizeEntry, ResizeObservation,
    ResizeObserverHost, Timer,
};

use super::listeners::{ListenerList, SubscriptionId};
use super::pixel_density::PixelDensityObservable;
use super::probe::CapabilityProbe;

/// Maps a raw candidate bitmap size and the client size to the final candidate
pub type TransformFn = Rc<dyn Fn(Size, Size) -> Size>;

/// Called with `(old, new)` after the backing store was resized
pub type BitmapSizeListener = dyn Fn(Size, Size);

/// Called with `(old, new)` whenever the pending suggestion changes
pub type SuggestedSizeListener = dyn Fn(Option<Size>, Option<Size>);

/// Source of candidate bitmap sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Capability probe still running
    Pending,
    /// Device-pixel-content-box observer on the element
    ResizeObserver,
    /// Client size times the observed device pixel ratio
    PixelDensity,
}

/// What a binding tracks the canvas against
pub enum BindingTarget {
    DevicePixelContentBox {
        transform: Option<TransformFn>,
        options: BindingOptions,
    },
}

/// Predict the device pixel size of a layout box
///
/// Both edges are snapped to the device grid before subtracting, the same
/// way the browser snaps them, so adjacent boxes never leave a seam.
pub fn predicted_bitmap_size(rect: ClientRect, ratio: f64) -> Result<Size> {
    let left = round_half_up(rect.left * ratio);
    let top = round_half_up(rect.top * ratio);
    Size::try_new(
        round_half_up(rect.left * ratio + rect.width * ratio).saturating_sub(left),
        round_half_up(rect.top * ratio + rect.height * ratio).saturating_sub(top),
    )
}

fn identity_transform() -> TransformFn {
    Rc::new(|size: Size, _client: Size| size)
}

fn scaled_client_size(client: Size, ratio: f64) -> Result<Size> {
    Size::try_new(
        round_half_up(f64::from(client.width) * ratio),
        round_half_up(f64::from(client.height) * ratio),
    )
}

struct BindingState {
    element: Option<Rc<dyn CanvasElement>>,
    display: Rc<dyn DisplayContext>,
    host: Option<Rc<dyn ResizeObserverHost>>,
    client_size: Size,
    transform: TransformFn,
    suggested: Option<Size>,
    bitmap_listeners: ListenerList<BitmapSizeListener>,
    suggested_listeners: ListenerList<SuggestedSizeListener>,
    density: Option<PixelDensityObservable>,
    observation: Option<Box<dyn ResizeObservation>>,
    strategy: Strategy,
}

impl BindingState {
    fn element(&self) -> Result<Rc<dyn CanvasElement>> {
        self.element.clone().ok_or(Error::Disposed)
    }
}

impl Drop for BindingState {
    fn drop(&mut self) {
        if let Some(observation) = self.observation.take() {
            observation.disconnect();
        }
        if let Some(density) = self.density.take() {
            density.dispose();
        }
    }
}

/// Keeps a canvas backing store matched to its size in device pixels
///
/// New sizes are only *suggested*; the owner commits them with
/// [`BitmapSizeBinding::apply_suggested_bitmap_size`] at a point where
/// reallocating the backing store cannot tear a frame.
///
/// The handle is cheap to clone. Listeners that need to call back into the
/// binding should hold a [`WeakBitmapSizeBinding`].
#[derive(Clone)]
pub struct BitmapSizeBinding {
    inner: Rc<RefCell<BindingState>>,
}

impl BitmapSizeBinding {
    pub fn canvas_element(&self) -> Result<Rc<dyn CanvasElement>> {
        self.inner.borrow().element()
    }

    /// Last client size set through the binding or read at construction
    pub fn client_size(&self) -> Result<Size> {
        let state = self.inner.borrow();
        state.element()?;
        Ok(state.client_size)
    }

    /// Current backing store size, read live from the element
    pub fn bitmap_size(&self) -> Result<Size> {
        Ok(self.canvas_element()?.bitmap_size())
    }

    /// Pending suggestion, `None` when the backing store is up to date
    pub fn suggested_bitmap_size(&self) -> Result<Option<Size>> {
        let state = self.inner.borrow();
        state.element()?;
        Ok(state.suggested)
    }

    pub fn strategy(&self) -> Strategy {
        self.inner.borrow().strategy
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.borrow().element.is_none()
    }

    pub fn downgrade(&self) -> WeakBitmapSizeBinding {
        WeakBitmapSizeBinding { inner: Rc::downgrade(&self.inner) }
    }

    /// Resize the element's layout box and recompute the suggestion
    pub fn resize_client_layout(&self, size: Size) -> Result<()> {
        let element = self.canvas_element()?;
        element.set_style_size(size);
        self.inner.borrow_mut().client_size = size;
        self.invalidate_bitmap_size()
    }

    pub fn subscribe_bitmap_size_changed(
        &self,
        listener: impl Fn(Size, Size) + 'static,
    ) -> Result<SubscriptionId> {
        let mut state = self.inner.borrow_mut();
        state.element()?;
        Ok(state.bitmap_listeners.add(Rc::new(listener)))
    }

    pub fn unsubscribe_bitmap_size_changed(&self, id: SubscriptionId) -> bool {
        self.inner.borrow_mut().bitmap_listeners.remove(id)
    }

    pub fn subscribe_suggested_bitmap_size_changed(
        &self,
        listener: impl Fn(Option<Size>, Option<Size>) + 'static,
    ) -> Result<SubscriptionId> {
        let mut state = self.inner.borrow_mut();
        state.element()?;
        Ok(state.suggested_listeners.add(Rc::new(listener)))
    }

    pub fn unsubscribe_suggested_bitmap_size_changed(&self, id: SubscriptionId) -> bool {
        self.inner.borrow_mut().suggested_listeners.remove(id)
    }

    /// Commit the pending suggestion to the backing store
    ///
    /// No-op without a suggestion. The backing store is only reallocated
    /// when the size actually differs. Suggested-size listeners then get
    /// `(committed, pending)`, where `pending` is `None` unless a bitmap
    /// listener triggered a new suggestion during the commit.
    pub fn apply_suggested_bitmap_size(&self) -> Result<()> {
        let element = self.canvas_element()?;
        let Some(suggested) = self.inner.borrow_mut().suggested.take() else {
            return Ok(());
        };

        let old = element.bitmap_size();
        if old != suggested {
            element.set_bitmap_size(suggested);
            log::debug!("bitmap resized {old} -> {suggested}");
            self.emit_bitmap_size_changed(old, suggested);
        }
        // A bitmap listener may already have produced the next suggestion
        let pending = self.inner.borrow().suggested;
        self.emit_suggested_size_changed(Some(suggested), pending);
        Ok(())
    }

    /// Tear down the active watcher and drop every listener
    ///
    /// Fails with [`Error::Disposed`] when called twice.
    pub fn dispose(&self) -> Result<()> {
        let (observation, density) = {
            let mut state = self.inner.borrow_mut();
            state.element()?;
            state.element = None;
            state.host = None;
            state.suggested = None;
            state.bitmap_listeners.clear();
            state.suggested_listeners.clear();
            (state.observation.take(), state.density.take())
        };

        if let Some(observation) = observation {
            observation.disconnect();
        }
        if let Some(density) = density {
            density.dispose();
        }
        log::debug!("bitmap size binding disposed");
        Ok(())
    }

    fn emit_bitmap_size_changed(&self, old: Size, new: Size) {
        let listeners = self.inner.borrow().bitmap_listeners.snapshot();
        for listener in listeners {
            listener(old, new);
        }
    }

    fn emit_suggested_size_changed(&self, old: Option<Size>, new: Option<Size>) {
        let listeners = self.inner.borrow().suggested_listeners.snapshot();
        for listener in listeners {
            listener(old, new);
        }
    }

    fn suggest_new_bitmap_size(&self, raw: Size) -> Result<()> {
        let (element, transform, client_size, old) = {
            let state = self.inner.borrow();
            (state.element()?, Rc::clone(&state.transform), state.client_size, state.suggested)
        };

        let candidate = transform(raw, client_size);
        let new = if element.bitmap_size() == candidate { None } else { Some(candidate) };
        if old == new {
            return Ok(());
        }

        self.inner.borrow_mut().suggested = new;
        log::debug!("suggested bitmap size {old:?} -> {new:?}");
        self.emit_suggested_size_changed(old, new);
        Ok(())
    }

    /// Recompute the candidate from client size and device pixel ratio
    fn invalidate_bitmap_size(&self) -> Result<()> {
        let (element, ratio, client_size) = {
            let state = self.inner.borrow();
            let Some(element) = state.element.clone() else {
                return Ok(());
            };
            let ratio = match &state.density {
                Some(density) => density.current_value()?,
                None => state.display.device_pixel_ratio(),
            };
            (element, ratio, state.client_size)
        };

        let candidate = match element.client_rect() {
            Some(rect) => predicted_bitmap_size(rect, ratio)?,
            None => scaled_client_size(client_size, ratio)?,
        };
        self.suggest_new_bitmap_size(candidate)
    }

    fn on_probe_resolved(&self, supported: bool) {
        if self.is_disposed() {
            log::debug!("capability probe resolved after dispose, ignoring");
            return;
        }
        let result = if supported {
            self.init_resize_observer()
        } else {
            self.init_pixel_density()
        };
        if let Err(err) = result {
            log::error!("failed to start bitmap size tracking: {err}");
        }
    }

    fn init_resize_observer(&self) -> Result<()> {
        let (element, host) = {
            let state = self.inner.borrow();
            (state.element()?, state.host.clone())
        };
        let Some(host) = host else {
            return self.init_pixel_density();
        };

        let weak = self.downgrade();
        let observed = host.observe(
            element.id(),
            Box::new(move |entries| {
                if let Some(binding) = weak.upgrade() {
                    binding.on_resize_entries(entries);
                }
            }),
        );

        match observed {
            Ok(observation) => {
                let mut state = self.inner.borrow_mut();
                state.observation = Some(observation);
                state.strategy = Strategy::ResizeObserver;
                log::debug!("tracking canvas {:?} with device-pixel-content-box", element.id());
                Ok(())
            }
            Err(err) => {
                log::warn!("{err}, falling back to device pixel ratio");
                self.init_pixel_density()
            }
        }
    }

    fn on_resize_entries(&self, entries: &[ResizeEntry]) {
        let Ok(element) = self.canvas_element() else {
            return;
        };
        let target = element.id();
        let Some(entry) = entries.iter().find(|entry| entry.target == target) else {
            return;
        };
        let Some(box_size) = entry
            .device_pixel_content_box_size
            .as_ref()
            .and_then(|sizes| sizes.first())
        else {
            return;
        };

        let raw = Size::new(box_size.inline_size, box_size.block_size);
        if let Err(err) = self.suggest_new_bitmap_size(raw) {
            log::error!("failed to suggest bitmap size: {err}");
        }
    }

    fn init_pixel_density(&self) -> Result<()> {
        let display = {
            let state = self.inner.borrow();
            if state.element.is_none() {
                return Ok(());
            }
            Rc::clone(&state.display)
        };

        let density = PixelDensityObservable::new(display)?;
        let weak = self.downgrade();
        let _subscription = density.subscribe(move |ratio| {
            let Some(binding) = weak.upgrade() else {
                return;
            };
            log::debug!("device pixel ratio changed to {ratio}");
            if let Err(err) = binding.invalidate_bitmap_size() {
                log::error!("failed to recompute bitmap size: {err}");
            }
        })?;

        {
            let mut state = self.inner.borrow_mut();
            state.density = Some(density);
            state.strategy = Strategy::PixelDensity;
        }
        log::debug!("tracking canvas with device pixel ratio observable");
        self.invalidate_bitmap_size()
    }
}

impl std::fmt::Debug for BitmapSizeBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.borrow();
        f.debug_struct("BitmapSizeBinding")
            .field("strategy", &state.strategy)
            .field("client_size", &state.client_size)
            .field("suggested", &state.suggested)
            .field("disposed", &state.element.is_none())
            .finish()
    }
}

/// Non-owning handle to a [`BitmapSizeBinding`]
#[derive(Clone)]
pub struct WeakBitmapSizeBinding {
    inner: Weak<RefCell<BindingState>>,
}

impl WeakBitmapSizeBinding {
    pub fn upgrade(&self) -> Option<BitmapSizeBinding> {
        self.inner.upgrade().map(|inner| BitmapSizeBinding { inner })
    }
}

/// Builder for [`BitmapSizeBinding`]
pub struct BitmapSizeBindingBuilder {
    element: Rc<dyn CanvasElement>,
    display: Rc<dyn DisplayContext>,
    transform: Option<TransformFn>,
    options: BindingOptions,
    resize_observer: Option<(Rc<dyn ResizeObserverHost>, Rc<dyn Timer>)>,
}

impl BitmapSizeBindingBuilder {
    /// Bind `element`, presented on `display`
    pub fn new(element: Rc<dyn CanvasElement>, display: Rc<dyn DisplayContext>) -> Self {
        Self {
            element,
            display,
            transform: None,
            options: BindingOptions::default(),
            resize_observer: None,
        }
    }

    /// Transform applied to every raw candidate, identity by default
    pub fn transform(mut self, transform: impl Fn(Size, Size) -> Size + 'static) -> Self {
        self.transform = Some(Rc::new(transform));
        self
    }

    pub fn options(mut self, options: BindingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn target(mut self, target: BindingTarget) -> Self {
        match target {
            BindingTarget::DevicePixelContentBox { transform, options } => {
                self.transform = transform;
                self.options = options;
            }
        }
        self
    }

    /// Host capable of device-pixel-content-box observation, and the timer
    /// bounding its capability probe
    pub fn resize_observer(
        mut self,
        host: Rc<dyn ResizeObserverHost>,
        timer: Rc<dyn Timer>,
    ) -> Self {
        self.resize_observer = Some((host, timer));
        self
    }

    /// Create the binding
    ///
    /// When the resize observer is allowed and available, the capability
    /// probe runs on `spawner` and the strategy stays [`Strategy::Pending`]
    /// until it resolves. Otherwise the pixel density fallback is installed
    /// before returning.
    pub fn build<S: LocalSpawn + ?Sized>(self, spawner: &S) -> Result<BitmapSizeBinding> {
        let probe_with = match self.resize_observer {
            Some((host, timer)) if self.options.allow_resize_observer => Some((host, timer)),
            _ => None,
        };

        let binding = BitmapSizeBinding {
            inner: Rc::new(RefCell::new(BindingState {
                client_size: self.element.client_size(),
                element: Some(self.element),
                display: self.display,
                host: probe_with.as_ref().map(|(host, _)| Rc::clone(host)),
                transform: self.transform.unwrap_or_else(identity_transform),
                suggested: None,
                bitmap_listeners: ListenerList::new(),
                suggested_listeners: ListenerList::new(),
                density: None,
                observation: None,
                strategy: Strategy::Pending,
            })),
        };

        match probe_with {
            Some((host, timer)) => {
                let probe = CapabilityProbe::new(host, timer).with_timeout(self.options.probe_timeout());
                let weak = binding.downgrade();
                spawner.spawn_local(async move {
                    let supported = probe.probe().await;
                    if let Some(binding) = weak.upgrade() {
                        binding.on_probe_resolved(supported);
                    }
                })?;
            }
            None => binding.init_pixel_density()?,
        }
        Ok(binding)
    }
}

/// Start building a binding of `element` against `target`
pub fn bind_to(
    element: Rc<dyn CanvasElement>,
    display: Rc<dyn DisplayContext>,
    target: BindingTarget,
) -> BitmapSizeBindingBuilder {
    BitmapSizeBindingBuilder::new(element, display).target(target)
}
