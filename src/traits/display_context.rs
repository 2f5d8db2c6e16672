use std::rc::Rc;

/// Opaque token for a registered resolution listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(pub u64);

/// Callback fired when a resolution query flips its match state
pub type ResolutionListener = Rc<dyn Fn()>;

/// Display that a canvas is presented on
///
/// Resolution listeners are match based: a listener registered for `dppx`
/// fires when the display starts or stops matching that ratio, not on every
/// change. Observers must re-register at the new ratio after each firing.
pub trait DisplayContext {
    /// Current device pixel ratio, read live
    fn device_pixel_ratio(&self) -> f64;

    /// Register a listener for "resolution == dppx"
    fn add_resolution_listener(&self, dppx: f64, listener: ResolutionListener) -> ListenerHandle;

    /// Remove a listener; unknown handles are ignored
    fn remove_resolution_listener(&self, handle: ListenerHandle);
}
