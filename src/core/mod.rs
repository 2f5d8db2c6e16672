pub mod binding;
pub mod headless;
pub mod host;
pub mod listeners;
pub mod pixel_density;
pub mod probe;
pub mod surface;
pub mod winit_adapter;

pub use binding::{
    bind_to, predicted_bitmap_size, BindingTarget, BitmapSizeBinding, BitmapSizeBindingBuilder,
    BitmapSizeListener, Strategy, SuggestedSizeListener, TransformFn, WeakBitmapSizeBinding,
};
pub use headless::{HeadlessCanvas, HeadlessDisplay, HeadlessResizeObserver, ManualTimer, ObserverMode};
pub use host::{run_until_quiescent, DisplayRatio, ResizeQueue};
pub use listeners::{ListenerList, ResolutionListenerRegistry, SubscriptionId};
pub use pixel_density::{DensitySubscription, ListenerPhase, PixelDensityObservable};
pub use probe::{CapabilityProbe, DEFAULT_PROBE_TIMEOUT};
pub use surface::{CanvasSurface, FrameSize, SurfaceSnapshot};
pub use winit_adapter::{
    ThreadTimer, WinitCanvas, WinitDisplay, WinitResizeObserver, WINDOW_CANVAS_ID, WINDOW_ROOT_ID,
};
