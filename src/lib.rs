pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod size;
pub mod traits;

pub use config::{ApplyPolicy, BindingOptions, SurfaceConfig};
pub use core::{
    bind_to, BindingTarget, BitmapSizeBinding, BitmapSizeBindingBuilder, CanvasSurface,
    CapabilityProbe, PixelDensityObservable, Strategy,
};
pub use error::{Error, ObserverError, Result};
pub use size::Size;
