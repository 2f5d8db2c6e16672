pub mod canvas;
pub mod display_context;
pub mod resize_observer;
pub mod timer;

pub use canvas::*;
pub use display_context::*;
pub use resize_observer::*;
pub use timer::*;
