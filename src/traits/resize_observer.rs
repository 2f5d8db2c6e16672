use crate::error::ObserverError;

use super::canvas::ElementId;

/// One fragment of a device-pixel-content-box measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxSize {
    /// Width in device pixels
    pub inline_size: u32,
    /// Height in device pixels
    pub block_size: u32,
}

/// Single resize notification for an observed element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeEntry {
    pub target: ElementId,
    /// `None` when the host does not report device pixel boxes at all
    pub device_pixel_content_box_size: Option<Vec<BoxSize>>,
}

impl ResizeEntry {
    /// Entry carrying a single device pixel box
    pub fn with_device_pixels(target: ElementId, inline_size: u32, block_size: u32) -> Self {
        Self {
            target,
            device_pixel_content_box_size: Some(vec![BoxSize { inline_size, block_size }]),
        }
    }

    /// Entry from a host without device pixel box support
    pub fn without_device_pixels(target: ElementId) -> Self {
        Self { target, device_pixel_content_box_size: None }
    }
}

/// Callback receiving a batch of resize entries
pub type ResizeCallback = Box<dyn FnMut(&[ResizeEntry])>;

/// Live observation; dropping it without `disconnect` leaves it running
pub trait ResizeObservation {
    /// Stop delivery; safe to call more than once
    fn disconnect(&self);
}

/// Environment capability reporting exact device pixel content boxes
pub trait ResizeObserverHost {
    /// Element that is always present, used for capability probing
    fn root_element(&self) -> ElementId;

    /// Observe the device-pixel-content-box of `target`
    fn observe(
        &self,
        target: ElementId,
        callback: ResizeCallback,
    ) -> Result<Box<dyn ResizeObservation>, ObserverError>;
}
