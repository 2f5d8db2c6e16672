use crate::size::Size;

/// Identity of an observable element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub u64);

/// Layout box of an element in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ClientRect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self { left, top, width, height }
    }
}

/// Canvas-like element with a layout size and a separate backing store
///
/// Methods take `&self`: elements are shared handles with interior state,
/// the same way a DOM node is.
pub trait CanvasElement {
    fn id(&self) -> ElementId;

    /// Layout size in CSS pixels
    fn client_size(&self) -> Size;

    /// Apply a CSS width/height to the element
    fn set_style_size(&self, size: Size);

    /// Backing store dimensions
    fn bitmap_size(&self) -> Size;

    /// Reallocate the backing store
    fn set_bitmap_size(&self, size: Size);

    /// First layout box, if the element is laid out
    fn client_rect(&self) -> Option<ClientRect>;
}
