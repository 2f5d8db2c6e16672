use serde::{Deserialize, Serialize};

use crate::error::{Axis, Error, Result};

/// Integer 2D size in pixels
///
/// Both dimensions are non-negative by construction. Sizes coming from
/// signed or floating point arithmetic go through [`Size::try_new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    /// Create size from unsigned dimensions
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Create size from signed dimensions, rejecting negative values
    ///
    /// Dimensions above `u32::MAX` are clamped to `u32::MAX`.
    pub fn try_new(width: i64, height: i64) -> Result<Self> {
        Ok(Self {
            width: dimension(Axis::Width, width)?,
            height: dimension(Axis::Height, height)?,
        })
    }

    /// Zero-area size
    pub const fn zero() -> Self {
        Self::new(0, 0)
    }

    /// Number of pixels covered
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl TryFrom<(i64, i64)> for Size {
    type Error = Error;

    fn try_from((width, height): (i64, i64)) -> Result<Self> {
        Self::try_new(width, height)
    }
}

impl From<(u32, u32)> for Size {
    fn from((width, height): (u32, u32)) -> Self {
        Self::new(width, height)
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

fn dimension(axis: Axis, value: i64) -> Result<u32> {
    if value < 0 {
        return Err(Error::NegativeDimension { axis, value });
    }
    Ok(u32::try_from(value).unwrap_or(u32::MAX))
}

/// Round half toward positive infinity, matching browser layout rounding
///
/// Saturates at the `i64` range for non-finite or huge inputs; NaN maps to 0.
pub(crate) fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}
