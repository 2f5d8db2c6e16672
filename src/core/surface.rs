use std::cell::Cell;
use std::rc::Rc;

use serde::Serialize;

use crate::config::ApplyPolicy;
use crate::error::Result;
use crate::size::Size;

use super::binding::{BitmapSizeBinding, Strategy};
use super::listeners::SubscriptionId;

/// Backing store size to render the next frame at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub bitmap: Size,
    /// Bitmap differs from the previous frame's
    pub resized: bool,
}

/// Point-in-time view of a surface, for logging and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SurfaceSnapshot {
    pub strategy: Strategy,
    pub client_size: Size,
    pub bitmap_size: Size,
    pub suggested_bitmap_size: Option<Size>,
    pub frames: u64,
}

/// Renderer-side owner of a bitmap size binding
///
/// Forwards container resizes to the binding and commits suggestions
/// according to its [`ApplyPolicy`].
pub struct CanvasSurface {
    binding: BitmapSizeBinding,
    policy: ApplyPolicy,
    dirty: Rc<Cell<bool>>,
    subscription: SubscriptionId,
    last_bitmap: Option<Size>,
    frames: u64,
}

impl CanvasSurface {
    pub fn new(binding: BitmapSizeBinding, policy: ApplyPolicy) -> Result<Self> {
        let dirty = Rc::new(Cell::new(false));
        let weak = binding.downgrade();
        let flag = Rc::clone(&dirty);

        let subscription = binding.subscribe_suggested_bitmap_size_changed(move |_, new| {
            if new.is_none() {
                return;
            }
            match policy {
                ApplyPolicy::Immediate => {
                    if let Some(binding) = weak.upgrade() {
                        if let Err(err) = binding.apply_suggested_bitmap_size() {
                            log::error!("failed to apply suggested bitmap size: {err}");
                        }
                    }
                }
                ApplyPolicy::NextFrame => flag.set(true),
            }
        })?;

        // The fallback strategy may have suggested a size before we subscribed
        if binding.suggested_bitmap_size()?.is_some() {
            match policy {
                ApplyPolicy::Immediate => binding.apply_suggested_bitmap_size()?,
                ApplyPolicy::NextFrame => dirty.set(true),
            }
        }

        Ok(Self {
            binding,
            policy,
            dirty,
            subscription,
            last_bitmap: None,
            frames: 0,
        })
    }

    pub fn binding(&self) -> &BitmapSizeBinding {
        &self.binding
    }

    pub fn policy(&self) -> ApplyPolicy {
        self.policy
    }

    /// A suggestion is waiting for the next frame
    pub fn needs_apply(&self) -> bool {
        self.dirty.get()
    }

    /// Forward a container layout change
    pub fn resize_container(&self, size: Size) -> Result<()> {
        self.binding.resize_client_layout(size)
    }

    /// Commit any pending suggestion and report the size to draw at
    pub fn begin_frame(&mut self) -> Result<FrameSize> {
        if self.dirty.replace(false) {
            self.binding.apply_suggested_bitmap_size()?;
        }

        let bitmap = self.binding.bitmap_size()?;
        let resized = self.last_bitmap != Some(bitmap);
        self.last_bitmap = Some(bitmap);
        self.frames += 1;
        Ok(FrameSize { bitmap, resized })
    }

    pub fn snapshot(&self) -> Result<SurfaceSnapshot> {
        Ok(SurfaceSnapshot {
            strategy: self.binding.strategy(),
            client_size: self.binding.client_size()?,
            bitmap_size: self.binding.bitmap_size()?,
            suggested_bitmap_size: self.binding.suggested_bitmap_size()?,
            frames: self.frames,
        })
    }

    /// Stop listening and dispose the binding
    pub fn dispose(self) -> Result<()> {
        self.binding.unsubscribe_suggested_bitmap_size_changed(self.subscription);
        self.binding.dispose()
    }
}
