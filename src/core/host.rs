//! Host-side plumbing shared by every environment
//!
//! [`DisplayRatio`] owns a device pixel ratio and its match-based listeners;
//! [`ResizeQueue`] owns resize observations and the entries waiting to be
//! delivered to them. Environments wrap these and decide when ratios change
//! and which entries to queue.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::executor::LocalPool;

use crate::traits::{
    DisplayContext, ElementId, ListenerHandle, ResizeCallback, ResizeEntry, ResizeObservation,
    ResolutionListener,
};

use super::listeners::ResolutionListenerRegistry;

/// Device pixel ratio with resolution listeners
pub struct DisplayRatio {
    ratio: Cell<f64>,
    listeners: RefCell<ResolutionListenerRegistry>,
}

impl DisplayRatio {
    pub fn new(device_pixel_ratio: f64) -> Self {
        Self {
            ratio: Cell::new(device_pixel_ratio),
            listeners: RefCell::new(ResolutionListenerRegistry::new()),
        }
    }

    /// Change the ratio and fire listeners whose match state flipped
    pub fn set(&self, ratio: f64) {
        let old = self.ratio.replace(ratio);
        if old == ratio {
            return;
        }
        let due = self.listeners.borrow().due(old, ratio);
        for listener in due {
            listener();
        }
    }

    /// Live native listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl DisplayContext for DisplayRatio {
    fn device_pixel_ratio(&self) -> f64 {
        self.ratio.get()
    }

    fn add_resolution_listener(&self, dppx: f64, listener: ResolutionListener) -> ListenerHandle {
        self.listeners.borrow_mut().add(dppx, listener)
    }

    fn remove_resolution_listener(&self, handle: ListenerHandle) {
        self.listeners.borrow_mut().remove(handle);
    }
}

struct ObservationRecord {
    target: ElementId,
    callback: Rc<RefCell<ResizeCallback>>,
    active: Rc<Cell<bool>>,
}

/// Resize observations with explicitly flushed deliveries
#[derive(Default)]
pub struct ResizeQueue {
    observations: RefCell<Vec<ObservationRecord>>,
    pending: RefCell<Vec<ResizeEntry>>,
}

impl ResizeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start delivering entries for `target` to `callback`
    pub fn register(&self, target: ElementId, callback: ResizeCallback) -> Box<dyn ResizeObservation> {
        let active = Rc::new(Cell::new(true));
        self.observations.borrow_mut().push(ObservationRecord {
            target,
            callback: Rc::new(RefCell::new(callback)),
            active: Rc::clone(&active),
        });
        Box::new(QueuedObservation { active })
    }

    pub fn push(&self, entry: ResizeEntry) {
        self.pending.borrow_mut().push(entry);
    }

    /// Deliver queued entries to the observations watching their targets
    ///
    /// Returns whether anything was queued. Callbacks may queue more entries;
    /// those wait for the next flush.
    pub fn flush(&self) -> bool {
        let pending: Vec<ResizeEntry> = self.pending.borrow_mut().drain(..).collect();
        if pending.is_empty() {
            return false;
        }
        for (target, callback) in self.active_callbacks() {
            let batch: Vec<ResizeEntry> =
                pending.iter().filter(|entry| entry.target == target).cloned().collect();
            if !batch.is_empty() {
                let mut callback = callback.borrow_mut();
                (*callback)(&batch);
            }
        }
        true
    }

    /// Deliver `entries` verbatim to every active observation
    pub fn deliver_to_all(&self, entries: &[ResizeEntry]) {
        for (_, callback) in self.active_callbacks() {
            let mut callback = callback.borrow_mut();
            (*callback)(entries);
        }
    }

    pub fn active_count(&self) -> usize {
        self.observations.borrow().iter().filter(|record| record.active.get()).count()
    }

    fn active_callbacks(&self) -> Vec<(ElementId, Rc<RefCell<ResizeCallback>>)> {
        let mut observations = self.observations.borrow_mut();
        observations.retain(|record| record.active.get());
        observations
            .iter()
            .map(|record| (record.target, Rc::clone(&record.callback)))
            .collect()
    }
}

struct QueuedObservation {
    active: Rc<Cell<bool>>,
}

impl ResizeObservation for QueuedObservation {
    fn disconnect(&self) {
        self.active.set(false);
    }
}

/// Alternate between the local executor and resize deliveries until both
/// are idle
///
/// A capability probe waits on the first delivery, and a resolved probe
/// queues the binding's own initial observation, so a single pass of each
/// leaves work behind.
pub fn run_until_quiescent(pool: &mut LocalPool, mut flush: impl FnMut() -> bool) {
    loop {
        pool.run_until_stalled();
        if !flush() {
            break;
        }
    }
}
