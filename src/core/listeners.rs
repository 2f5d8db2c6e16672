use std::rc::Rc;

use crate::traits::{ListenerHandle, ResolutionListener};

/// Token returned by `subscribe_*` calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Ordered list of subscriber callbacks
///
/// Callers take a `snapshot` and invoke it after releasing any borrow, so
/// callbacks may subscribe, unsubscribe or call back into the owner.
pub struct ListenerList<F: ?Sized> {
    next_id: u64,
    entries: Vec<(SubscriptionId, Rc<F>)>,
}

impl<F: ?Sized> ListenerList<F> {
    pub fn new() -> Self {
        Self { next_id: 0, entries: Vec::new() }
    }

    pub fn add(&mut self, listener: Rc<F>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, listener));
        id
    }

    /// Remove a subscriber, returns false if it was not present
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry_id, _)| *entry_id != id);
        self.entries.len() != before
    }

    /// Current subscribers in subscription order
    pub fn snapshot(&self) -> Vec<Rc<F>> {
        self.entries.iter().map(|(_, listener)| Rc::clone(listener)).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<F: ?Sized> Default for ListenerList<F> {
    fn default() -> Self {
        Self::new()
    }
}

struct ResolutionEntry {
    handle: ListenerHandle,
    dppx: f64,
    listener: ResolutionListener,
}

/// Match-based resolution listeners, shared by the display implementations
///
/// A listener registered at `dppx` is due when a ratio change flips whether
/// the display matches `dppx`.
#[derive(Default)]
pub struct ResolutionListenerRegistry {
    next_handle: u64,
    entries: Vec<ResolutionEntry>,
}

impl ResolutionListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, dppx: f64, listener: ResolutionListener) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push(ResolutionEntry { handle, dppx, listener });
        handle
    }

    pub fn remove(&mut self, handle: ListenerHandle) {
        self.entries.retain(|entry| entry.handle != handle);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Listeners whose match state differs between `old_ratio` and `new_ratio`
    pub fn due(&self, old_ratio: f64, new_ratio: f64) -> Vec<ResolutionListener> {
        self.entries
            .iter()
            .filter(|entry| (entry.dppx == old_ratio) != (entry.dppx == new_ratio))
            .map(|entry| Rc::clone(&entry.listener))
            .collect()
    }
}
