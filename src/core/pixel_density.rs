use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};
use crate::traits::{DisplayContext, ListenerHandle};

use super::listeners::{ListenerList, SubscriptionId};

/// Lifecycle of the native resolution listener
///
/// `Installed -> Firing -> Reinstalling -> Installed` on every density
/// change; `Uninstalled` after an explicit uninstall or disposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerPhase {
    Uninstalled,
    Installed,
    Firing,
    Reinstalling,
}

struct ObservableState {
    display: Option<Rc<dyn DisplayContext>>,
    handle: Option<ListenerHandle>,
    installed_ratio: Option<f64>,
    phase: ListenerPhase,
    reinstalls: u64,
    subscribers: ListenerList<dyn Fn(f64)>,
    weak_self: Weak<RefCell<ObservableState>>,
}

impl ObservableState {
    fn install_listener(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(Error::ListenerAlreadyInstalled);
        }
        let display = self.display.as_ref().ok_or(Error::Disposed)?;

        // Match queries only fire when crossing this exact ratio
        let dppx = display.device_pixel_ratio();
        let weak = self.weak_self.clone();
        let handle = display.add_resolution_listener(
            dppx,
            Rc::new(move || {
                if let Some(state) = weak.upgrade() {
                    on_resolution_changed(&state);
                }
            }),
        );

        self.handle = Some(handle);
        self.installed_ratio = Some(dppx);
        self.phase = ListenerPhase::Installed;
        Ok(())
    }

    fn uninstall_listener(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Some(display) = &self.display {
                display.remove_resolution_listener(handle);
            }
        }
        self.installed_ratio = None;
        self.phase = ListenerPhase::Uninstalled;
    }
}

impl Drop for ObservableState {
    fn drop(&mut self) {
        self.uninstall_listener();
    }
}

fn on_resolution_changed(state: &Rc<RefCell<ObservableState>>) {
    let (display, subscribers) = {
        let mut state = state.borrow_mut();
        let Some(display) = state.display.clone() else {
            return;
        };
        state.phase = ListenerPhase::Firing;
        (display, state.subscribers.snapshot())
    };

    let ratio = display.device_pixel_ratio();
    for subscriber in subscribers {
        subscriber(ratio);
    }

    let mut state = state.borrow_mut();
    if state.display.is_none() {
        // Disposed by a subscriber
        return;
    }
    state.phase = ListenerPhase::Reinstalling;
    state.uninstall_listener();
    match state.install_listener() {
        Ok(()) => {
            state.reinstalls += 1;
            log::debug!("resolution listener reinstalled at {ratio}dppx");
        }
        Err(err) => log::error!("failed to reinstall resolution listener: {err}"),
    }
}

/// Observable device pixel ratio of a display
///
/// The native listener does not renew itself after a density change, so
/// the observable re-registers at the new ratio after notifying subscribers.
pub struct PixelDensityObservable {
    state: Rc<RefCell<ObservableState>>,
}

impl PixelDensityObservable {
    /// Create observable and install the resolution listener
    pub fn new(display: Rc<dyn DisplayContext>) -> Result<Self> {
        let state = Rc::new_cyclic(|weak_self| {
            RefCell::new(ObservableState {
                display: Some(display),
                handle: None,
                installed_ratio: None,
                phase: ListenerPhase::Uninstalled,
                reinstalls: 0,
                subscribers: ListenerList::new(),
                weak_self: weak_self.clone(),
            })
        });
        state.borrow_mut().install_listener()?;
        Ok(Self { state })
    }

    /// Live device pixel ratio
    pub fn current_value(&self) -> Result<f64> {
        let state = self.state.borrow();
        let display = state.display.as_ref().ok_or(Error::Disposed)?;
        Ok(display.device_pixel_ratio())
    }

    /// Subscribe to ratio changes
    pub fn subscribe(&self, callback: impl Fn(f64) + 'static) -> Result<DensitySubscription> {
        let mut state = self.state.borrow_mut();
        if state.display.is_none() {
            return Err(Error::Disposed);
        }
        let id = state.subscribers.add(Rc::new(callback));
        Ok(DensitySubscription { state: Rc::downgrade(&self.state), id })
    }

    /// Install the native listener at the current ratio
    ///
    /// Fails with [`Error::ListenerAlreadyInstalled`] if one is active.
    pub fn install_resolution_listener(&self) -> Result<()> {
        self.state.borrow_mut().install_listener()
    }

    /// Remove the native listener; silent when none is installed
    pub fn uninstall_resolution_listener(&self) {
        self.state.borrow_mut().uninstall_listener();
    }

    /// Handle of the installed native listener
    pub fn listener_handle(&self) -> Option<ListenerHandle> {
        self.state.borrow().handle
    }

    /// Ratio the current listener was registered at
    pub fn installed_ratio(&self) -> Option<f64> {
        self.state.borrow().installed_ratio
    }

    pub fn phase(&self) -> ListenerPhase {
        self.state.borrow().phase
    }

    /// Number of completed reinstalls after density changes
    pub fn reinstall_count(&self) -> u64 {
        self.state.borrow().reinstalls
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.borrow().subscribers.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.borrow().display.is_none()
    }

    /// Remove the listener and release the display; repeated calls are no-ops
    pub fn dispose(&self) {
        let mut state = self.state.borrow_mut();
        state.uninstall_listener();
        state.subscribers.clear();
        state.display = None;
    }
}

/// Subscription handle returned by [`PixelDensityObservable::subscribe`]
#[derive(Debug)]
pub struct DensitySubscription {
    state: Weak<RefCell<ObservableState>>,
    id: SubscriptionId,
}

impl DensitySubscription {
    /// Stop receiving notifications, returns false if already gone
    pub fn unsubscribe(self) -> bool {
        match self.state.upgrade() {
            Some(state) => state.borrow_mut().subscribers.remove(self.id),
            None => false,
        }
    }
}
