use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, Either};

use crate::traits::{ResizeObserverHost, Timer};

/// Default upper bound on waiting for the probe notification
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

/// One-shot check for device-pixel-content-box support
///
/// Observes the host's root element once and reports whether the first
/// notification carried device pixel boxes. Never fails: observation errors,
/// a dropped callback and the timeout all resolve to `false`. The answer is
/// memoized per probe instance, not process wide.
pub struct CapabilityProbe {
    host: Rc<dyn ResizeObserverHost>,
    timer: Rc<dyn Timer>,
    timeout: Duration,
    result: Cell<Option<bool>>,
}

impl CapabilityProbe {
    pub fn new(host: Rc<dyn ResizeObserverHost>, timer: Rc<dyn Timer>) -> Self {
        Self {
            host,
            timer,
            timeout: DEFAULT_PROBE_TIMEOUT,
            result: Cell::new(None),
        }
    }

    /// Set how long to wait for the first notification
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Memoized answer, if the probe already completed
    pub fn cached(&self) -> Option<bool> {
        self.result.get()
    }

    /// Resolve whether the host reports device pixel content boxes
    pub async fn probe(&self) -> bool {
        if let Some(supported) = self.result.get() {
            return supported;
        }
        let supported = self.run().await;
        self.result.set(Some(supported));
        supported
    }

    async fn run(&self) -> bool {
        let (sender, receiver) = oneshot::channel();
        let mut sender = Some(sender);

        let observation = match self.host.observe(
            self.host.root_element(),
            Box::new(move |entries| {
                if let Some(sender) = sender.take() {
                    let supported = entries
                        .iter()
                        .all(|entry| entry.device_pixel_content_box_size.is_some());
                    let _ = sender.send(supported);
                }
            }),
        ) {
            Ok(observation) => observation,
            Err(err) => {
                log::debug!("capability probe: {err}");
                return false;
            }
        };

        let supported = match future::select(receiver, self.timer.delay(self.timeout)).await {
            Either::Left((Ok(supported), _)) => supported,
            Either::Left((Err(_canceled), _)) => false,
            Either::Right(((), _)) => {
                log::warn!(
                    "capability probe got no notification within {:?}, assuming unsupported",
                    self.timeout
                );
                false
            }
        };

        observation.disconnect();
        log::debug!("device-pixel-content-box supported: {supported}");
        supported
    }
}
