use std::time::Duration;

use futures::future::LocalBoxFuture;

/// Source of delays for the single-threaded executor
pub trait Timer {
    /// Future completing once `duration` has elapsed
    fn delay(&self, duration: Duration) -> LocalBoxFuture<'static, ()>;
}
