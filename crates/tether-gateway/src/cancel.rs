//! Single-use cooperative cancellation
//!
//! A [`CancelSignal`] is created with each session start and owned by the
//! supervisor of that session. Firing it is idempotent and never blocks, so
//! late signals (after teardown) and duplicate signals are harmless.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Returns true only for the call that actually fired.
    pub fn signal(&self) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_signaled(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Resolves once the signal has fired, immediately if it already has
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}
