//! Cancellable delay between listing rechecks

use crate::error::ConsistencyError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Waits out recheck periods unless cancelled
#[derive(Debug, Clone, Default)]
pub struct RecheckScheduler {
    cancel: CancellationToken,
}

impl RecheckScheduler {
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Sleep for `period`, or fail with [`ConsistencyError::Cancelled`]
    pub async fn wait(&self, period: Duration) -> Result<(), ConsistencyError> {
        if self.cancel.is_cancelled() {
            return Err(ConsistencyError::Cancelled);
        }
        tokio::select! {
            () = self.cancel.cancelled() => Err(ConsistencyError::Cancelled),
            () = tokio::time::sleep(period) => Ok(()),
        }
    }

    /// Abort every pending and future wait
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
