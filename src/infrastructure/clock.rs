use crate::domain::Timestamp;
use crate::domain::ports::Clock;
use crate::error::{BillingError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A clock driven explicitly by its owner, e.g. one tick per replayed block.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Moves the clock to `at`. Time never goes backwards.
    pub fn advance_to(&self, at: Timestamp) -> Result<()> {
        self.now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (at >= current).then_some(at)
            })
            .map(|_| ())
            .map_err(|current| {
                BillingError::InvalidParameter(format!(
                    "clock cannot move backwards from {current} to {at}"
                ))
            })
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Wall-clock seconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default()
    }
}
