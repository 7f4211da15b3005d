use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::CoreError;
use crate::ids::Timestamp;

/// Returns the current wall-clock time as whole seconds since Unix epoch.
pub fn physical_now() -> Result<Timestamp, CoreError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| Timestamp::from_secs(d.as_secs() as i64))
        .map_err(|_| CoreError::InvalidData("system clock before epoch".into()))
}

/// Source of "now" for liveness, merge stamping and command timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<Timestamp, CoreError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Result<Timestamp, CoreError> {
        physical_now()
    }
}

/// A clock that only moves when told to. Shared between a client and a bridge in tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    secs: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            secs: AtomicI64::new(start.as_secs()),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.secs.store(at.as_secs(), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) -> Timestamp {
        let now = self.secs.fetch_add(secs, Ordering::SeqCst) + secs;
        Timestamp::from_secs(now)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<Timestamp, CoreError> {
        Ok(Timestamp::from_secs(self.secs.load(Ordering::SeqCst)))
    }
}
