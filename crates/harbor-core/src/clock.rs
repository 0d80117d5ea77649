use chrono::{DateTime, Local, Timelike, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

/// Source of "now" for retention age checks and time-of-day policy.
/// Injected everywhere a timestamp is read so tests can control time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Hour of day (0-23) in the owner's local timezone.
    fn local_hour(&self) -> u32;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_hour(&self) -> u32 {
        Local::now().hour()
    }
}

/// A clock that tests can set and advance.
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<RwLock<ManualState>>,
}

struct ManualState {
    now: DateTime<Utc>,
    local_hour: u32,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ManualState {
                now,
                local_hour: now.hour(),
            })),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        let mut state = self.inner.write();
        state.now = now;
        state.local_hour = now.hour();
    }

    pub fn set_local_hour(&self, hour: u32) {
        self.inner.write().local_hour = hour % 24;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut state = self.inner.write();
        state.now += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.read().now
    }

    fn local_hour(&self) -> u32 {
        self.inner.read().local_hour
    }
}
