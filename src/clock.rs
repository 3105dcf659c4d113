use std::{
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::Time;

/// Source of the timestamp shared by every point of one export cycle.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now(&self) -> Time;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
    fn now(&self) -> Time {
        let Ok(elapsed) = SystemTime::now().duration_since(UNIX_EPOCH) else {
            return 0;
        };
        u64::try_from(elapsed.as_millis()).unwrap_or(Time::MAX)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Time);
impl Clock for FixedClock {
    fn now(&self) -> Time {
        self.0
    }
}

/// A settable clock that remembers how many times it was read.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
    reads: AtomicUsize,
}
impl ManualClock {
    pub fn new(now: Time) -> Self {
        Self {
            now: AtomicU64::new(now),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, now: Time) {
        self.now.store(now, Ordering::SeqCst);
    }
    pub fn advance(&self, millis: Time) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}
impl Clock for ManualClock {
    fn now(&self) -> Time {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.now.load(Ordering::SeqCst)
    }
}
impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Time {
        (**self).now()
    }
}
