// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Nexus Signal Fusion Engine - Time Source

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// Wall-clock source. Every time-dependent rule in the engine (hysteresis
/// discounts, node TTL, resource probe throttle) reads through this.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { instant: Arc::new(Mutex::new(start)) }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.instant.lock();
        *guard += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.instant.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::default();
        let view = clock.clone();
        clock.advance(Duration::seconds(90));
        assert_eq!(view.now(), DateTime::<Utc>::default() + Duration::seconds(90));
    }
}
