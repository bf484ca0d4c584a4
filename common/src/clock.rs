// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use std::time::{Duration, Instant};

/// Time source for the polling loops.
pub trait Clock {
    /// Time passed since the clock was created.
    fn elapsed(&self) -> Duration;

    fn sleep(&mut self, duration: Duration);
}

/// Wall clock: real sleeps, measured with [`Instant`].
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when slept on.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Duration,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&mut self, duration: Duration) {
        self.now += duration;
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.advance(duration);
    }
}

#[test]
fn test_manual_clock_moves_on_sleep() {
    let mut clock = ManualClock::new();
    clock.sleep(Duration::from_secs(2));
    clock.sleep(Duration::from_millis(500));

    assert_eq!(clock.elapsed(), Duration::from_millis(2500));
}
