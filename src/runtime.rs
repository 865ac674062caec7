// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The clock abstraction the scheduler reads `now()` from.
//!
//! Full `Runtime` implementations elsewhere in the stack also own the
//! NIC/transmit path, the async executor, etc. The scheduler only ever
//! needs "what time is it", so it depends on this narrower trait instead
//! of the whole `Runtime` surface — that keeps `MetaConnection` generic
//! over a `Clock` that tests can drive by hand.

use std::{
    cell::Cell,
    time::Instant,
};

/// Anything that can answer "what time is it".
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The clock used outside of tests: delegates straight to `Instant::now()`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock a test can advance by hand, so RTT/rate-limit math (srtt_us/8,
/// etc.) is exercised deterministically instead of racing the wall clock.
#[derive(Debug)]
pub struct TestClock {
    now: Cell<Instant>,
}

impl TestClock {
    pub fn new(start: Instant) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance(&self, delta: std::time::Duration) {
        self.now.set(self.now.get() + delta);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}
