// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// Millisecond tick source. Never goes backwards.
pub trait Monotonic {
    fn now_ms(&self) -> u64;
}

impl<T: Monotonic + ?Sized> Monotonic for &T {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// A deadline relative to the last reset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timeout {
    start: u64,
    duration: u64,
}

impl Timeout {
    pub const fn new(now: u64, duration_ms: u64) -> Self {
        Self {
            start: now,
            duration: duration_ms,
        }
    }

    /// Push the deadline out by a full duration from `now`.
    pub fn reset(&mut self, now: u64) {
        self.start = now;
    }

    pub fn elapsed(&self, now: u64) -> bool {
        now.saturating_sub(self.start) >= self.duration
    }

    pub fn deadline(&self) -> u64 {
        self.start.saturating_add(self.duration)
    }
}

#[cfg(feature = "std")]
pub use system::SystemClock;

#[cfg(feature = "std")]
mod system {
    use std::time::Instant;

    /// Wall clock time since construction.
    #[derive(Debug, Clone, Copy)]
    pub struct SystemClock {
        origin: Instant,
    }

    impl SystemClock {
        pub fn new() -> Self {
            Self { origin: Instant::now() }
        }
    }

    impl Default for SystemClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl super::Monotonic for SystemClock {
        fn now_ms(&self) -> u64 {
            self.origin.elapsed().as_millis() as u64
        }
    }
}
