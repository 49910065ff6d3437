//! Inter-fragment jitter sampling.
//!
//! Shared between the snapshot store (which records a sample on every
//! accepted diff fragment) and the interpolation pipeline (which derives
//! `adaptive_midpoint` from the ring at every preload).

use std::collections::VecDeque;
use std::time::Instant;

/// Size of the jitter sample ring, per §4.2.
pub const JITTER_SAMPLE_CAPACITY: usize = 10;

/// A ring of the last `JITTER_SAMPLE_CAPACITY` inter-fragment arrival gaps.
pub struct JitterTracker {
    samples: VecDeque<f32>,
    last_accept: Option<Instant>,
}

impl JitterTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self { samples: VecDeque::with_capacity(JITTER_SAMPLE_CAPACITY), last_accept: None }
    }

    /// Records acceptance of a fragment "now", pushing the elapsed time
    /// since the previous acceptance (if any) into the ring.
    pub fn record_accept(&mut self) {
        let now = Instant::now();
        if let Some(prev) = self.last_accept {
            if self.samples.len() == JITTER_SAMPLE_CAPACITY {
                self.samples.pop_front();
            }
            self.samples.push_back(now.duration_since(prev).as_secs_f32());
        }
        self.last_accept = Some(now);
    }

    /// Restarts the timer without recording a sample — called on baseline
    /// install so the first post-baseline fragment doesn't look like a
    /// multi-second stall.
    pub fn reset_timer(&mut self) {
        self.last_accept = None;
    }

    /// The current ring contents, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }
}

impl Default for JitterTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_accept_records_no_sample() {
        let mut tracker = JitterTracker::new();
        tracker.record_accept();
        assert_eq!(tracker.samples().count(), 0);
    }

    #[test]
    fn ring_caps_at_capacity() {
        let mut tracker = JitterTracker::new();
        for _ in 0..(JITTER_SAMPLE_CAPACITY + 5) {
            tracker.record_accept();
        }
        assert_eq!(tracker.samples().count(), JITTER_SAMPLE_CAPACITY);
    }
}
