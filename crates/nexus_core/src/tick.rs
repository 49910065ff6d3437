//! Wrap-around tick arithmetic.
//!
//! The wire tick counter is a 16-bit value that wraps every ~18 minutes at a
//! 60Hz tick rate. Every comparison between two ticks must go through
//! [`seq_diff`] rather than a plain `<`/`>`, or it silently breaks the moment
//! the counter wraps.

use std::fmt;

/// A 16-bit wrap-around simulation tick.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Tick(u16);

impl Tick {
    /// Wraps a raw tick value.
    #[inline]
    #[must_use]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Returns the raw wire value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Advances the tick by `delta`, wrapping past `u16::MAX`.
    #[inline]
    #[must_use]
    pub const fn wrapping_add(self, delta: u16) -> Self {
        Self(self.0.wrapping_add(delta))
    }

    /// Signed distance from `other` to `self`, short way around the circle.
    #[inline]
    #[must_use]
    pub fn diff_from(self, other: Self) -> i32 {
        seq_diff(self.0, other.0)
    }

    /// True if `self` is strictly after `other` on the short arc.
    #[inline]
    #[must_use]
    pub fn is_after(self, other: Self) -> bool {
        self.diff_from(other) > 0
    }

    /// True if `self` is at or after `other` on the short arc.
    #[inline]
    #[must_use]
    pub fn is_at_or_after(self, other: Self) -> bool {
        self.diff_from(other) >= 0
    }
}

impl fmt::Debug for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tick({})", self.0)
    }
}

/// Signed circular distance `a - b`, treating the short arc around the
/// 16-bit wheel as the truth. `a > b` in sequence order iff the result is
/// positive.
#[inline]
#[must_use]
pub fn seq_diff(a: u16, b: u16) -> i32 {
    i32::from(a.wrapping_sub(b) as i16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_around_boundary() {
        assert_eq!(seq_diff(1, 65535), 2);
        assert_eq!(seq_diff(65535, 1), -2);
    }

    #[test]
    fn ordinary_order() {
        assert!(seq_diff(101, 100) > 0);
        assert!(seq_diff(100, 101) < 0);
        assert_eq!(seq_diff(100, 100), 0);
    }

    #[test]
    fn tick_is_after() {
        let a = Tick::new(65535);
        let b = Tick::new(1);
        assert!(b.is_after(a));
        assert!(!a.is_after(b));
    }
}
