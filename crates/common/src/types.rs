//! Core time type with newtype pattern for type safety.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Number of ticks in one second (one tick = 100 ns).
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Ticks per millisecond.
pub const TICKS_PER_MILLISECOND: i64 = 10_000;

/// A signed point in time or duration, counted in 100 ns ticks.
///
/// Totally ordered. `INFINITY` is a sentinel greater than every finite value;
/// addition treats it as absorbing and finite arithmetic saturates instead of
/// overflowing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeValue(i64);

impl TimeValue {
    pub const ZERO: Self = Self(0);
    pub const INFINITY: Self = Self(i64::MAX);
    pub const MIN: Self = Self(i64::MIN);

    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(TICKS_PER_MILLISECOND))
    }

    /// Convert seconds to ticks, rounding to the nearest tick.
    ///
    /// Out-of-range values saturate; NaN maps to zero. Use [`Self::try_from_secs`]
    /// for untrusted input.
    pub fn from_secs(secs: f64) -> Self {
        if secs == f64::INFINITY {
            return Self::INFINITY;
        }
        Self((secs * TICKS_PER_SECOND as f64).round() as i64)
    }

    /// Like [`Self::from_secs`] but rejects NaN.
    pub fn try_from_secs(secs: f64) -> Option<Self> {
        if secs.is_nan() {
            None
        } else {
            Some(Self::from_secs(secs))
        }
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    pub fn as_secs(self) -> f64 {
        if self.is_infinite() {
            f64::INFINITY
        } else {
            self.0 as f64 / TICKS_PER_SECOND as f64
        }
    }

    pub const fn is_infinite(self) -> bool {
        self.0 == i64::MAX
    }

    pub const fn is_finite(self) -> bool {
        !self.is_infinite()
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Multiply by a real factor, rounding to the nearest tick.
    ///
    /// Infinity stays infinite for any positive factor. Results past the
    /// representable range saturate.
    pub fn scale(self, factor: f64) -> Self {
        if self.is_infinite() {
            return if factor > 0.0 { Self::INFINITY } else { Self::ZERO };
        }
        let scaled = (self.0 as f64 * factor).round();
        if scaled.is_nan() {
            Self::ZERO
        } else {
            // `as` saturates at the i64 bounds.
            Self(scaled as i64)
        }
    }
}

impl Add for TimeValue {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        if self.is_infinite() || rhs.is_infinite() {
            Self::INFINITY
        } else {
            Self(self.0.saturating_add(rhs.0))
        }
    }
}

impl AddAssign for TimeValue {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for TimeValue {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        if self.is_infinite() {
            Self::INFINITY
        } else if rhs.is_infinite() {
            Self::MIN
        } else {
            // Saturating toward +max would alias the infinity sentinel.
            Self(self.0.saturating_sub(rhs.0).min(i64::MAX - 1))
        }
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "inf")
        } else {
            write!(f, "{:.3}s", self.as_secs())
        }
    }
}
