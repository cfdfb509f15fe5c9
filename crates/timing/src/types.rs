//! Timing parameter types: the per-node record a host attaches to every
//! timeline (animation, storyboard, or group).
//!
//! These are immutable once handed to the engine. Changing any field means
//! replacing the record, which bumps the owning tree's epoch.

use anim_common::TimeValue;
use serde::{Deserialize, Serialize};

use crate::error::{TimingError, TimingResult};

/// Length of one simple (unrepeated, unsped) pass of a timeline.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Duration {
    /// Natural length of the content: supplied by the host for leaves,
    /// derived from children for groups.
    #[default]
    Automatic,
    /// Never completes a pass.
    Forever,
    /// Fixed length.
    Time(TimeValue),
}

impl Duration {
    pub fn from_secs(secs: f64) -> Self {
        Self::Time(TimeValue::from_secs(secs))
    }
}

/// How many times a simple pass is replayed.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RepeatBehavior {
    /// Fixed iteration count. Fractional counts end partway through the last
    /// iteration.
    Count(f64),
    /// Replay until this much local time has elapsed, possibly ending partway
    /// through an iteration.
    Duration(TimeValue),
    Forever,
}

impl Default for RepeatBehavior {
    fn default() -> Self {
        Self::Count(1.0)
    }
}

/// What the node does after its active window closes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillBehavior {
    /// Hold the progress reached at the end of the active window.
    #[default]
    HoldEnd,
    /// Hold progress 0 (pre-roll).
    HoldStart,
    /// Stop as soon as the active window closes.
    Stop,
}

/// How a child's delayed start affects its parent.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlipBehavior {
    /// Parent window is left alone; the child simply runs later within it.
    #[default]
    Grow,
    /// Parent window is shifted later by the amount the child was delayed.
    Slip,
}

/// Timing configuration of one timeline node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingParameters {
    /// Offset from the parent's realized start, in the parent's local time.
    /// `None` means the node never starts on its own.
    pub begin: Option<TimeValue>,
    pub duration: Duration,
    /// Local time advances this many times faster than the parent's.
    pub speed_ratio: f64,
    pub repeat: RepeatBehavior,
    /// Each iteration plays forward, then mirrored.
    pub auto_reverse: bool,
    pub fill: FillBehavior,
    pub slip: SlipBehavior,
    /// Fraction of each pass spent accelerating from rest.
    pub acceleration_ratio: f64,
    /// Fraction of each pass spent decelerating to rest.
    pub deceleration_ratio: f64,
}

impl Default for TimingParameters {
    fn default() -> Self {
        Self {
            begin: Some(TimeValue::ZERO),
            duration: Duration::Automatic,
            speed_ratio: 1.0,
            repeat: RepeatBehavior::default(),
            auto_reverse: false,
            fill: FillBehavior::default(),
            slip: SlipBehavior::default(),
            acceleration_ratio: 0.0,
            deceleration_ratio: 0.0,
        }
    }
}

impl TimingParameters {
    /// Parameters starting at the parent's start with the given duration and
    /// every other field at its default.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            ..Self::default()
        }
    }

    /// Check every field for values that cannot be ordered or played.
    pub fn validate(&self) -> TimingResult<()> {
        if !self.speed_ratio.is_finite() || self.speed_ratio <= 0.0 {
            return Err(TimingError::invalid(format!(
                "speed ratio must be positive and finite, got {}",
                self.speed_ratio
            )));
        }

        if let Duration::Time(d) = self.duration {
            if d.is_negative() {
                return Err(TimingError::invalid(format!("negative duration {d}")));
            }
        }

        match self.repeat {
            RepeatBehavior::Count(count) if !count.is_finite() || count < 0.0 => {
                return Err(TimingError::invalid(format!(
                    "repeat count must be finite and non-negative, got {count}"
                )));
            }
            RepeatBehavior::Duration(d) if d.is_negative() => {
                return Err(TimingError::invalid(format!("negative repeat duration {d}")));
            }
            _ => {}
        }

        let accel = self.acceleration_ratio;
        let decel = self.deceleration_ratio;
        if !(0.0..=1.0).contains(&accel) {
            return Err(TimingError::invalid(format!(
                "acceleration ratio {accel} outside [0, 1]"
            )));
        }
        if !(0.0..=1.0).contains(&decel) {
            return Err(TimingError::invalid(format!(
                "deceleration ratio {decel} outside [0, 1]"
            )));
        }
        if accel + decel > 1.0 {
            return Err(TimingError::invalid(format!(
                "acceleration ({accel}) and deceleration ({decel}) ratios sum above 1"
            )));
        }

        Ok(())
    }

    /// Total local length of the active period given the resolved simple
    /// duration (`INFINITY` for a forever pass).
    ///
    /// Autoreverse doubles each iteration. A zero-length iteration stays zero
    /// regardless of repeat, so a forever-repeating instant still fires once.
    pub fn active_duration(&self, simple: TimeValue) -> TimeValue {
        if simple.is_infinite() {
            return TimeValue::INFINITY;
        }
        let iteration = if self.auto_reverse {
            simple + simple
        } else {
            simple
        };
        if iteration == TimeValue::ZERO {
            return TimeValue::ZERO;
        }
        match self.repeat {
            RepeatBehavior::Count(count) => iteration.scale(count),
            RepeatBehavior::Duration(d) => d,
            RepeatBehavior::Forever => TimeValue::INFINITY,
        }
    }
}
