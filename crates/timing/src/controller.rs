//! Interactive clock control: begin, pause, resume, seek, stop, speed.
//!
//! The controller maps a monotonically increasing host time (wall clock,
//! frame counter) to the global time fed into [`TimingTree::evaluate`].
//!
//! [`TimingTree::evaluate`]: crate::tree::TimingTree::evaluate

use anim_common::TimeValue;
use serde::{Deserialize, Serialize};

use crate::error::{TimingError, TimingResult};
use crate::tree::{NodeId, ResolvedTiming};

/// Transport state of a [`ClockController`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControllerState {
    /// No global time; every node samples as stopped.
    #[default]
    Stopped,
    /// Global time advances with host time.
    Running,
    /// Global time is frozen.
    Paused,
}

/// Host-driven source of global time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClockController {
    state: ControllerState,
    /// Global time at `anchor_host`.
    anchor_global: TimeValue,
    /// Host time from which a running clock advances.
    anchor_host: TimeValue,
    speed_ratio: f64,
}

impl Default for ClockController {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockController {
    /// A stopped controller at global time zero, speed 1.
    pub fn new() -> Self {
        Self {
            state: ControllerState::Stopped,
            anchor_global: TimeValue::ZERO,
            anchor_host: TimeValue::ZERO,
            speed_ratio: 1.0,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn speed_ratio(&self) -> f64 {
        self.speed_ratio
    }

    /// Start from global time zero at `host_now`.
    pub fn begin(&mut self, host_now: TimeValue) {
        self.state = ControllerState::Running;
        self.anchor_global = TimeValue::ZERO;
        self.anchor_host = host_now;
        tracing::debug!(host = %host_now, rate = self.speed_ratio, "Clock begun");
    }

    /// Freeze global time. No effect unless running.
    pub fn pause(&mut self, host_now: TimeValue) {
        if self.state != ControllerState::Running {
            return;
        }
        self.anchor_global = self.running_time(host_now);
        self.state = ControllerState::Paused;
        tracing::debug!(time = %self.anchor_global, "Clock paused");
    }

    /// Continue from the paused time. No effect unless paused.
    pub fn resume(&mut self, host_now: TimeValue) {
        if self.state != ControllerState::Paused {
            return;
        }
        self.anchor_host = host_now;
        self.state = ControllerState::Running;
        tracing::debug!(time = %self.anchor_global, "Clock resumed");
    }

    /// Jump to global time `target`. A stopped controller becomes paused
    /// there.
    pub fn seek(&mut self, host_now: TimeValue, target: TimeValue) {
        self.anchor_global = target;
        self.anchor_host = host_now;
        if self.state == ControllerState::Stopped {
            self.state = ControllerState::Paused;
        }
        tracing::debug!(time = %target, state = ?self.state, "Clock seeked");
    }

    /// Stop and rewind to zero.
    pub fn stop(&mut self) {
        self.state = ControllerState::Stopped;
        self.anchor_global = TimeValue::ZERO;
        tracing::debug!("Clock stopped");
    }

    /// Change how fast global time advances relative to host time. The
    /// current global time is kept.
    pub fn set_speed_ratio(&mut self, host_now: TimeValue, ratio: f64) -> TimingResult<()> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(TimingError::invalid(format!(
                "controller speed ratio must be positive and finite, got {ratio}"
            )));
        }
        if self.state == ControllerState::Running {
            self.anchor_global = self.running_time(host_now);
            self.anchor_host = host_now;
        }
        self.speed_ratio = ratio;
        tracing::debug!(rate = ratio, "Clock speed set");
        Ok(())
    }

    /// Seek to the end of `node`'s active window so it samples as filling
    /// (or stopped, if it does not fill).
    pub fn skip_to_fill(
        &mut self,
        host_now: TimeValue,
        resolved: &ResolvedTiming,
        node: NodeId,
    ) -> TimingResult<()> {
        let schedule = resolved.schedule(node)?;
        let end = match schedule.active_end() {
            Some(end) if end.is_finite() => end,
            Some(_) => {
                return Err(TimingError::invalid(format!(
                    "{node} is active forever and has no fill period"
                )));
            }
            None => {
                return Err(TimingError::invalid(format!("{node} is never active")));
            }
        };
        // A zero-length activation contains its own end; step one tick past it.
        let target = if schedule.active().contains_instant(end) {
            end + TimeValue::from_ticks(1)
        } else {
            end
        };
        self.seek(host_now, target);
        Ok(())
    }

    /// Global time at `host_now`, or `None` while stopped.
    pub fn global_time(&self, host_now: TimeValue) -> Option<TimeValue> {
        match self.state {
            ControllerState::Stopped => None,
            ControllerState::Paused => Some(self.anchor_global),
            ControllerState::Running => Some(self.running_time(host_now)),
        }
    }

    fn running_time(&self, host_now: TimeValue) -> TimeValue {
        let elapsed = (host_now - self.anchor_host).max(TimeValue::ZERO);
        self.anchor_global + elapsed.scale(self.speed_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TimingTree;
    use crate::types::{Duration, TimingParameters};

    fn secs(s: f64) -> TimeValue {
        TimeValue::from_secs(s)
    }

    #[test]
    fn new_controller_is_stopped() {
        let controller = ClockController::new();
        assert_eq!(controller.state(), ControllerState::Stopped);
        assert_eq!(controller.global_time(secs(10.0)), None);
        assert!((controller.speed_ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn begin_pause_resume_stop_cycle() {
        let mut controller = ClockController::new();
        controller.begin(secs(100.0));
        assert_eq!(controller.state(), ControllerState::Running);
        assert_eq!(controller.global_time(secs(102.0)), Some(secs(2.0)));

        controller.pause(secs(103.0));
        assert_eq!(controller.state(), ControllerState::Paused);
        assert_eq!(controller.global_time(secs(110.0)), Some(secs(3.0)));

        controller.resume(secs(120.0));
        assert_eq!(controller.global_time(secs(121.5)), Some(secs(4.5)));

        controller.stop();
        assert_eq!(controller.state(), ControllerState::Stopped);
        assert_eq!(controller.global_time(secs(130.0)), None);
    }

    #[test]
    fn pause_and_resume_ignore_wrong_state() {
        let mut controller = ClockController::new();
        controller.pause(secs(1.0));
        assert_eq!(controller.state(), ControllerState::Stopped);
        controller.resume(secs(1.0));
        assert_eq!(controller.state(), ControllerState::Stopped);
    }

    #[test]
    fn seek_from_stopped_pauses() {
        let mut controller = ClockController::new();
        controller.seek(secs(50.0), secs(7.0));
        assert_eq!(controller.state(), ControllerState::Paused);
        assert_eq!(controller.global_time(secs(60.0)), Some(secs(7.0)));

        controller.resume(secs(60.0));
        assert_eq!(controller.global_time(secs(61.0)), Some(secs(8.0)));

        controller.seek(secs(61.0), secs(2.0));
        assert_eq!(controller.state(), ControllerState::Running);
        assert_eq!(controller.global_time(secs(62.0)), Some(secs(3.0)));
    }

    #[test]
    fn speed_change_keeps_current_time() {
        let mut controller = ClockController::new();
        controller.begin(secs(0.0));
        controller.set_speed_ratio(secs(2.0), 3.0).unwrap();
        assert_eq!(controller.global_time(secs(2.0)), Some(secs(2.0)));
        assert_eq!(controller.global_time(secs(3.0)), Some(secs(5.0)));
    }

    #[test]
    fn rejects_bad_speed() {
        let mut controller = ClockController::new();
        for ratio in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                controller.set_speed_ratio(TimeValue::ZERO, ratio),
                Err(TimingError::InvalidTiming { .. })
            ));
        }
        assert!((controller.speed_ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn skip_to_fill_lands_on_active_end() {
        let mut tree = TimingTree::default();
        let node = tree
            .add_root(TimingParameters {
                begin: Some(secs(1.0)),
                ..TimingParameters::new(Duration::from_secs(2.0))
            })
            .unwrap();
        let forever = tree
            .add_root(TimingParameters::new(Duration::Forever))
            .unwrap();
        let never = tree
            .add_root(TimingParameters {
                begin: None,
                ..TimingParameters::default()
            })
            .unwrap();
        let resolved = tree.resolve();

        let mut controller = ClockController::new();
        controller.begin(TimeValue::ZERO);
        controller
            .skip_to_fill(secs(0.5), &resolved, node)
            .unwrap();
        assert_eq!(controller.global_time(secs(0.5)), Some(secs(3.0)));

        assert!(controller.skip_to_fill(secs(0.5), &resolved, forever).is_err());
        assert!(controller.skip_to_fill(secs(0.5), &resolved, never).is_err());
    }

    #[test]
    fn skip_to_fill_steps_past_zero_length_activation() {
        let mut tree = TimingTree::default();
        let trigger = tree
            .add_root(TimingParameters {
                begin: Some(secs(1.0)),
                ..TimingParameters::new(Duration::from_secs(0.0))
            })
            .unwrap();
        let resolved = tree.resolve();

        let mut controller = ClockController::new();
        controller
            .skip_to_fill(TimeValue::ZERO, &resolved, trigger)
            .unwrap();
        let t = controller.global_time(TimeValue::ZERO).unwrap();
        assert_eq!(t, secs(1.0) + TimeValue::from_ticks(1));

        let snapshot = resolved.evaluate(trigger, t).unwrap();
        assert_eq!(snapshot.state, crate::clock::ClockState::Filling);
        assert_eq!(snapshot.progress, Some(1.0));
    }

    #[test]
    fn serialization_roundtrip() {
        let mut controller = ClockController::new();
        controller.seek(secs(1.0), secs(4.0));
        let json = serde_json::to_string(&controller).expect("serialize");
        let restored: ClockController = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.state(), ControllerState::Paused);
        assert_eq!(restored.global_time(secs(9.0)), Some(secs(4.0)));
    }
}
