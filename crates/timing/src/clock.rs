//! Clock evaluation for a single timeline node.
//!
//! A node's schedule is derived from its [`TimingParameters`] and the activity
//! its parent hands down ([`ParentActivity`]):
//!
//! 1. The natural start is the parent's realized start plus `begin`, converted
//!    from parent-local to global time.
//! 2. The realized start is the first instant at or after the natural start at
//!    which the parent is active. Local time zero sits at the realized start.
//! 3. The active window is `[realized start, realized start + active duration / rate)`,
//!    intersected with the parent's active collection. Repetitions are never
//!    materialized: progress is computed modulo the simple duration.
//! 4. The fill window is the parent's active-or-filling collection after the
//!    last active instant, minus the active window.
//!
//! Sampling a schedule is a pure lookup; nothing here holds simulation state.

use anim_common::TimeValue;
use serde::{Deserialize, Serialize};

use crate::interval::{Interval, TimeIntervalCollection};
use crate::types::{Duration, FillBehavior, TimingParameters};

/// Discrete clock state at a sample time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockState {
    /// Progress advances with parent time.
    Active,
    /// Progress is pinned; the node is still alive for dependents.
    Filling,
    /// Nothing is computed.
    Stopped,
}

/// Result of sampling a clock.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClockSnapshot {
    pub state: ClockState,
    /// Progress within the current pass, after acceleration/deceleration and
    /// autoreverse. `None` while stopped.
    pub progress: Option<f64>,
    /// 0-based iteration index. `None` while stopped.
    pub current_iteration: Option<u64>,
}

impl ClockSnapshot {
    pub const STOPPED: Self = Self {
        state: ClockState::Stopped,
        progress: None,
        current_iteration: None,
    };

    fn active(progress: f64, iteration: u64) -> Self {
        Self {
            state: ClockState::Active,
            progress: Some(progress),
            current_iteration: Some(iteration),
        }
    }

    fn filling(progress: f64, iteration: u64) -> Self {
        Self {
            state: ClockState::Filling,
            progress: Some(progress),
            current_iteration: Some(iteration),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state == ClockState::Stopped
    }
}

/// Everything a child needs from its already-resolved parent.
#[derive(Clone, Debug, PartialEq)]
pub struct ParentActivity {
    /// Global time of the parent's local zero.
    pub origin: TimeValue,
    /// Parent local time per unit of global time.
    pub rate: f64,
    /// Where the parent is active. Children only run here.
    pub active: TimeIntervalCollection,
    /// Where the parent is active or filling. Children may fill here.
    pub alive: TimeIntervalCollection,
}

impl ParentActivity {
    /// Activity for a root node: the host runs the clock over `window`.
    pub fn root(window: TimeIntervalCollection) -> Self {
        Self {
            origin: TimeValue::ZERO,
            rate: 1.0,
            active: window.clone(),
            alive: window,
        }
    }

    /// Root activity open over the whole time line.
    pub fn unbounded() -> Self {
        Self::root(TimeIntervalCollection::from_start(TimeValue::MIN))
    }

    /// Activity of a parent that never runs.
    pub fn stopped() -> Self {
        Self::root(TimeIntervalCollection::empty())
    }
}

/// Resolve a duration to a simple-pass length. `natural` stands in for
/// `Automatic`; `Forever` becomes `INFINITY`.
pub fn simple_duration(duration: Duration, natural: TimeValue) -> TimeValue {
    match duration {
        Duration::Time(d) => d,
        Duration::Forever => TimeValue::INFINITY,
        Duration::Automatic => natural,
    }
}

/// Reshape linear pass progress so velocity ramps up over the first
/// `accel` fraction and down over the last `decel` fraction.
pub fn apply_acceleration(progress: f64, accel: f64, decel: f64) -> f64 {
    if accel + decel <= 0.0 {
        return progress;
    }
    let max_rate = 2.0 / (2.0 - accel - decel);
    if progress < accel {
        max_rate * progress * progress / (2.0 * accel)
    } else if progress <= 1.0 - decel {
        max_rate * (progress - accel / 2.0)
    } else {
        let remaining = 1.0 - progress;
        1.0 - max_rate * remaining * remaining / (2.0 * decel)
    }
}

/// The resolved schedule of one node in global time.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSchedule {
    simple: TimeValue,
    auto_reverse: bool,
    acceleration: f64,
    deceleration: f64,
    natural_begin: Option<TimeValue>,
    origin: Option<TimeValue>,
    rate: f64,
    active_duration: TimeValue,
    active: TimeIntervalCollection,
    fill: TimeIntervalCollection,
    fill_value: Option<(f64, u64)>,
}

impl NodeSchedule {
    /// A schedule that is never active or filling.
    pub fn stopped() -> Self {
        Self {
            simple: TimeValue::ZERO,
            auto_reverse: false,
            acceleration: 0.0,
            deceleration: 0.0,
            natural_begin: None,
            origin: None,
            rate: 1.0,
            active_duration: TimeValue::ZERO,
            active: TimeIntervalCollection::empty(),
            fill: TimeIntervalCollection::empty(),
            fill_value: None,
        }
    }

    /// Place `params` under `parent`.
    ///
    /// `natural` is the content length used when the duration is `Automatic`.
    /// `shift` moves the natural start later (slip applied by a child).
    pub fn compute(
        params: &TimingParameters,
        natural: TimeValue,
        parent: &ParentActivity,
        shift: TimeValue,
    ) -> Self {
        let simple = simple_duration(params.duration, natural);
        let active_duration = params.active_duration(simple);
        let rate = parent.rate * params.speed_ratio;
        let mut schedule = Self {
            simple,
            auto_reverse: params.auto_reverse,
            acceleration: params.acceleration_ratio,
            deceleration: params.deceleration_ratio,
            rate,
            active_duration,
            ..Self::stopped()
        };

        let Some(begin) = params.begin else {
            return schedule;
        };
        let natural_begin = parent.origin + begin.scale(1.0 / parent.rate) + shift;
        schedule.natural_begin = Some(natural_begin);

        let Some(origin) = parent.active.next_active_at_or_after(natural_begin) else {
            return schedule;
        };
        schedule.origin = Some(origin);

        let natural_end = origin + active_duration.scale(1.0 / rate);
        let window = Interval::new(origin, natural_end)
            .map(TimeIntervalCollection::from_interval)
            .unwrap_or_default();
        schedule.active = window.intersect(&parent.active);

        let Some(last) = schedule.active.last_end() else {
            return schedule;
        };
        if params.fill == FillBehavior::Stop {
            return schedule;
        }
        let within = parent
            .alive
            .intersect(&TimeIntervalCollection::from_start(last));
        schedule.fill = schedule.active.complement(&within);
        if schedule.fill.is_empty() {
            return schedule;
        }

        schedule.fill_value = Some(match params.fill {
            FillBehavior::HoldStart => (0.0, 0),
            _ => {
                // Use the exact local length when the run was not cut short,
                // so rate rounding cannot tip the end into a new pass.
                let local_end = if last >= natural_end {
                    active_duration.ticks() as f64
                } else {
                    (last - origin).ticks() as f64 * rate
                };
                schedule.position(local_end, true)
            }
        });
        schedule
    }

    /// Sample at global time `t`.
    pub fn sample(&self, t: TimeValue) -> ClockSnapshot {
        if let (true, Some(origin)) = (self.active.contains_instant(t), self.origin) {
            let local = (t - origin).ticks() as f64 * self.rate;
            let (progress, iteration) = self.position(local, false);
            return ClockSnapshot::active(progress, iteration);
        }
        match self.fill_value {
            Some((progress, iteration)) if self.fill.contains_instant(t) => {
                ClockSnapshot::filling(progress, iteration)
            }
            _ => ClockSnapshot::STOPPED,
        }
    }

    /// Progress and iteration at `local` ticks into the active period.
    ///
    /// With `at_end`, a local time landing exactly on a pass boundary belongs
    /// to the pass that just finished (fraction 1) rather than the next one.
    fn position(&self, local: f64, at_end: bool) -> (f64, u64) {
        if self.simple.is_infinite() {
            return (0.0, 0);
        }
        let simple = self.simple.ticks() as f64;
        if simple <= 0.0 {
            return (1.0, 0);
        }

        let passes = (local / simple).max(0.0);
        let mut pass = passes.floor();
        if at_end && pass > 0.0 && pass == passes {
            pass -= 1.0;
        }
        let fraction = (passes - pass).clamp(0.0, 1.0);
        let pass = pass as u64;

        let (iteration, mirrored) = if self.auto_reverse {
            (pass / 2, pass % 2 == 1)
        } else {
            (pass, false)
        };
        let forward = if mirrored { 1.0 - fraction } else { fraction };
        (
            apply_acceleration(forward, self.acceleration, self.deceleration),
            iteration,
        )
    }

    /// Activity handed down to this node's children.
    pub fn child_activity(&self) -> ParentActivity {
        match self.origin {
            Some(origin) => ParentActivity {
                origin,
                rate: self.rate,
                active: self.active.clone(),
                alive: self.alive(),
            },
            None => ParentActivity::stopped(),
        }
    }

    /// Active or filling.
    pub fn alive(&self) -> TimeIntervalCollection {
        self.active.union(&self.fill)
    }

    pub fn active(&self) -> &TimeIntervalCollection {
        &self.active
    }

    pub fn fill(&self) -> &TimeIntervalCollection {
        &self.fill
    }

    pub fn natural_begin(&self) -> Option<TimeValue> {
        self.natural_begin
    }

    /// Realized start (local time zero), if the node ever starts.
    pub fn origin(&self) -> Option<TimeValue> {
        self.origin
    }

    /// End of the realized active window.
    pub fn active_end(&self) -> Option<TimeValue> {
        self.active.last_end()
    }

    /// How much later than naturally scheduled the node actually started.
    pub fn delay(&self) -> TimeValue {
        match (self.origin, self.natural_begin) {
            (Some(origin), Some(natural)) => origin - natural,
            _ => TimeValue::ZERO,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn simple_duration(&self) -> TimeValue {
        self.simple
    }

    /// Local length of the whole active period.
    pub fn active_duration(&self) -> TimeValue {
        self.active_duration
    }
}

/// Evaluate one node at `t` as a pure function of its parameters, its content
/// length (for `Automatic` durations), and its parent's activity.
pub fn evaluate(
    params: &TimingParameters,
    natural: TimeValue,
    parent: &ParentActivity,
    t: TimeValue,
) -> ClockSnapshot {
    NodeSchedule::compute(params, natural, parent, TimeValue::ZERO).sample(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RepeatBehavior;

    fn secs(s: f64) -> TimeValue {
        TimeValue::from_secs(s)
    }

    fn timed(duration: f64) -> TimingParameters {
        TimingParameters::new(Duration::from_secs(duration))
    }

    fn sample(params: &TimingParameters, t: f64) -> ClockSnapshot {
        evaluate(params, TimeValue::ZERO, &ParentActivity::unbounded(), secs(t))
    }

    fn assert_progress(snapshot: ClockSnapshot, state: ClockState, expected: f64) {
        assert_eq!(snapshot.state, state, "{snapshot:?}");
        let progress = snapshot.progress.expect("progress defined");
        assert!(
            (progress - expected).abs() < 1e-9,
            "progress {progress}, expected {expected}"
        );
    }

    #[test]
    fn forever_repeat_wraps_progress() {
        let params = TimingParameters {
            repeat: RepeatBehavior::Forever,
            ..timed(2.0)
        };
        let snapshot = sample(&params, 5.0);
        assert_progress(snapshot, ClockState::Active, 0.5);
        assert_eq!(snapshot.current_iteration, Some(2));
    }

    #[test]
    fn holds_end_after_single_pass() {
        let snapshot = sample(&timed(2.0), 10.0);
        assert_progress(snapshot, ClockState::Filling, 1.0);
        assert_eq!(snapshot.current_iteration, Some(0));
    }

    #[test]
    fn stopped_before_begin() {
        let params = TimingParameters {
            begin: Some(secs(3.0)),
            ..timed(2.0)
        };
        let snapshot = sample(&params, 1.0);
        assert!(snapshot.is_stopped());
        assert_eq!(snapshot.progress, None);
        assert_progress(sample(&params, 4.0), ClockState::Active, 0.5);
    }

    #[test]
    fn indefinite_begin_never_starts() {
        let params = TimingParameters {
            begin: None,
            ..timed(2.0)
        };
        assert!(sample(&params, 0.0).is_stopped());
        assert!(sample(&params, 100.0).is_stopped());
    }

    #[test]
    fn active_window_is_half_open() {
        let params = timed(2.0);
        assert_progress(sample(&params, 0.0), ClockState::Active, 0.0);
        assert_progress(sample(&params, 1.999), ClockState::Active, 0.9995);
        assert_progress(sample(&params, 2.0), ClockState::Filling, 1.0);
    }

    #[test]
    fn fill_stop_stops_at_end() {
        let params = TimingParameters {
            fill: FillBehavior::Stop,
            ..timed(2.0)
        };
        assert!(sample(&params, 2.0).is_stopped());
    }

    #[test]
    fn hold_start_pins_zero() {
        let params = TimingParameters {
            fill: FillBehavior::HoldStart,
            ..timed(2.0)
        };
        assert_progress(sample(&params, 3.0), ClockState::Filling, 0.0);
    }

    #[test]
    fn autoreverse_mirrors_every_other_pass() {
        let params = TimingParameters {
            auto_reverse: true,
            ..timed(2.0)
        };
        assert_progress(sample(&params, 1.0), ClockState::Active, 0.5);
        assert_progress(sample(&params, 2.5), ClockState::Active, 0.75);
        let snapshot = sample(&params, 2.5);
        assert_eq!(snapshot.current_iteration, Some(0));
        // Ends on the mirrored pass, back at the start.
        assert_progress(sample(&params, 4.0), ClockState::Filling, 0.0);
    }

    #[test]
    fn speed_ratio_compresses_the_window() {
        let params = TimingParameters {
            speed_ratio: 2.0,
            ..timed(2.0)
        };
        assert_progress(sample(&params, 0.5), ClockState::Active, 0.5);
        assert_progress(sample(&params, 1.0), ClockState::Filling, 1.0);
    }

    #[test]
    fn repeat_duration_ends_mid_iteration() {
        let params = TimingParameters {
            repeat: RepeatBehavior::Duration(secs(3.0)),
            ..timed(2.0)
        };
        let snapshot = sample(&params, 2.5);
        assert_progress(snapshot, ClockState::Active, 0.25);
        assert_eq!(snapshot.current_iteration, Some(1));

        let snapshot = sample(&params, 5.0);
        assert_progress(snapshot, ClockState::Filling, 0.5);
        assert_eq!(snapshot.current_iteration, Some(1));
    }

    #[test]
    fn whole_repeat_count_fills_at_one() {
        let params = TimingParameters {
            repeat: RepeatBehavior::Count(3.0),
            ..timed(1.0)
        };
        let snapshot = sample(&params, 10.0);
        assert_progress(snapshot, ClockState::Filling, 1.0);
        assert_eq!(snapshot.current_iteration, Some(2));
    }

    #[test]
    fn zero_duration_fires_once() {
        let params = TimingParameters {
            begin: Some(secs(1.0)),
            ..timed(0.0)
        };
        assert!(sample(&params, 0.5).is_stopped());
        assert_progress(sample(&params, 1.0), ClockState::Active, 1.0);
        assert_progress(sample(&params, 1.5), ClockState::Filling, 1.0);
    }

    #[test]
    fn forever_duration_reports_zero_progress() {
        let params = TimingParameters::new(Duration::Forever);
        assert_progress(sample(&params, 42.0), ClockState::Active, 0.0);
    }

    #[test]
    fn automatic_duration_uses_natural_length() {
        let params = TimingParameters::default();
        let snapshot = evaluate(
            &params,
            secs(4.0),
            &ParentActivity::unbounded(),
            secs(1.0),
        );
        assert_progress(snapshot, ClockState::Active, 0.25);
    }

    #[test]
    fn parent_cut_pins_partial_progress() {
        let parent = ParentActivity {
            origin: TimeValue::ZERO,
            rate: 1.0,
            active: TimeIntervalCollection::from_interval(
                Interval::new(secs(0.0), secs(1.5)).expect("ordered"),
            ),
            alive: TimeIntervalCollection::from_start(secs(0.0)),
        };
        let snapshot = evaluate(&timed(2.0), TimeValue::ZERO, &parent, secs(3.0));
        assert_progress(snapshot, ClockState::Filling, 0.75);
    }

    #[test]
    fn child_stops_when_parent_stops() {
        let parent = ParentActivity::root(TimeIntervalCollection::from_interval(
            Interval::new(secs(0.0), secs(1.5)).expect("ordered"),
        ));
        let snapshot = evaluate(&timed(2.0), TimeValue::ZERO, &parent, secs(1.5));
        assert!(snapshot.is_stopped());
    }

    #[test]
    fn child_waits_for_parent_activity() {
        let parent = ParentActivity::root(TimeIntervalCollection::from_start(secs(5.0)));
        let schedule = NodeSchedule::compute(&timed(2.0), TimeValue::ZERO, &parent, TimeValue::ZERO);
        assert_eq!(schedule.natural_begin(), Some(TimeValue::ZERO));
        assert_eq!(schedule.origin(), Some(secs(5.0)));
        assert_eq!(schedule.delay(), secs(5.0));
        assert_progress(schedule.sample(secs(6.0)), ClockState::Active, 0.5);
    }

    #[test]
    fn child_begin_uses_parent_rate() {
        let parent = ParentActivity {
            origin: secs(10.0),
            rate: 2.0,
            active: TimeIntervalCollection::from_start(secs(10.0)),
            alive: TimeIntervalCollection::from_start(secs(10.0)),
        };
        let params = TimingParameters {
            begin: Some(secs(4.0)),
            ..timed(2.0)
        };
        let schedule = NodeSchedule::compute(&params, TimeValue::ZERO, &parent, TimeValue::ZERO);
        // 4 parent-local seconds at double speed is 2 global seconds; the
        // child inherits the doubled rate, so its 2 s pass takes 1 s.
        assert_eq!(schedule.origin(), Some(secs(12.0)));
        assert_eq!(schedule.active_end(), Some(secs(13.0)));
    }

    #[test]
    fn acceleration_reshapes_progress() {
        assert!((apply_acceleration(0.25, 0.5, 0.5) - 0.125).abs() < 1e-12);
        assert!((apply_acceleration(0.5, 0.5, 0.5) - 0.5).abs() < 1e-12);
        assert!((apply_acceleration(0.75, 0.5, 0.5) - 0.875).abs() < 1e-12);
        assert!((apply_acceleration(1.0, 0.3, 0.2) - 1.0).abs() < 1e-12);
        assert!((apply_acceleration(0.0, 0.3, 0.2)).abs() < 1e-12);
        assert!((apply_acceleration(0.4, 0.0, 0.0) - 0.4).abs() < 1e-12);

        let params = TimingParameters {
            acceleration_ratio: 0.5,
            deceleration_ratio: 0.5,
            ..timed(4.0)
        };
        assert_progress(sample(&params, 1.0), ClockState::Active, 0.125);
    }

    #[test]
    fn stopped_parent_stops_children() {
        let snapshot = evaluate(&timed(1.0), TimeValue::ZERO, &ParentActivity::stopped(), secs(0.0));
        assert!(snapshot.is_stopped());
        assert_eq!(NodeSchedule::stopped().child_activity(), ParentActivity::stopped());
    }
}
