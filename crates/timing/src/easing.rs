//! Easing curves: reshape normalized progress before it reaches an
//! interpolator.
//!
//! Every curve is defined in ease-in form (`f(0) = 0`, `f(1) = 1`); the mode
//! wrapper derives ease-out and ease-in-out from it. Overshoot curves (Back,
//! Elastic) may leave `[0, 1]` between the endpoints.

use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_2, PI};

use serde::{Deserialize, Serialize};

use crate::error::{TimingError, TimingResult};

/// Curve family with the parameters its shape needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EasingCurve {
    Linear,
    Quadratic,
    Cubic,
    Quartic,
    Quintic,
    Sine,
    Circle,
    Power { power: f64 },
    Exponential { exponent: f64 },
    /// Pulls back by `amplitude` before moving toward the target.
    Back { amplitude: f64 },
    /// Spring oscillation settling on the target.
    Elastic { oscillations: u32, springiness: f64 },
    /// Series of decaying bounces, each `bounciness` times smaller.
    Bounce { bounces: u32, bounciness: f64 },
    /// A curve registered by name in an [`EasingRegistry`].
    Custom(String),
}

/// Which end of the pass the curve shapes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EasingMode {
    EaseIn,
    #[default]
    EaseOut,
    EaseInOut,
}

/// Lookup table for [`EasingCurve::Custom`] curves.
///
/// Registered functions must satisfy `f(0) = 0` and `f(1) = 1`; this is not
/// checked.
#[derive(Clone, Debug, Default)]
pub struct EasingRegistry {
    curves: HashMap<String, fn(f64) -> f64>,
}

impl EasingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `curve` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, curve: fn(f64) -> f64) {
        let name = name.into();
        tracing::debug!(name = %name, "Easing curve registered");
        self.curves.insert(name, curve);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.curves.contains_key(name)
    }

    /// Apply `curve` in `mode` to normalized time `t`.
    pub fn ease(&self, curve: &EasingCurve, mode: EasingMode, t: f64) -> TimingResult<f64> {
        match curve {
            EasingCurve::Custom(name) => {
                let custom = self
                    .curves
                    .get(name)
                    .ok_or_else(|| TimingError::UnknownCurve(name.clone()))?;
                Ok(apply_mode(*custom, mode, t))
            }
            builtin => Ok(apply_mode(|t| ease_in_builtin(builtin, t), mode, t)),
        }
    }
}

/// Apply a built-in curve. Custom curves report [`TimingError::UnknownCurve`];
/// use [`EasingRegistry::ease`] for those.
pub fn ease(curve: &EasingCurve, mode: EasingMode, t: f64) -> TimingResult<f64> {
    match curve {
        EasingCurve::Custom(name) => Err(TimingError::UnknownCurve(name.clone())),
        builtin => Ok(apply_mode(|t| ease_in_builtin(builtin, t), mode, t)),
    }
}

fn apply_mode(ease_in: impl Fn(f64) -> f64, mode: EasingMode, t: f64) -> f64 {
    match mode {
        EasingMode::EaseIn => ease_in(t),
        EasingMode::EaseOut => 1.0 - ease_in(1.0 - t),
        EasingMode::EaseInOut => {
            if t < 0.5 {
                ease_in(t * 2.0) * 0.5
            } else {
                (1.0 - ease_in((1.0 - t) * 2.0)) * 0.5 + 0.5
            }
        }
    }
}

fn ease_in_builtin(curve: &EasingCurve, t: f64) -> f64 {
    match *curve {
        EasingCurve::Linear => t,
        EasingCurve::Quadratic => t * t,
        EasingCurve::Cubic => t * t * t,
        EasingCurve::Quartic => t.powi(4),
        EasingCurve::Quintic => t.powi(5),
        EasingCurve::Sine => 1.0 - (FRAC_PI_2 * (1.0 - t)).sin(),
        EasingCurve::Circle => {
            let t = t.clamp(0.0, 1.0);
            1.0 - (1.0 - t * t).sqrt()
        }
        EasingCurve::Power { power } => t.powf(power.max(0.0)),
        EasingCurve::Exponential { exponent } => exponential(exponent, t),
        EasingCurve::Back { amplitude } => t * t * t - t * amplitude.max(0.0) * (PI * t).sin(),
        EasingCurve::Elastic {
            oscillations,
            springiness,
        } => {
            let envelope = exponential(springiness.max(0.0), t);
            envelope * ((2.0 * PI * f64::from(oscillations) + FRAC_PI_2) * t).sin()
        }
        EasingCurve::Bounce {
            bounces,
            bounciness,
        } => bounce(f64::from(bounces), bounciness, t),
        // Resolved by the registry before reaching here.
        EasingCurve::Custom(_) => t,
    }
}

fn exponential(exponent: f64, t: f64) -> f64 {
    if exponent.abs() < f64::EPSILON {
        t
    } else {
        ((exponent * t).exp() - 1.0) / (exponent.exp() - 1.0)
    }
}

/// Parabolic arcs whose widths shrink geometrically by `bounciness`; the last
/// arc peaks at 1.
fn bounce(bounces: f64, bounciness: f64, t: f64) -> f64 {
    let bounciness = if bounciness <= 1.0 { 1.001 } else { bounciness };
    let pow = bounciness.powf(bounces);
    let one_minus = 1.0 - bounciness;

    // Total width in units of the first half-arc.
    let sum_of_units = (1.0 - pow) / one_minus + pow * 0.5;
    let unit_at_t = t * sum_of_units;

    let bounce_at_t = (-unit_at_t * one_minus + 1.0).log(bounciness);
    let start = bounce_at_t.floor();
    let end = start + 1.0;

    let start_time = (1.0 - bounciness.powf(start)) / (one_minus * sum_of_units);
    let end_time = (1.0 - bounciness.powf(end)) / (one_minus * sum_of_units);

    let mid_time = (start_time + end_time) * 0.5;
    let relative = t - mid_time;
    let radius = mid_time - start_time;
    let amplitude = (1.0 / bounciness).powf(bounces - start);

    (-amplitude / (radius * radius)) * (relative - radius) * (relative + radius)
}
