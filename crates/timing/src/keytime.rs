//! Key-time resolution: turn heterogeneous key-frame time specifications into
//! concrete offsets, ordered for building a time-to-segment lookup.
//!
//! Resolution order:
//! 1. Percent and TimeSpan frames resolve directly. A trailing Uniform or
//!    Paced frame lands on the total duration; a leading Paced frame on 0.
//! 2. Every remaining run between resolved anchors (with an implicit anchor
//!    at 0 before the first frame) is split equally by count.
//! 3. Runs of Paced frames are redistributed between their neighbours in
//!    proportion to the segment lengths the caller measured.
//! 4. Entries are sorted by time, then by original index.

use anim_common::{KeyTimePolicy, TimeValue};
use serde::{Deserialize, Serialize};

use crate::error::{TimingError, TimingResult};
use crate::types::Duration;

/// When a key frame happens.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum KeyTime {
    /// Share time equally with neighbouring unresolved frames.
    Uniform,
    /// Share time in proportion to the value-space length of the segment
    /// ending at this frame.
    Paced,
    /// Fraction of the total duration, in `[0, 1]`.
    Percent(f64),
    /// Offset from the start, in `[0, total]`.
    TimeSpan(TimeValue),
}

/// A resolved key frame: its time and its position in the original list.
///
/// Ordering compares time first, then index, so frames sharing a time keep
/// their declaration order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResolvedKeyFrame {
    pub time: TimeValue,
    pub index: usize,
}

/// Resolves key times under one out-of-range policy.
#[derive(Copy, Clone, Debug, Default)]
pub struct KeyTimeResolver {
    policy: KeyTimePolicy,
}

impl KeyTimeResolver {
    pub fn new(policy: KeyTimePolicy) -> Self {
        Self { policy }
    }

    /// Resolve `key_times` over `total`.
    ///
    /// `segment_lengths[i]` is the distance from frame `i - 1` to frame `i`
    /// (entry 0 measures from the animation's base value). Pass an empty slice
    /// when no metric is available; Paced frames then split time equally.
    pub fn resolve(
        &self,
        key_times: &[KeyTime],
        total: Duration,
        segment_lengths: &[f64],
    ) -> TimingResult<Vec<ResolvedKeyFrame>> {
        let total = match total {
            Duration::Time(t) if t.is_negative() => {
                return Err(TimingError::invalid(format!("negative total duration {t}")));
            }
            Duration::Time(t) => t,
            Duration::Automatic => return Err(TimingError::UnresolvedDuration),
            Duration::Forever => {
                return Err(TimingError::invalid(
                    "key times cannot be distributed over a forever duration",
                ));
            }
        };
        if !segment_lengths.is_empty() {
            if segment_lengths.len() != key_times.len() {
                return Err(TimingError::invalid(format!(
                    "{} segment lengths supplied for {} key frames",
                    segment_lengths.len(),
                    key_times.len()
                )));
            }
            if let Some(bad) = segment_lengths
                .iter()
                .position(|len| !len.is_finite() || *len < 0.0)
            {
                return Err(TimingError::invalid(format!(
                    "segment length {} for key frame {bad} is not a finite non-negative number",
                    segment_lengths[bad]
                )));
            }
        }

        let count = key_times.len();
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut times: Vec<Option<TimeValue>> = Vec::with_capacity(count);
        for (index, key_time) in key_times.iter().enumerate() {
            times.push(match *key_time {
                KeyTime::Percent(p) => Some(self.percent(index, p, total)?),
                KeyTime::TimeSpan(t) => Some(self.time_span(index, t, total)?),
                KeyTime::Uniform | KeyTime::Paced => None,
            });
        }

        if times[count - 1].is_none() {
            times[count - 1] = Some(total);
        }
        if key_times[0] == KeyTime::Paced && times[0].is_none() {
            times[0] = Some(TimeValue::ZERO);
        }

        // Paced frames still unresolved here are the ones step 3 redistributes.
        let paced: Vec<bool> = key_times
            .iter()
            .zip(&times)
            .map(|(key_time, time)| *key_time == KeyTime::Paced && time.is_none())
            .collect();

        let mut resolved = split_uniform_runs(&times, total);
        if paced.iter().any(|p| *p) {
            redistribute_paced_runs(&mut resolved, &paced, segment_lengths);
        }

        let mut entries: Vec<ResolvedKeyFrame> = resolved
            .into_iter()
            .enumerate()
            .map(|(index, time)| ResolvedKeyFrame { time, index })
            .collect();
        entries.sort();

        tracing::debug!(
            frames = count,
            total = %total,
            policy = ?self.policy,
            "Key times resolved"
        );
        Ok(entries)
    }

    fn percent(&self, index: usize, p: f64, total: TimeValue) -> TimingResult<TimeValue> {
        if p.is_nan() {
            return Err(TimingError::invalid(format!(
                "key frame {index}: percent is NaN"
            )));
        }
        if (0.0..=1.0).contains(&p) {
            return Ok(total.scale(p));
        }
        match self.policy {
            KeyTimePolicy::Reject => Err(TimingError::invalid(format!(
                "key frame {index}: percent {p} outside [0, 1]"
            ))),
            KeyTimePolicy::Clamp => {
                let clamped = p.clamp(0.0, 1.0);
                tracing::warn!(index, percent = p, clamped, "Key time percent clamped");
                Ok(total.scale(clamped))
            }
        }
    }

    fn time_span(&self, index: usize, t: TimeValue, total: TimeValue) -> TimingResult<TimeValue> {
        if !t.is_negative() && t <= total {
            return Ok(t);
        }
        match self.policy {
            KeyTimePolicy::Reject => Err(TimingError::invalid(format!(
                "key frame {index}: time {t} outside [0, {total}]"
            ))),
            KeyTimePolicy::Clamp => {
                let clamped = t.clamp(TimeValue::ZERO, total);
                tracing::warn!(index, time = %t, clamped = %clamped, "Key time span clamped");
                Ok(clamped)
            }
        }
    }
}

/// Resolve with the default (reject) policy.
pub fn resolve_key_times(
    key_times: &[KeyTime],
    total: Duration,
    segment_lengths: &[f64],
) -> TimingResult<Vec<ResolvedKeyFrame>> {
    KeyTimeResolver::default().resolve(key_times, total, segment_lengths)
}

/// Fill every unresolved slot by splitting the gap between the surrounding
/// anchors equally. The last slot is always resolved on entry.
fn split_uniform_runs(times: &[Option<TimeValue>], total: TimeValue) -> Vec<TimeValue> {
    let mut resolved = vec![TimeValue::ZERO; times.len()];
    let mut prev_time = TimeValue::ZERO;
    // Position of the previous anchor, counting the implicit start as 0.
    let mut prev_slot = 0usize;
    let mut i = 0;
    while i < times.len() {
        if let Some(t) = times[i] {
            resolved[i] = t;
            prev_time = t;
            prev_slot = i + 1;
            i += 1;
            continue;
        }
        let next = (i..times.len()).find(|&j| times[j].is_some());
        let (next_idx, next_time) = match next {
            Some(j) => (j, times[j].unwrap_or(total)),
            None => (times.len() - 1, total),
        };
        let steps = (next_idx + 1 - prev_slot) as f64;
        let span = next_time - prev_time;
        for (k, slot) in resolved.iter_mut().enumerate().take(next_idx).skip(i) {
            let step = (k + 1 - prev_slot) as f64;
            *slot = prev_time + span.scale(step / steps);
        }
        i = next_idx;
    }
    resolved
}

/// Re-space each maximal run of Paced frames between the frame before and
/// the frame after it, by cumulative segment length.
fn redistribute_paced_runs(resolved: &mut [TimeValue], paced: &[bool], lengths: &[f64]) {
    let mut i = 0;
    while i < paced.len() {
        if !paced[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < paced.len() && paced[i] {
            i += 1;
        }
        // A leading Paced frame is pinned at 0 and the last frame is always
        // resolved, so both neighbours exist.
        let (Some(before), Some(&after_time)) = (start.checked_sub(1), resolved.get(i)) else {
            continue;
        };
        let before_time = resolved[before];
        let span = after_time - before_time;

        // Segments start..=i end at the paced frames and the anchor after them.
        let weights: &[f64] = if lengths.is_empty() {
            &[]
        } else {
            &lengths[start..=i]
        };
        let total_weight: f64 = weights.iter().sum();
        let slots = (i - start + 1) as f64;

        let mut cumulative = 0.0;
        for k in start..i {
            let fraction = if total_weight > 0.0 {
                cumulative += weights[k - start];
                cumulative / total_weight
            } else {
                (k - start + 1) as f64 / slots
            };
            resolved[k] = before_time + span.scale(fraction);
        }
    }
}
