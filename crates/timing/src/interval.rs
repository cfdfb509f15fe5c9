//! Time interval collections: the set of global times at which a clock is open.
//!
//! A collection is a sorted list of disjoint, maximally coalesced half-open
//! intervals `[start, end)` plus a sorted list of isolated instants. Instants
//! carry zero-length activations (a zero-duration timeline still fires once)
//! and are never covered by an interval of the same collection.
//!
//! Unbounded activity is an interval ending at [`TimeValue::INFINITY`]; the
//! tail is never materialized, the sentinel simply compares greater than any
//! finite end.
//!
//! [`TimeIntervalCollection::complement`] is set difference for intervals
//! only. An isolated instant of the subtracted collection has no extent, and a
//! half-open list cannot express a single missing point, so it does not
//! puncture the window it is subtracted from: `instant(1s)` removed from
//! `[0s, 4s)` still leaves `[0s, 4s)`. Clock composition relies on this when a
//! zero-duration activation is followed by a fill starting at the same time.

use anim_common::TimeValue;
use serde::{Deserialize, Serialize};

/// A half-open span `[start, end)`. `start == end` is a zero-length activation
/// that contains exactly its start.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    start: TimeValue,
    end: TimeValue,
}

impl Interval {
    /// Returns `None` if `end < start`.
    pub fn new(start: TimeValue, end: TimeValue) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// `[start, +inf)`.
    pub fn from_start(start: TimeValue) -> Self {
        Self {
            start,
            end: TimeValue::INFINITY,
        }
    }

    pub fn instant(at: TimeValue) -> Self {
        Self { start: at, end: at }
    }

    pub fn start(&self) -> TimeValue {
        self.start
    }

    pub fn end(&self) -> TimeValue {
        self.end
    }

    pub fn is_instant(&self) -> bool {
        self.start == self.end
    }

    pub fn length(&self) -> TimeValue {
        self.end - self.start
    }

    pub fn contains(&self, t: TimeValue) -> bool {
        if self.is_instant() {
            t == self.start
        } else {
            self.start <= t && t < self.end
        }
    }
}

/// Normalized set of intervals and isolated instants.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeIntervalCollection {
    intervals: Vec<Interval>,
    instants: Vec<TimeValue>,
}

impl TimeIntervalCollection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_interval(interval: Interval) -> Self {
        Self::from_parts(vec![interval], Vec::new())
    }

    /// `[start, +inf)`; empty if `start` is itself infinite.
    pub fn from_start(start: TimeValue) -> Self {
        Self::from_interval(Interval::from_start(start))
    }

    /// A collection open at exactly one instant.
    pub fn instant(at: TimeValue) -> Self {
        Self::from_parts(Vec::new(), vec![at])
    }

    /// Build from arbitrary (unsorted, overlapping) intervals.
    pub fn from_intervals(intervals: impl IntoIterator<Item = Interval>) -> Self {
        Self::from_parts(intervals.into_iter().collect(), Vec::new())
    }

    /// Establish the sorted/disjoint/coalesced invariant.
    fn from_parts(raw: Vec<Interval>, mut instants: Vec<TimeValue>) -> Self {
        let mut spans = Vec::with_capacity(raw.len());
        for interval in raw {
            // Nothing can start at infinity.
            if interval.start.is_infinite() {
                continue;
            }
            if interval.is_instant() {
                instants.push(interval.start);
            } else {
                spans.push(interval);
            }
        }
        spans.sort_by_key(|interval| interval.start);

        let mut intervals: Vec<Interval> = Vec::with_capacity(spans.len());
        for interval in spans {
            match intervals.last_mut() {
                Some(last) if interval.start <= last.end => {
                    last.end = last.end.max(interval.end);
                }
                _ => intervals.push(interval),
            }
        }

        instants.sort_unstable();
        instants.dedup();
        instants.retain(|t| t.is_finite() && covering(&intervals, *t).is_none());

        Self {
            intervals,
            instants,
        }
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn instants(&self) -> &[TimeValue] {
        &self.instants
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty() && self.instants.is_empty()
    }

    /// Point membership, O(log n).
    pub fn contains_instant(&self, t: TimeValue) -> bool {
        covering(&self.intervals, t).is_some() || self.instants.binary_search(&t).is_ok()
    }

    /// Minimal representation of every time in either collection.
    pub fn union(&self, other: &Self) -> Self {
        let intervals = self
            .intervals
            .iter()
            .chain(&other.intervals)
            .copied()
            .collect();
        let instants = self
            .instants
            .iter()
            .chain(&other.instants)
            .copied()
            .collect();
        Self::from_parts(intervals, instants)
    }

    /// Every time present in both collections.
    pub fn intersect(&self, other: &Self) -> Self {
        let (a, b) = (&self.intervals, &other.intervals);
        let mut overlaps = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < a.len() && j < b.len() {
            let lo = a[i].start.max(b[j].start);
            let hi = a[i].end.min(b[j].end);
            if lo < hi {
                overlaps.push(Interval { start: lo, end: hi });
            }
            if a[i].end < b[j].end {
                i += 1;
            } else {
                j += 1;
            }
        }

        let instants = self
            .instants
            .iter()
            .filter(|t| other.contains_instant(**t))
            .chain(
                other
                    .instants
                    .iter()
                    .filter(|t| self.contains_instant(**t)),
            )
            .copied()
            .collect();

        Self::from_parts(overlaps, instants)
    }

    /// `within` minus `self`.
    ///
    /// Isolated instants of `self` have no extent and do not puncture
    /// `within`'s intervals; instants of `within` survive unless `self`
    /// contains them.
    pub fn complement(&self, within: &Self) -> Self {
        let mut remaining = Vec::new();
        for window in &within.intervals {
            let mut cursor = window.start;
            let mut k = self
                .intervals
                .partition_point(|interval| interval.end <= window.start);
            while k < self.intervals.len() && self.intervals[k].start < window.end {
                let cut = self.intervals[k];
                if cut.start > cursor {
                    remaining.push(Interval {
                        start: cursor,
                        end: cut.start,
                    });
                }
                cursor = cursor.max(cut.end);
                k += 1;
            }
            if cursor < window.end {
                remaining.push(Interval {
                    start: cursor,
                    end: window.end,
                });
            }
        }

        let instants = within
            .instants
            .iter()
            .filter(|t| !self.contains_instant(**t))
            .copied()
            .collect();

        Self::from_parts(remaining, instants)
    }

    /// Earliest time in the collection.
    pub fn first_start(&self) -> Option<TimeValue> {
        let span = self.intervals.first().map(|interval| interval.start);
        let point = self.instants.first().copied();
        match (span, point) {
            (Some(s), Some(p)) => Some(s.min(p)),
            (s, p) => s.or(p),
        }
    }

    /// Exclusive end of the last interval, or the last instant if later.
    pub fn last_end(&self) -> Option<TimeValue> {
        let span = self.intervals.last().map(|interval| interval.end);
        let point = self.instants.last().copied();
        match (span, point) {
            (Some(s), Some(p)) => Some(s.max(p)),
            (s, p) => s.or(p),
        }
    }

    /// Smallest time `>= t` contained in the collection.
    pub fn next_active_at_or_after(&self, t: TimeValue) -> Option<TimeValue> {
        if self.contains_instant(t) {
            return Some(t);
        }
        let next_span = self
            .intervals
            .get(self.intervals.partition_point(|interval| interval.start <= t))
            .map(|interval| interval.start);
        let next_point = self
            .instants
            .get(self.instants.partition_point(|p| *p <= t))
            .copied();
        match (next_span, next_point) {
            (Some(s), Some(p)) => Some(s.min(p)),
            (s, p) => s.or(p),
        }
    }
}

/// Index of the interval covering `t`, by binary search over sorted starts.
fn covering(intervals: &[Interval], t: TimeValue) -> Option<usize> {
    let idx = intervals.partition_point(|interval| interval.start <= t);
    (idx > 0 && t < intervals[idx - 1].end).then(|| idx - 1)
}
