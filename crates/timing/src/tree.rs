//! Timing tree: an arena of timeline nodes and the composition of their
//! schedules.
//!
//! Resolution runs in three steps:
//! 1. Bottom-up, `Automatic` durations are resolved from host-supplied
//!    content lengths or from the extent of the node's children.
//! 2. Top-down, each node is placed under its parent's activity. Parents
//!    always precede their children in the arena, so index order is a valid
//!    top-down order.
//! 3. Slip: every `Slip` child that started late asks its parent to shift
//!    later by the delay, and step 2 is repeated. The loop is capped at
//!    [`TimingConfig::max_slip_passes`]; parents still receiving requests at
//!    the cap are degraded to stopped along with their subtrees.
//!
//! The result is cached under the tree's epoch, which every mutation bumps.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use anim_common::{TimeValue, TimingConfig};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::clock::{simple_duration, ClockSnapshot, NodeSchedule, ParentActivity};
use crate::error::{TimingError, TimingResult};
use crate::interval::TimeIntervalCollection;
use crate::types::{SlipBehavior, TimingParameters};

/// Handle to a node in a [`TimingTree`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Clone, Debug)]
struct Node {
    params: TimingParameters,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Content length supplied by the host for `Automatic` durations.
    natural_duration: Option<TimeValue>,
}

/// A forest of timeline nodes sharing one host clock.
#[derive(Debug)]
pub struct TimingTree {
    nodes: Vec<Node>,
    host_window: TimeIntervalCollection,
    config: TimingConfig,
    epoch: u64,
    cache: RwLock<Option<Arc<ResolvedTiming>>>,
}

impl Default for TimingTree {
    fn default() -> Self {
        Self::new(TimingConfig::default())
    }
}

impl TimingTree {
    pub fn new(config: TimingConfig) -> Self {
        Self {
            nodes: Vec::new(),
            host_window: TimeIntervalCollection::from_start(TimeValue::MIN),
            config,
            epoch: 0,
            cache: RwLock::new(None),
        }
    }

    /// Add a top-level timeline driven directly by the host clock.
    pub fn add_root(&mut self, params: TimingParameters) -> TimingResult<NodeId> {
        params.validate()?;
        Ok(self.push(params, None))
    }

    /// Add a timeline under `parent`.
    pub fn add_child(&mut self, parent: NodeId, params: TimingParameters) -> TimingResult<NodeId> {
        self.node(parent)?;
        params.validate()?;
        let id = self.push(params, Some(parent));
        self.nodes[parent.0].children.push(id);
        Ok(id)
    }

    fn push(&mut self, params: TimingParameters, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            params,
            parent,
            children: Vec::new(),
            natural_duration: None,
        });
        self.bump_epoch();
        tracing::debug!(node = %id, parent = ?parent.map(|p| p.0), "Timing node added");
        id
    }

    /// Replace a node's parameters.
    pub fn set_params(&mut self, node: NodeId, params: TimingParameters) -> TimingResult<()> {
        self.node(node)?;
        params.validate()?;
        self.nodes[node.0].params = params;
        self.bump_epoch();
        Ok(())
    }

    /// Set (or clear) the content length used when the node's duration is
    /// `Automatic`. `INFINITY` marks content that never ends.
    pub fn set_natural_duration(
        &mut self,
        node: NodeId,
        natural: Option<TimeValue>,
    ) -> TimingResult<()> {
        self.node(node)?;
        if let Some(d) = natural {
            if d.is_negative() {
                return Err(TimingError::invalid(format!(
                    "negative natural duration {d} for {node}"
                )));
            }
        }
        self.nodes[node.0].natural_duration = natural;
        self.bump_epoch();
        Ok(())
    }

    /// Restrict the global times at which the host runs the clock.
    pub fn set_host_window(&mut self, window: TimeIntervalCollection) {
        self.host_window = window;
        self.bump_epoch();
    }

    fn bump_epoch(&mut self) {
        self.epoch += 1;
    }

    /// Counter bumped by every mutation.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    pub fn host_window(&self) -> &TimeIntervalCollection {
        &self.host_window
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn params(&self, node: NodeId) -> TimingResult<&TimingParameters> {
        Ok(&self.node(node)?.params)
    }

    pub fn parent(&self, node: NodeId) -> TimingResult<Option<NodeId>> {
        Ok(self.node(node)?.parent)
    }

    pub fn children(&self, node: NodeId) -> TimingResult<&[NodeId]> {
        Ok(&self.node(node)?.children)
    }

    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(index, _)| NodeId(index))
    }

    fn node(&self, id: NodeId) -> TimingResult<&Node> {
        self.nodes.get(id.0).ok_or(TimingError::UnknownNode(id))
    }

    /// Resolved schedules for the current epoch, computed on first use.
    pub fn resolve(&self) -> Arc<ResolvedTiming> {
        if let Some(cached) = self.cache.read().as_ref() {
            if cached.epoch == self.epoch {
                return Arc::clone(cached);
            }
        }

        let mut cache = self.cache.write();
        // Another reader may have resolved while we waited for the lock.
        if let Some(cached) = cache.as_ref() {
            if cached.epoch == self.epoch {
                return Arc::clone(cached);
            }
        }
        let resolved = Arc::new(self.compute());
        *cache = Some(Arc::clone(&resolved));
        resolved
    }

    /// Sample `node` at global time `t`.
    pub fn evaluate(&self, node: NodeId, t: TimeValue) -> TimingResult<ClockSnapshot> {
        self.resolve().evaluate(node, t)
    }

    fn compute(&self) -> ResolvedTiming {
        let natural = self.natural_durations();
        let max_passes = self.config.max_slip_passes.max(1);
        let mut shifts: HashMap<NodeId, TimeValue> = HashMap::new();
        let mut passes = 0;

        loop {
            passes += 1;
            let mut schedules = self.compose(&natural, &shifts);
            let requests = self.slip_requests(&schedules);

            if requests.is_empty() {
                tracing::debug!(
                    epoch = self.epoch,
                    nodes = self.nodes.len(),
                    passes,
                    "Timing tree resolved"
                );
                return ResolvedTiming {
                    epoch: self.epoch,
                    schedules,
                    diagnostics: Vec::new(),
                    passes,
                };
            }

            if passes >= max_passes {
                let diagnostics = self.degrade(&mut schedules, &requests, passes);
                tracing::debug!(
                    epoch = self.epoch,
                    nodes = self.nodes.len(),
                    passes,
                    degraded = diagnostics.len(),
                    "Timing tree resolved with degraded nodes"
                );
                return ResolvedTiming {
                    epoch: self.epoch,
                    schedules,
                    diagnostics,
                    passes,
                };
            }

            for (parent, delay) in requests {
                *shifts.entry(parent).or_insert(TimeValue::ZERO) += delay;
            }
        }
    }

    /// Resolve each node's content length, children before parents.
    fn natural_durations(&self) -> Vec<TimeValue> {
        let mut natural = vec![self.config.default_natural_duration; self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate().rev() {
            natural[index] = match node.natural_duration {
                Some(d) => d,
                None => self
                    .children_extent(node, &natural)
                    .unwrap_or(self.config.default_natural_duration),
            };
        }
        natural
    }

    /// Latest end of any child that starts, in the node's local time.
    fn children_extent(&self, node: &Node, natural: &[TimeValue]) -> Option<TimeValue> {
        node.children
            .iter()
            .filter_map(|child| {
                let params = &self.nodes[child.0].params;
                let begin = params.begin?;
                let simple = simple_duration(params.duration, natural[child.0]);
                let active = params.active_duration(simple);
                let end = begin + active.scale(1.0 / params.speed_ratio);
                Some(end.max(TimeValue::ZERO))
            })
            .max()
    }

    fn compose(
        &self,
        natural: &[TimeValue],
        shifts: &HashMap<NodeId, TimeValue>,
    ) -> Vec<NodeSchedule> {
        let host = ParentActivity::root(self.host_window.clone());
        let mut schedules: Vec<NodeSchedule> = Vec::with_capacity(self.nodes.len());
        for (index, node) in self.nodes.iter().enumerate() {
            let shift = shifts
                .get(&NodeId(index))
                .copied()
                .unwrap_or(TimeValue::ZERO);
            let schedule = match node.parent {
                Some(parent) => {
                    let activity = schedules[parent.0].child_activity();
                    NodeSchedule::compute(&node.params, natural[index], &activity, shift)
                }
                None => NodeSchedule::compute(&node.params, natural[index], &host, shift),
            };
            schedules.push(schedule);
        }
        schedules
    }

    /// Largest start delay of any `Slip` child, per parent.
    fn slip_requests(&self, schedules: &[NodeSchedule]) -> BTreeMap<NodeId, TimeValue> {
        let mut requests = BTreeMap::new();
        for (index, node) in self.nodes.iter().enumerate() {
            let Some(parent) = node.parent else {
                continue;
            };
            if node.params.slip != SlipBehavior::Slip {
                continue;
            }
            let delay = schedules[index].delay();
            if delay <= TimeValue::ZERO {
                continue;
            }
            tracing::debug!(
                node = %NodeId(index),
                parent = %parent,
                delay = %delay,
                "Slip requested"
            );
            requests
                .entry(parent)
                .and_modify(|d: &mut TimeValue| *d = (*d).max(delay))
                .or_insert(delay);
        }
        requests
    }

    /// Stop every parent still receiving slip requests, and its subtree.
    fn degrade(
        &self,
        schedules: &mut [NodeSchedule],
        requests: &BTreeMap<NodeId, TimeValue>,
        passes: u32,
    ) -> Vec<TimingError> {
        let mut degraded = vec![false; self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            let inherited = node.parent.is_some_and(|parent| degraded[parent.0]);
            if inherited || requests.contains_key(&NodeId(index)) {
                degraded[index] = true;
                schedules[index] = NodeSchedule::stopped();
            }
        }

        requests
            .keys()
            .map(|&node| {
                tracing::warn!(
                    node = %node,
                    passes,
                    "Slip did not converge; subtree stopped"
                );
                TimingError::InconsistentSlip { node, passes }
            })
            .collect()
    }
}

/// Schedules of every node in a tree at one epoch.
#[derive(Clone, Debug)]
pub struct ResolvedTiming {
    epoch: u64,
    schedules: Vec<NodeSchedule>,
    diagnostics: Vec<TimingError>,
    passes: u32,
}

impl ResolvedTiming {
    /// Epoch of the tree these schedules were computed from.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Composition passes run, including slip re-runs.
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Non-fatal problems found while resolving (slip that did not converge).
    pub fn diagnostics(&self) -> &[TimingError] {
        &self.diagnostics
    }

    pub fn schedule(&self, node: NodeId) -> TimingResult<&NodeSchedule> {
        self.schedules
            .get(node.0)
            .ok_or(TimingError::UnknownNode(node))
    }

    pub fn evaluate(&self, node: NodeId, t: TimeValue) -> TimingResult<ClockSnapshot> {
        let snapshot = self.schedule(node)?.sample(t);
        tracing::trace!(
            node = %node,
            t = %t,
            state = ?snapshot.state,
            progress = ?snapshot.progress,
            "Clock sampled"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockState;
    use crate::types::{Duration, RepeatBehavior};

    fn secs(s: f64) -> TimeValue {
        TimeValue::from_secs(s)
    }

    fn timed(duration: f64) -> TimingParameters {
        TimingParameters::new(Duration::from_secs(duration))
    }

    fn progress(tree: &TimingTree, node: NodeId, t: f64) -> f64 {
        tree.evaluate(node, secs(t))
            .unwrap()
            .progress
            .expect("progress defined")
    }

    #[test]
    fn unknown_node_is_reported() {
        let mut tree = TimingTree::default();
        let missing = NodeId(3);
        assert_eq!(
            tree.add_child(missing, timed(1.0)),
            Err(TimingError::UnknownNode(missing))
        );
        assert_eq!(
            tree.evaluate(missing, TimeValue::ZERO),
            Err(TimingError::UnknownNode(missing))
        );
    }

    #[test]
    fn invalid_params_rejected_on_insert() {
        let mut tree = TimingTree::default();
        let bad = TimingParameters {
            speed_ratio: 0.0,
            ..timed(1.0)
        };
        assert!(matches!(
            tree.add_root(bad),
            Err(TimingError::InvalidTiming { .. })
        ));
        assert!(tree.is_empty());
        assert_eq!(tree.epoch(), 0);
    }

    #[test]
    fn structure_accessors() {
        let mut tree = TimingTree::default();
        let root = tree.add_root(timed(4.0)).unwrap();
        let a = tree.add_child(root, timed(1.0)).unwrap();
        let b = tree.add_child(root, timed(2.0)).unwrap();
        assert_eq!(tree.children(root).unwrap(), &[a, b]);
        assert_eq!(tree.parent(b).unwrap(), Some(root));
        assert_eq!(tree.roots().collect::<Vec<_>>(), vec![root]);
        assert_eq!(tree.len(), 3);
        assert_eq!(root.to_string(), "node#0");
    }

    #[test]
    fn automatic_group_spans_children() {
        let mut tree = TimingTree::default();
        let group = tree.add_root(TimingParameters::default()).unwrap();
        tree.add_child(group, timed(2.0)).unwrap();
        tree.add_child(
            group,
            TimingParameters {
                begin: Some(secs(1.0)),
                repeat: RepeatBehavior::Count(2.0),
                ..timed(1.5)
            },
        )
        .unwrap();

        let resolved = tree.resolve();
        let schedule = resolved.schedule(group).unwrap();
        assert_eq!(schedule.simple_duration(), secs(4.0));
        assert_eq!(schedule.active_end(), Some(secs(4.0)));
    }

    #[test]
    fn automatic_group_with_forever_child_is_forever() {
        let mut tree = TimingTree::default();
        let group = tree.add_root(TimingParameters::default()).unwrap();
        tree.add_child(
            group,
            TimingParameters {
                repeat: RepeatBehavior::Forever,
                ..timed(1.0)
            },
        )
        .unwrap();
        let resolved = tree.resolve();
        assert!(resolved.schedule(group).unwrap().simple_duration().is_infinite());
    }

    #[test]
    fn natural_duration_overrides_default() {
        let mut tree = TimingTree::default();
        let leaf = tree.add_root(TimingParameters::default()).unwrap();
        assert!((progress(&tree, leaf, 0.5) - 0.5).abs() < 1e-9);

        tree.set_natural_duration(leaf, Some(secs(4.0))).unwrap();
        assert!((progress(&tree, leaf, 0.5) - 0.125).abs() < 1e-9);

        assert!(tree.set_natural_duration(leaf, Some(secs(-1.0))).is_err());
    }

    #[test]
    fn child_clipped_by_parent() {
        let mut tree = TimingTree::default();
        let parent = tree.add_root(timed(1.0)).unwrap();
        let child = tree.add_child(parent, timed(4.0)).unwrap();

        assert!((progress(&tree, child, 0.5) - 0.125).abs() < 1e-9);
        let snapshot = tree.evaluate(child, secs(2.0)).unwrap();
        assert_eq!(snapshot.state, ClockState::Filling);
        assert!((snapshot.progress.unwrap() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn resolution_cached_per_epoch() {
        let mut tree = TimingTree::default();
        let node = tree.add_root(timed(2.0)).unwrap();

        let first = tree.resolve();
        let second = tree.resolve();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.epoch(), tree.epoch());

        tree.set_params(node, timed(4.0)).unwrap();
        let third = tree.resolve();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.epoch(), tree.epoch());
        assert!((third.evaluate(node, secs(1.0)).unwrap().progress.unwrap() - 0.25).abs() < 1e-9);
        // The old snapshot is unaffected.
        assert!((first.evaluate(node, secs(1.0)).unwrap().progress.unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn resolved_timing_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ResolvedTiming>();
        assert_send_sync::<TimingTree>();
    }
}
