//! `anim-timing`: Timing engine for hierarchical animation timelines.
//!
//! Given a tree of timeline nodes (animations, storyboards, groups) and a
//! global clock, this crate computes for each node at any sample time:
//!
//! - **Clock state**: active, filling, or stopped
//! - **Progress**: position within the current pass, after repeat,
//!   autoreverse, and acceleration/deceleration
//! - **Iteration**: which repetition is playing
//!
//! Supporting pieces:
//!
//! - **Interval algebra**: activity windows as normalized interval collections
//! - **Key times**: resolving Uniform/Paced/Percent/TimeSpan key-frame times
//! - **Easing**: curve families with ease-in/out/in-out modes
//! - **Controller**: begin/pause/resume/seek/stop mapping of host time
//!
//! # Usage
//!
//! ```rust
//! use anim_timing::{ClockState, Duration, TimingParameters, TimingTree, RepeatBehavior};
//! use anim_common::TimeValue;
//!
//! let mut tree = TimingTree::default();
//! let node = tree
//!     .add_root(TimingParameters {
//!         repeat: RepeatBehavior::Forever,
//!         ..TimingParameters::new(Duration::from_secs(2.0))
//!     })
//!     .unwrap();
//!
//! let snapshot = tree.evaluate(node, TimeValue::from_secs(5.0)).unwrap();
//! assert_eq!(snapshot.state, ClockState::Active);
//! assert!((snapshot.progress.unwrap() - 0.5).abs() < 1e-9);
//! ```

pub mod clock;
pub mod controller;
pub mod easing;
pub mod error;
pub mod interval;
pub mod keytime;
pub mod tree;
pub mod types;

// Re-export primary API
pub use clock::{
    apply_acceleration, evaluate, simple_duration, ClockSnapshot, ClockState, NodeSchedule,
    ParentActivity,
};
pub use controller::{ClockController, ControllerState};
pub use easing::{ease, EasingCurve, EasingMode, EasingRegistry};
pub use error::{TimingError, TimingResult};
pub use interval::{Interval, TimeIntervalCollection};
pub use keytime::{resolve_key_times, KeyTime, KeyTimeResolver, ResolvedKeyFrame};
pub use tree::{NodeId, ResolvedTiming, TimingTree};
pub use types::{Duration, FillBehavior, RepeatBehavior, SlipBehavior, TimingParameters};
