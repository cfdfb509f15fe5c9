//! `anim-common`: Shared value types and configuration for the animation timing engine.
//!
//! - **Types**: `TimeValue` (tick-based, totally ordered, with a positive-infinity sentinel)
//! - **Config**: `TimingConfig`, `KeyTimePolicy`

pub mod config;
pub mod types;

pub use config::{KeyTimePolicy, TimingConfig};
pub use types::{TimeValue, TICKS_PER_MILLISECOND, TICKS_PER_SECOND};
