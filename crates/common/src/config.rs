//! Configuration for clock resolution and key-time resolution.

use serde::{Deserialize, Serialize};

use crate::types::TimeValue;

/// How out-of-range Percent/TimeSpan key times are treated.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyTimePolicy {
    /// Fail resolution with an invalid-timing error naming the frame.
    #[default]
    Reject,
    /// Clamp into `[0, total]` and log a warning.
    Clamp,
}

/// Top-level timing engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Upper bound on top-down slip propagation passes before the offending
    /// subtree is degraded to stopped.
    pub max_slip_passes: u32,
    /// Simple duration used for an `Automatic` leaf whose content length the
    /// host never supplied.
    pub default_natural_duration: TimeValue,
    pub key_time_policy: KeyTimePolicy,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            max_slip_passes: 16,
            default_natural_duration: TimeValue::from_secs(1.0),
            key_time_policy: KeyTimePolicy::Reject,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TimingConfig::default();
        assert_eq!(config.max_slip_passes, 16);
        assert_eq!(config.default_natural_duration, TimeValue::from_secs(1.0));
        assert_eq!(config.key_time_policy, KeyTimePolicy::Reject);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: TimingConfig =
            serde_json::from_str(r#"{"key_time_policy":"Clamp"}"#).expect("deserialize");
        assert_eq!(config.key_time_policy, KeyTimePolicy::Clamp);
        assert_eq!(config.max_slip_passes, 16);
    }
}
