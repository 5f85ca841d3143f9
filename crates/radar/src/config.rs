//! Runtime configuration for the scan loop

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Round-trip echo budget, roughly 4 m of range
pub const DEFAULT_ECHO_TIMEOUT_US: u32 = 23_200;
pub const DEFAULT_TICK_PERIOD_MS: u64 = 150;

/// When the tick pushes angle and distance to the attribute cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PublishPolicy {
    /// Publish on every tick
    #[default]
    EveryTick,
    /// Skip the publish while both angle and distance stay within `epsilon` of the last
    /// published pair
    OnChange { epsilon: u8 },
}

/// Servo pulse geometry (SG90 defaults)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    pub period_us: u32,
    /// Pulse width at 0 degrees
    pub min_pulse_us: u32,
    /// Pulse width at 180 degrees
    pub max_pulse_us: u32,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            period_us: 20_000,
            min_pulse_us: 500,
            max_pulse_us: 2400,
        }
    }
}

impl ServoConfig {
    /// Linear map of an angle onto the pulse range. Angles above 180 are clamped.
    pub fn pulse_width_us(&self, angle: u8) -> u32 {
        let angle = u64::from(angle.min(crate::scan::ANGLE_MAX));
        let span = u64::from(self.max_pulse_us.saturating_sub(self.min_pulse_us));
        let offset = angle * span / u64::from(crate::scan::ANGLE_MAX);
        // offset <= span, so the sum never passes max_pulse_us
        self.min_pulse_us
            .saturating_add(u32::try_from(offset).unwrap_or(u32::MAX))
    }

    /// Whether the pulse range is ordered and fits inside the period
    pub fn is_valid(&self) -> bool {
        self.min_pulse_us < self.max_pulse_us && self.max_pulse_us <= self.period_us
    }
}

/// Scan loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    /// Period of the scan tick
    pub tick_period_ms: u64,
    /// Budget for each echo wait
    pub echo_timeout_us: u32,
    pub servo: ServoConfig,
    pub publish: PublishPolicy,
    /// Initial value of the threshold cell, in centimetres
    pub initial_threshold_cm: u8,
    /// Schedule the tick as soon as the controller starts
    pub start_running: bool,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
            echo_timeout_us: DEFAULT_ECHO_TIMEOUT_US,
            servo: ServoConfig::default(),
            publish: PublishPolicy::default(),
            initial_threshold_cm: 0,
            start_running: true,
        }
    }
}

impl RadarConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Check values that would make the loop misbehave
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_period_ms == 0 {
            return Err("tick_period_ms must be non-zero".into());
        }
        if self.echo_timeout_us == 0 {
            return Err("echo_timeout_us must be non-zero".into());
        }
        if !self.servo.is_valid() {
            return Err(format!(
                "servo pulse range {}..{} us does not fit a {} us period",
                self.servo.min_pulse_us, self.servo.max_pulse_us, self.servo.period_us
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_endpoints() {
        let servo = ServoConfig::default();
        assert_eq!(servo.pulse_width_us(0), 500);
        assert_eq!(servo.pulse_width_us(90), 1450);
        assert_eq!(servo.pulse_width_us(180), 2400);
        assert_eq!(servo.pulse_width_us(200), 2400);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RadarConfig =
            serde_json::from_str(r#"{ "tick_period_ms": 50, "servo": { "max_pulse_us": 2500 } }"#)
                .unwrap();
        assert_eq!(config.tick_period(), Duration::from_millis(50));
        assert_eq!(config.echo_timeout_us, DEFAULT_ECHO_TIMEOUT_US);
        assert_eq!(config.servo.min_pulse_us, 500);
        assert_eq!(config.servo.max_pulse_us, 2500);
        assert_eq!(config.publish, PublishPolicy::EveryTick);
        assert!(config.start_running);
    }

    #[test]
    fn test_publish_policy_tagged() {
        let policy: PublishPolicy =
            serde_json::from_str(r#"{ "mode": "on_change", "epsilon": 2 }"#).unwrap();
        assert_eq!(policy, PublishPolicy::OnChange { epsilon: 2 });
        assert_eq!(
            serde_json::to_string(&PublishPolicy::EveryTick).unwrap(),
            r#"{"mode":"every_tick"}"#
        );
    }

    #[test]
    fn test_pulse_width_wide_range() {
        let servo = ServoConfig {
            period_us: 4_000_000_000,
            min_pulse_us: 0,
            max_pulse_us: 4_000_000_000,
        };
        let config = RadarConfig {
            servo,
            ..RadarConfig::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(servo.pulse_width_us(180), 4_000_000_000);
        assert_eq!(servo.pulse_width_us(90), 2_000_000_000);
    }

    #[test]
    fn test_validate() {
        assert!(RadarConfig::default().validate().is_ok());

        let mut config = RadarConfig::default();
        config.servo.max_pulse_us = 400;
        assert!(config.validate().is_err());

        let config = RadarConfig {
            tick_period_ms: 0,
            ..RadarConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
