//! Hobby servo on a pulse-width PWM channel

use crate::config::ServoConfig;
use crate::hal::PulseWidthOutput;
use crate::scan::ANGLE_MAX;
use std::fmt::Debug;
use thiserror::Error;

/// Neutral position applied on construction
pub const CENTER_ANGLE: u8 = 90;

/// Pulse width for `angle` with the default SG90 geometry (500-2400 µs)
pub fn pulse_width_us(angle: u8) -> u32 {
    ServoConfig::default().pulse_width_us(angle)
}

#[derive(Error, Debug)]
pub enum ServoError<E: Debug> {
    #[error("PWM output failed: {0:?}")]
    Pwm(E),

    #[error("Pulse range {min_us}..{max_us} us does not fit a {period_us} us period")]
    InvalidRange {
        min_us: u32,
        max_us: u32,
        period_us: u32,
    },
}

pub struct Servo<P> {
    pwm: P,
    config: ServoConfig,
    angle: u8,
}

impl<P: PulseWidthOutput> Servo<P> {
    /// Configure the PWM period and centre the horn
    pub fn new(mut pwm: P, config: ServoConfig) -> Result<Self, ServoError<P::Error>> {
        if !config.is_valid() {
            return Err(ServoError::InvalidRange {
                min_us: config.min_pulse_us,
                max_us: config.max_pulse_us,
                period_us: config.period_us,
            });
        }
        pwm.set_period_us(config.period_us).map_err(ServoError::Pwm)?;

        let mut servo = Self {
            pwm,
            config,
            angle: CENTER_ANGLE,
        };
        servo.set_angle(CENTER_ANGLE)?;
        Ok(servo)
    }

    /// Drive to `angle` (clamped to 180) and return the pulse width applied
    pub fn set_angle(&mut self, angle: u8) -> Result<u32, ServoError<P::Error>> {
        let angle = angle.min(ANGLE_MAX);
        let pulse = self.config.pulse_width_us(angle);
        self.pwm.set_pulse_width_us(pulse).map_err(ServoError::Pwm)?;
        self.angle = angle;
        Ok(pulse)
    }

    /// Last angle successfully applied
    pub fn angle(&self) -> u8 {
        self.angle
    }
}
