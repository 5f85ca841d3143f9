//! HC-SR04 style ultrasonic rangefinder
//!
//! A measurement pulses the trigger line for 10 µs, then times the echo pulse with a
//! microsecond stopwatch. Both echo waits are bounded by the echo budget, so a stuck
//! line yields [`SonarError::Timeout`] instead of hanging the control loop.

use crate::config::DEFAULT_ECHO_TIMEOUT_US;
use crate::hal::{DelayNs, InputPin, MonotonicTimer, OutputPin, PinError, PinErrorKind};
use log::trace;
use std::fmt;
use thiserror::Error;

/// Settle time with the trigger held low before the pulse
const TRIGGER_SETTLE_US: u32 = 2;
/// Trigger pulse width
const TRIGGER_PULSE_US: u32 = 10;

/// A measured distance in whole centimetres
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Distance(u16);

impl Distance {
    pub const fn from_cm(cm: u16) -> Self {
        Distance(cm)
    }

    /// Convert a round-trip echo time. Sound covers 0.0343 cm/µs and the pulse travels
    /// out and back, so `cm = us * 0.0343 / 2`, truncated.
    pub fn from_echo_us(echo_us: u32) -> Self {
        let cm = u64::from(echo_us) * 343 / 20_000;
        Distance(u16::try_from(cm).unwrap_or(u16::MAX))
    }

    pub fn cm(self) -> u16 {
        self.0
    }

    /// Value for a one-byte attribute cell; saturates at 255
    pub fn as_cell_value(self) -> u8 {
        u8::try_from(self.0).unwrap_or(u8::MAX)
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cm", self.0)
    }
}

/// Which echo edge the sensor was waiting for when it gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoEdge {
    Rising,
    Falling,
}

/// Errors that can occur during a measurement
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SonarError {
    #[error("No {edge:?} echo edge within {budget_us} us")]
    Timeout { edge: EchoEdge, budget_us: u32 },

    #[error("Sensor pin error: {0:?}")]
    Pin(PinErrorKind),
}

fn pin_error<E: PinError>(err: E) -> SonarError {
    SonarError::Pin(err.kind())
}

/// Anything that can take one blocking range measurement
pub trait RangeSensor {
    fn measure(&mut self) -> Result<Distance, SonarError>;
}

/// Ultrasonic sensor on a trigger output and an echo input
pub struct Sonar<T, E, D, C> {
    trigger: T,
    echo: E,
    delay: D,
    timer: C,
    budget_us: u32,
}

impl<T, E, D, C> Sonar<T, E, D, C>
where
    T: OutputPin,
    E: InputPin,
    D: DelayNs,
    C: MonotonicTimer,
{
    pub fn new(trigger: T, echo: E, delay: D, timer: C) -> Self {
        Self {
            trigger,
            echo,
            delay,
            timer,
            budget_us: DEFAULT_ECHO_TIMEOUT_US,
        }
    }

    /// Override the per-wait echo budget
    pub fn with_echo_budget(mut self, budget_us: u32) -> Self {
        self.budget_us = budget_us;
        self
    }

    fn pulse_trigger(&mut self) -> Result<(), SonarError> {
        self.trigger.set_low().map_err(pin_error)?;
        self.delay.delay_us(TRIGGER_SETTLE_US);
        self.trigger.set_high().map_err(pin_error)?;
        self.delay.delay_us(TRIGGER_PULSE_US);
        self.trigger.set_low().map_err(pin_error)
    }

    /// Spin until the echo line reads `level`, or the budget runs out
    fn wait_for(&mut self, level: bool, edge: EchoEdge) -> Result<(), SonarError> {
        loop {
            if self.echo.is_high().map_err(pin_error)? == level {
                return Ok(());
            }
            if self.timer.elapsed_us() >= self.budget_us {
                self.timer.stop();
                return Err(SonarError::Timeout {
                    edge,
                    budget_us: self.budget_us,
                });
            }
        }
    }
}

impl<T, E, D, C> RangeSensor for Sonar<T, E, D, C>
where
    T: OutputPin,
    E: InputPin,
    D: DelayNs,
    C: MonotonicTimer,
{
    fn measure(&mut self) -> Result<Distance, SonarError> {
        self.pulse_trigger()?;

        self.timer.reset();
        self.timer.start();
        self.wait_for(true, EchoEdge::Rising)?;

        self.timer.reset();
        self.wait_for(false, EchoEdge::Falling)?;
        self.timer.stop();

        let echo_us = self.timer.elapsed_us();
        let distance = Distance::from_echo_us(echo_us);
        trace!("Echo {} us -> {}", echo_us, distance);
        Ok(distance)
    }
}
