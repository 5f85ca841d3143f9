//! Hardware seam
//!
//! Digital pins and short delays come from `embedded-hal`. The PWM output and the
//! microsecond stopwatch have no stable `embedded-hal` 1.0 trait, so they are
//! defined here.

use std::fmt::Debug;

pub use embedded_hal::delay::DelayNs;
pub use embedded_hal::digital::{Error as PinError, ErrorKind as PinErrorKind, InputPin, OutputPin};

/// A PWM channel driven by pulse width rather than duty ratio.
pub trait PulseWidthOutput {
    type Error: Debug;

    /// Set the PWM period in microseconds
    fn set_period_us(&mut self, period_us: u32) -> Result<(), Self::Error>;

    /// Set the high time of each period in microseconds
    fn set_pulse_width_us(&mut self, pulse_us: u32) -> Result<(), Self::Error>;
}

/// A resettable microsecond stopwatch.
pub trait MonotonicTimer {
    /// Zero the elapsed count without changing the running state
    fn reset(&mut self);
    fn start(&mut self);
    fn stop(&mut self);
    /// Microseconds counted since the last reset
    fn elapsed_us(&self) -> u32;
}
