//! Simulated bench: an ultrasonic sensor looking at a wobbling object, a servo and
//! an LED, all on host time.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use log::{debug, trace};
use radar::hal::{MonotonicTimer, PulseWidthOutput};
use rand::Rng;
use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

/// Sensor latency between the end of the trigger pulse and the echo rising edge
const ECHO_LATENCY: Duration = Duration::from_micros(200);

/// What the simulated sensor is pointed at
#[derive(Debug, Clone)]
pub struct SceneConfig {
    /// Nominal object distance in centimetres
    pub object_cm: u16,
    /// Uniform noise added to every reading
    pub jitter_cm: u16,
    /// Probability that a ping gets no echo at all
    pub dropout: f64,
}

#[derive(Debug, Clone, Copy)]
struct EchoWindow {
    rise: Instant,
    fall: Instant,
}

/// Trigger line. The falling edge of a pulse arms the echo window.
pub struct SimTrigger {
    scene: SceneConfig,
    high: bool,
    window: Rc<Cell<Option<EchoWindow>>>,
}

/// Echo line, high while the armed window is open
pub struct SimEcho {
    window: Rc<Cell<Option<EchoWindow>>>,
}

pub fn sonar_pins(scene: SceneConfig) -> (SimTrigger, SimEcho) {
    let window = Rc::new(Cell::new(None));
    (
        SimTrigger {
            scene,
            high: false,
            window: window.clone(),
        },
        SimEcho { window },
    )
}

impl SimTrigger {
    fn arm(&mut self) {
        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.scene.dropout.clamp(0.0, 1.0)) {
            trace!("Simulated ping lost");
            self.window.set(None);
            return;
        }

        let jitter = i32::from(self.scene.jitter_cm);
        let cm = (i32::from(self.scene.object_cm) + rng.gen_range(-jitter..=jitter)).max(2);
        // Round trip at 0.0343 cm/us
        let echo_us = u64::try_from(cm).unwrap_or(2) * 20_000 / 343;
        let rise = Instant::now() + ECHO_LATENCY;
        self.window.set(Some(EchoWindow {
            rise,
            fall: rise + Duration::from_micros(echo_us),
        }));
        trace!("Simulated object at {} cm", cm);
    }
}

impl ErrorType for SimTrigger {
    type Error = Infallible;
}

impl OutputPin for SimTrigger {
    fn set_low(&mut self) -> Result<(), Infallible> {
        if self.high {
            self.arm();
        }
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.high = true;
        Ok(())
    }
}

impl ErrorType for SimEcho {
    type Error = Infallible;
}

impl InputPin for SimEcho {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        let now = Instant::now();
        Ok(self
            .window
            .get()
            .is_some_and(|w| now >= w.rise && now < w.fall))
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

/// Blocking delay on the host scheduler
pub struct HostDelay;

impl DelayNs for HostDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

/// Microsecond stopwatch on [`Instant`]
pub struct HostTimer {
    base: Instant,
    running: bool,
    frozen: u32,
}

impl Default for HostTimer {
    fn default() -> Self {
        Self {
            base: Instant::now(),
            running: false,
            frozen: 0,
        }
    }
}

impl MonotonicTimer for HostTimer {
    fn reset(&mut self) {
        self.base = Instant::now();
        self.frozen = 0;
    }

    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.frozen = self.elapsed_us();
        self.running = false;
    }

    fn elapsed_us(&self) -> u32 {
        if self.running {
            u32::try_from(self.base.elapsed().as_micros()).unwrap_or(u32::MAX)
        } else {
            self.frozen
        }
    }
}

/// PWM channel that logs what a servo would receive
#[derive(Default)]
pub struct SimPwm {
    period_us: u32,
}

impl PulseWidthOutput for SimPwm {
    type Error = Infallible;

    fn set_period_us(&mut self, period_us: u32) -> Result<(), Infallible> {
        self.period_us = period_us;
        debug!("PWM period {} us", period_us);
        Ok(())
    }

    fn set_pulse_width_us(&mut self, pulse_us: u32) -> Result<(), Infallible> {
        trace!("PWM pulse {}/{} us", pulse_us, self.period_us);
        Ok(())
    }
}

/// Indicator LED; shares its level with the console
#[derive(Clone, Default)]
pub struct SimLed {
    lit: Rc<Cell<bool>>,
}

impl SimLed {
    pub fn is_lit(&self) -> bool {
        self.lit.get()
    }
}

impl ErrorType for SimLed {
    type Error = Infallible;
}

impl OutputPin for SimLed {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.lit.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.lit.set(true);
        Ok(())
    }
}
