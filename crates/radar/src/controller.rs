//! Scan controller
//!
//! Owns the sensor, the servo, the indicator and the radar service, and runs one
//! measure/advance/actuate/publish cycle per tick. The tick is a recurring event on a
//! [`Scheduler`]; writes to the `running` cell schedule or cancel it.

use crate::att::{AttResult, HandleValueUpdate, PendingWrite};
use crate::config::{PublishPolicy, RadarConfig};
use crate::dispatch::{Scheduler, TaskId};
use crate::error::RadarError;
use crate::gatt::GattServer;
use crate::hal::{OutputPin, PinError, PulseWidthOutput};
use crate::scan::ScanState;
use crate::servo::Servo;
use crate::service::{Cell, RadarService};
use crate::sonar::{Distance, RangeSensor, SonarError};
use log::{debug, error, info, warn};

pub struct ScanController<R, P, L> {
    config: RadarConfig,
    service: RadarService,
    sensor: R,
    servo: Servo<P>,
    indicator: L,
    scan: ScanState,
    tick_task: Option<TaskId>,
    /// Last successful measurement, held across timeouts
    last_distance: Option<Distance>,
    /// (angle, distance) pushed by the last publish
    last_published: Option<(u8, u8)>,
    alert: bool,
}

impl<R, P, L> ScanController<R, P, L>
where
    R: RangeSensor,
    P: PulseWidthOutput,
    L: OutputPin,
{
    /// Register the radar service on `server` and take ownership of the hardware.
    pub fn new(
        config: RadarConfig,
        server: GattServer,
        sensor: R,
        servo: Servo<P>,
        mut indicator: L,
    ) -> Result<Self, RadarError> {
        config.validate().map_err(RadarError::Config)?;

        let service = RadarService::register(server, config.initial_threshold_cm)
            .map_err(RadarError::ServiceRegistration)?;

        if let Err(e) = indicator.set_low() {
            error!("Failed to clear indicator: {:?}", e.kind());
        }

        Ok(Self {
            config,
            service,
            sensor,
            servo,
            indicator,
            scan: ScanState::default(),
            tick_task: None,
            last_distance: None,
            last_published: None,
            alert: false,
        })
    }

    /// Schedule the tick if the configuration asks to start running, and mirror the
    /// run state into the `running` cell.
    pub fn start(&mut self, scheduler: &mut impl Scheduler) {
        let running = self.config.start_running;
        self.set_running(running, scheduler);
    }

    /// Route a fired timer. Returns `false` if the timer is not the scan tick.
    pub fn on_timer(&mut self, task: TaskId) -> bool {
        if self.tick_task != Some(task) {
            return false;
        }
        self.tick();
        true
    }

    /// One scan cycle
    pub fn tick(&mut self) {
        match self.sensor.measure() {
            Ok(distance) => self.last_distance = Some(distance),
            Err(e @ SonarError::Timeout { .. }) => {
                warn!("{}, holding last distance {:?}", e, self.last_distance);
            }
            Err(e) => {
                error!("{}, holding last distance {:?}", e, self.last_distance);
            }
        }

        let angle = self.scan.advance();
        if let Err(e) = self.servo.set_angle(angle) {
            error!("Failed to move servo to {}: {}", angle, e);
        }

        let threshold = self.service.read(Cell::Threshold);
        let alert = self
            .last_distance
            .is_some_and(|d| d.cm() <= u16::from(threshold));
        self.set_indicator(alert);

        let distance = self.last_distance.map_or(0, Distance::as_cell_value);
        debug!(
            "Tick: angle {} distance {:?} threshold {} alert {}",
            angle, self.last_distance, threshold, alert
        );
        self.publish(angle, distance);
    }

    fn set_indicator(&mut self, on: bool) {
        let result = if on {
            self.indicator.set_high()
        } else {
            self.indicator.set_low()
        };
        if let Err(e) = result {
            error!("Failed to drive indicator: {:?}", e.kind());
            return;
        }
        if on != self.alert {
            info!("Proximity alert {}", if on { "raised" } else { "cleared" });
        }
        self.alert = on;
    }

    fn publish(&mut self, angle: u8, distance: u8) {
        if let (PublishPolicy::OnChange { epsilon }, Some((last_angle, last_distance))) =
            (self.config.publish, self.last_published)
        {
            if angle.abs_diff(last_angle) <= epsilon && distance.abs_diff(last_distance) <= epsilon
            {
                return;
            }
        }

        for (cell, value) in [(Cell::Angle, angle), (Cell::Distance, distance)] {
            if let Err(e) = self.service.publish(cell, value) {
                error!("Failed to publish {}: {}", cell.name(), e);
            }
        }
        self.last_published = Some((angle, distance));
    }

    /// Apply a peer write and react to run/stop and threshold changes. A rejected write
    /// is returned so the radio stack can report its error code.
    pub fn handle_write(
        &mut self,
        write: &PendingWrite,
        scheduler: &mut impl Scheduler,
    ) -> AttResult<()> {
        let committed = self
            .service
            .handle_write(write)
            .inspect_err(|e| warn!("Rejected write to handle {}: {}", write.handle, e))?;

        match committed {
            Some((Cell::Running, value)) => self.set_running(value != 0, scheduler),
            Some((Cell::Threshold, value)) => info!("Alert threshold set to {} cm", value),
            Some((cell, value)) => {
                // The next tick must overwrite the peer's value even under OnChange
                self.last_published = None;
                debug!("Peer wrote {} to {}", value, cell.name());
            }
            None => {}
        }
        Ok(())
    }

    fn set_running(&mut self, run: bool, scheduler: &mut impl Scheduler) {
        match (run, self.tick_task) {
            (true, None) => {
                let task = scheduler.call_every(self.config.tick_period());
                info!("Scan started, tick every {:?}", self.config.tick_period());
                self.tick_task = Some(task);
            }
            (false, Some(task)) => {
                scheduler.cancel(task);
                info!("Scan stopped");
                self.tick_task = None;
            }
            _ => {}
        }

        let running = u8::from(self.tick_task.is_some());
        if let Err(e) = self.service.publish(Cell::Running, running) {
            error!("Failed to publish running state: {}", e);
        }
    }

    /// Serve a peer read
    pub fn handle_read(&self, handle: u16) -> AttResult<Vec<u8>> {
        self.service.handle_read(handle)
    }

    /// Take queued notifications and indications for the radio stack
    pub fn drain_updates(&mut self) -> Vec<HandleValueUpdate> {
        self.service.drain_updates()
    }

    /// Forget client subscriptions after the peer went away
    pub fn peer_disconnected(&mut self) {
        info!("Peer disconnected, clearing subscriptions");
        self.service.server_mut().clear_subscriptions();
    }

    pub fn is_running(&self) -> bool {
        self.tick_task.is_some()
    }

    pub fn tick_task(&self) -> Option<TaskId> {
        self.tick_task
    }

    pub fn scan_state(&self) -> &ScanState {
        &self.scan
    }

    pub fn last_distance(&self) -> Option<Distance> {
        self.last_distance
    }

    pub fn alert_active(&self) -> bool {
        self.alert
    }

    pub fn service(&self) -> &RadarService {
        &self.service
    }
}

#[cfg(test)]
mod tests;
