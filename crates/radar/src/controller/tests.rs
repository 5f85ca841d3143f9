//! Unit tests for the scan controller

use super::ScanController;
use crate::att::{AttErrorCode, PendingWrite};
use crate::config::{PublishPolicy, RadarConfig, ServoConfig};
use crate::dispatch::{Dispatch, EventQueue, Scheduler};
use crate::error::RadarError;
use crate::gatt::{GattServer, GattServerConfig};
use crate::hal::mock::{MockOutput, MockPwm};
use crate::servo::Servo;
use crate::service::{Cell, RADAR_SERVICE_UUID};
use crate::sonar::{Distance, EchoEdge, RangeSensor, SonarError};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

type Reading = Result<Distance, SonarError>;

const TIMEOUT: SonarError = SonarError::Timeout {
    edge: EchoEdge::Rising,
    budget_us: 23_200,
};

/// Sensor replaying queued readings; times out once the script runs dry
#[derive(Clone, Default)]
struct ScriptedSensor {
    readings: Rc<RefCell<VecDeque<Reading>>>,
}

impl ScriptedSensor {
    fn push_cm(&self, cm: u16) {
        self.readings.borrow_mut().push_back(Ok(Distance::from_cm(cm)));
    }

    fn push(&self, reading: Reading) {
        self.readings.borrow_mut().push_back(reading);
    }
}

impl RangeSensor for ScriptedSensor {
    fn measure(&mut self) -> Reading {
        self.readings.borrow_mut().pop_front().unwrap_or(Err(TIMEOUT))
    }
}

type Controller = ScanController<ScriptedSensor, MockPwm, MockOutput>;

struct Bench {
    controller: Controller,
    queue: EventQueue<PendingWrite>,
    sensor: ScriptedSensor,
    pwm: MockPwm,
    led: MockOutput,
}

impl Bench {
    fn new(config: RadarConfig) -> Self {
        let sensor = ScriptedSensor::default();
        let pwm = MockPwm::default();
        let led = MockOutput::default();
        let servo = Servo::new(pwm.clone(), config.servo).unwrap();
        let controller = ScanController::new(
            config,
            GattServer::new(GattServerConfig::default()),
            sensor.clone(),
            servo,
            led.clone(),
        )
        .unwrap();

        Self {
            controller,
            queue: EventQueue::new(),
            sensor,
            pwm,
            led,
        }
    }

    fn started(config: RadarConfig) -> Self {
        let mut bench = Self::new(config);
        bench.controller.start(&mut bench.queue);
        bench
    }

    fn write(&mut self, cell: Cell, data: Vec<u8>) -> crate::att::AttResult<()> {
        let handle = self.controller.service().handle(cell);
        self.controller
            .handle_write(&PendingWrite::new(handle, data), &mut self.queue)
    }

    fn subscribe(&mut self, cell: Cell) {
        let service = self.controller.service();
        let cccd = service
            .server()
            .get_characteristics(service.service_handle())
            .unwrap()
            .into_iter()
            .find(|c| c.uuid == cell.uuid())
            .and_then(|c| c.cccd_handle)
            .unwrap();
        self.controller
            .handle_write(&PendingWrite::new(cccd, vec![0x01, 0x00]), &mut self.queue)
            .unwrap();
    }

    fn cell(&self, cell: Cell) -> u8 {
        self.controller.service().read(cell)
    }

    fn last_pulse(&self) -> Option<u32> {
        self.pwm.log.borrow().pulses.last().copied()
    }

    /// Count queued updates for a cell, draining the queue
    fn updates_for(&mut self, cell: Cell) -> usize {
        let handle = self.controller.service().handle(cell);
        self.controller
            .drain_updates()
            .iter()
            .filter(|u| u.handle == handle)
            .count()
    }
}

fn config_with_threshold(threshold: u8) -> RadarConfig {
    RadarConfig {
        initial_threshold_cm: threshold,
        ..RadarConfig::default()
    }
}

#[test]
fn test_start_schedules_single_tick() {
    let bench = Bench::started(RadarConfig::default());
    assert!(bench.controller.is_running());
    assert_eq!(bench.queue.scheduled_timers(), 1);
    assert_eq!(bench.queue.next_deadline(), Some(Duration::from_millis(150)));
    assert_eq!(bench.cell(Cell::Running), 1);
}

#[test]
fn test_start_stopped() {
    let bench = Bench::started(RadarConfig {
        start_running: false,
        ..RadarConfig::default()
    });
    assert!(!bench.controller.is_running());
    assert_eq!(bench.queue.scheduled_timers(), 0);
    assert_eq!(bench.cell(Cell::Running), 0);
}

#[test]
fn test_tick_measures_moves_and_publishes() {
    let mut bench = Bench::started(RadarConfig::default());
    bench.sensor.push_cm(50);

    let task = match bench.queue.next_due(Duration::from_millis(150)) {
        Some(Dispatch::Timer(task)) => task,
        other => panic!("expected tick, got {:?}", other),
    };
    assert!(bench.controller.on_timer(task));

    assert_eq!(bench.cell(Cell::Angle), 1);
    assert_eq!(bench.cell(Cell::Distance), 50);
    assert_eq!(bench.controller.last_distance(), Some(Distance::from_cm(50)));
    assert_eq!(bench.last_pulse(), Some(510));
}

#[test]
fn test_servo_follows_every_tick() {
    let mut bench = Bench::started(RadarConfig::default());
    for _ in 0..3 {
        bench.controller.tick();
    }
    let pulses = bench.pwm.log.borrow().pulses.clone();
    // Centre on construction, then angles 1, 2, 3
    assert_eq!(pulses, vec![1450, 510, 521, 531]);
}

#[test]
fn test_timeout_holds_last_distance() {
    let mut bench = Bench::started(RadarConfig::default());
    bench.sensor.push_cm(40);
    bench.sensor.push(Err(TIMEOUT));

    bench.controller.tick();
    bench.controller.tick();

    assert_eq!(bench.cell(Cell::Distance), 40);
    assert_eq!(bench.cell(Cell::Angle), 2);
    assert_eq!(bench.controller.last_distance(), Some(Distance::from_cm(40)));
}

#[test]
fn test_alert_threshold_inclusive() {
    let mut bench = Bench::started(config_with_threshold(20));
    bench.sensor.push_cm(20);
    bench.sensor.push_cm(21);

    bench.controller.tick();
    assert_eq!(bench.led.last(), Some(true));
    assert!(bench.controller.alert_active());

    bench.controller.tick();
    assert_eq!(bench.led.last(), Some(false));
    assert!(!bench.controller.alert_active());
}

#[test]
fn test_object_approaching_raises_alert() {
    let mut bench = Bench::started(config_with_threshold(20));
    bench.sensor.push_cm(25);
    bench.sensor.push_cm(15);

    bench.controller.tick();
    assert_eq!(bench.led.last(), Some(false));

    bench.controller.tick();
    assert_eq!(bench.led.last(), Some(true));
    assert_eq!(bench.cell(Cell::Distance), 15);
}

#[test]
fn test_no_alert_without_measurement() {
    let mut bench = Bench::started(config_with_threshold(255));
    bench.controller.tick();
    assert_eq!(bench.led.last(), Some(false));
    assert_eq!(bench.cell(Cell::Distance), 0);
}

#[test]
fn test_far_distance_saturates_cell() {
    let mut bench = Bench::started(config_with_threshold(255));
    bench.sensor.push_cm(300);
    bench.controller.tick();
    assert_eq!(bench.cell(Cell::Distance), 255);
    // Compared on the full distance, not the saturated cell value
    assert_eq!(bench.led.last(), Some(false));
}

#[test]
fn test_threshold_write_applies_next_tick() {
    let mut bench = Bench::started(config_with_threshold(0));
    bench.sensor.push_cm(30);
    bench.sensor.push_cm(30);

    bench.controller.tick();
    assert_eq!(bench.led.last(), Some(false));

    bench.write(Cell::Threshold, vec![30]).unwrap();
    assert_eq!(bench.cell(Cell::Threshold), 30);
    bench.controller.tick();
    assert_eq!(bench.led.last(), Some(true));
}

#[test]
fn test_running_write_stops_and_restarts() {
    let mut bench = Bench::started(RadarConfig::default());
    let first = bench.controller.tick_task().unwrap();

    bench.write(Cell::Running, vec![0]).unwrap();
    assert!(!bench.controller.is_running());
    assert!(!bench.queue.is_scheduled(first));
    assert_eq!(bench.queue.next_due(Duration::from_secs(10)), None);
    assert_eq!(bench.cell(Cell::Running), 0);
    assert!(!bench.controller.on_timer(first));

    bench.write(Cell::Running, vec![1]).unwrap();
    assert!(bench.controller.is_running());
    assert_eq!(bench.queue.scheduled_timers(), 1);
    assert_eq!(bench.cell(Cell::Running), 1);
}

#[test]
fn test_running_write_while_running_is_noop() {
    let mut bench = Bench::started(RadarConfig::default());
    let task = bench.controller.tick_task();

    bench.write(Cell::Running, vec![5]).unwrap();
    assert_eq!(bench.queue.scheduled_timers(), 1);
    assert_eq!(bench.controller.tick_task(), task);
    // Mirrored back to a boolean
    assert_eq!(bench.cell(Cell::Running), 1);
}

#[test]
fn test_stop_while_stopped() {
    let mut bench = Bench::started(RadarConfig {
        start_running: false,
        ..RadarConfig::default()
    });
    bench.write(Cell::Running, vec![0]).unwrap();
    assert_eq!(bench.queue.scheduled_timers(), 0);
}

#[test]
fn test_rejected_writes_report_codes() {
    let mut bench = Bench::started(RadarConfig::default());

    let err = bench.write(Cell::Angle, vec![181]).unwrap_err();
    assert_eq!(err.to_error_code(), AttErrorCode::WriteNotPermitted);

    let err = bench.write(Cell::Running, vec![0, 0]).unwrap_err();
    assert_eq!(err.to_error_code(), AttErrorCode::InvalidAttributeValueLength);
    assert!(bench.controller.is_running());

    let handle = bench.controller.service().handle(Cell::Threshold);
    let err = bench
        .controller
        .handle_write(
            &PendingWrite::new(handle, vec![1]).with_offset(2),
            &mut bench.queue,
        )
        .unwrap_err();
    assert_eq!(err.to_error_code(), AttErrorCode::InvalidOffset);

    assert_eq!(bench.cell(Cell::Angle), 0);
    assert_eq!(bench.cell(Cell::Threshold), 0);
}

#[test]
fn test_peer_angle_write_committed_until_next_tick() {
    let mut bench = Bench::started(RadarConfig::default());
    bench.write(Cell::Angle, vec![180]).unwrap();
    assert_eq!(bench.cell(Cell::Angle), 180);
    assert_eq!(bench.controller.scan_state().angle(), 0);

    bench.sensor.push_cm(100);
    bench.controller.tick();
    assert_eq!(bench.cell(Cell::Angle), 1);
}

#[test]
fn test_on_change_republishes_after_peer_write() {
    let mut bench = Bench::started(RadarConfig {
        publish: PublishPolicy::OnChange { epsilon: 2 },
        ..RadarConfig::default()
    });
    for _ in 0..10 {
        bench.sensor.push_cm(100);
        bench.controller.tick();
    }

    bench.write(Cell::Angle, vec![180]).unwrap();
    bench.write(Cell::Distance, vec![3]).unwrap();
    bench.sensor.push_cm(100);
    bench.controller.tick();

    let angle = bench.controller.scan_state().angle();
    assert_eq!(angle, 11);
    assert_eq!(bench.cell(Cell::Angle), angle);
    assert_eq!(bench.cell(Cell::Distance), 100);
}

#[test]
fn test_every_tick_publishes() {
    let mut bench = Bench::started(RadarConfig::default());
    bench.subscribe(Cell::Distance);
    for _ in 0..3 {
        bench.sensor.push_cm(100);
        bench.controller.tick();
    }
    assert_eq!(bench.updates_for(Cell::Distance), 3);
}

#[test]
fn test_on_change_coalesces() {
    let mut bench = Bench::started(RadarConfig {
        publish: PublishPolicy::OnChange { epsilon: 2 },
        ..RadarConfig::default()
    });
    bench.subscribe(Cell::Distance);

    for _ in 0..3 {
        bench.sensor.push_cm(100);
        bench.controller.tick();
    }
    // Angles 2 and 3 stay within epsilon of the published 1
    assert_eq!(bench.cell(Cell::Angle), 1);
    assert_eq!(bench.updates_for(Cell::Distance), 1);

    bench.sensor.push_cm(100);
    bench.controller.tick();
    assert_eq!(bench.cell(Cell::Angle), 4);
    assert_eq!(bench.updates_for(Cell::Distance), 1);

    bench.sensor.push_cm(150);
    bench.controller.tick();
    assert_eq!(bench.cell(Cell::Distance), 150);
}

#[test]
fn test_servo_failure_not_fatal() {
    let mut bench = Bench::started(RadarConfig::default());
    bench.pwm.fail.set(true);
    bench.sensor.push_cm(12);
    bench.controller.tick();
    assert_eq!(bench.cell(Cell::Angle), 1);
    assert_eq!(bench.cell(Cell::Distance), 12);
}

#[test]
fn test_foreign_timer_ignored() {
    let mut bench = Bench::started(RadarConfig::default());
    let other = bench.queue.call_every(Duration::from_secs(1));
    assert!(!bench.controller.on_timer(other));
    assert_eq!(bench.controller.scan_state().angle(), 0);
}

#[test]
fn test_disconnect_clears_subscriptions() {
    let mut bench = Bench::started(RadarConfig::default());
    bench.subscribe(Cell::Angle);
    bench.controller.peer_disconnected();
    bench.controller.tick();
    assert_eq!(bench.updates_for(Cell::Angle), 0);
}

#[test]
fn test_registration_failure_schedules_nothing() {
    let mut server = GattServer::new(GattServerConfig::default());
    server.add_service(RADAR_SERVICE_UUID, true).unwrap();
    let servo = Servo::new(MockPwm::default(), ServoConfig::default()).unwrap();

    let result = ScanController::new(
        RadarConfig::default(),
        server,
        ScriptedSensor::default(),
        servo,
        MockOutput::default(),
    );
    assert!(matches!(result, Err(RadarError::ServiceRegistration(_))));
}

#[test]
fn test_invalid_config_rejected() {
    let servo = Servo::new(MockPwm::default(), ServoConfig::default()).unwrap();
    let result = ScanController::new(
        RadarConfig {
            tick_period_ms: 0,
            ..RadarConfig::default()
        },
        GattServer::new(GattServerConfig::default()),
        ScriptedSensor::default(),
        servo,
        MockOutput::default(),
    );
    assert!(matches!(result, Err(RadarError::Config(_))));
}

#[test]
fn test_event_loop_drives_writes_and_ticks() {
    let mut bench = Bench::started(RadarConfig::default());
    let running = bench.controller.service().handle(Cell::Running);
    let tick = Duration::from_millis(150);

    bench.sensor.push_cm(80);
    bench.sensor.push_cm(80);
    let mut ticks = 0;
    for step in 1..=4u32 {
        let now = tick * step;
        if step == 3 {
            bench.queue.post(PendingWrite::new(running, vec![0]));
        }
        while let Some(event) = bench.queue.next_due(now) {
            match event {
                Dispatch::Timer(task) => {
                    if bench.controller.on_timer(task) {
                        ticks += 1;
                    }
                }
                Dispatch::Message(write) => {
                    let _ = bench.controller.handle_write(&write, &mut bench.queue);
                }
            }
        }
    }

    // Ticks at 150 and 300 ms; the stop lands before the 450 ms tick
    assert_eq!(ticks, 2);
    assert_eq!(bench.cell(Cell::Angle), 2);
    assert!(!bench.controller.is_running());
}
