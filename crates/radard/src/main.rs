//! radard - runs the sonar radar scan loop against a simulated bench
//!
//! Peer requests are read from stdin (see [`console`]) on a reader thread and posted
//! to the control thread, which owns the controller and the event queue.

mod console;
mod sim;

use anyhow::{Context, Result};
use clap::Parser;
use console::Command;
use log::{error, info, warn};
use radar::att::UpdateKind;
use radar::{
    Cell, Dispatch, EventQueue, GattServer, GattServerConfig, PendingWrite, PublishPolicy,
    RadarConfig, ScanController, Servo, Sonar,
};
use sim::{HostDelay, HostTimer, SceneConfig, SimEcho, SimLed, SimPwm, SimTrigger};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "radard", version, about = "BLE sonar radar controller on a simulated bench")]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the tick period in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Override the initial alert threshold in centimetres
    #[arg(long)]
    threshold: Option<u8>,

    /// Start with the scan stopped
    #[arg(long)]
    stopped: bool,

    /// Publish only when angle or distance move by more than this
    #[arg(long)]
    epsilon: Option<u8>,

    /// Distance of the simulated object in centimetres
    #[arg(long, default_value_t = 120)]
    object_cm: u16,

    /// Noise on each simulated reading in centimetres
    #[arg(long, default_value_t = 5)]
    jitter_cm: u16,

    /// Probability that a simulated ping is lost
    #[arg(long, default_value_t = 0.02)]
    dropout: f64,

    /// Exit after this many ticks
    #[arg(long)]
    ticks: Option<u64>,
}

type Controller = ScanController<Sonar<SimTrigger, SimEcho, HostDelay, HostTimer>, SimPwm, SimLed>;

fn load_config(args: &Args) -> Result<RadarConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => RadarConfig::default(),
    };

    if let Some(tick_ms) = args.tick_ms {
        config.tick_period_ms = tick_ms;
    }
    if let Some(threshold) = args.threshold {
        config.initial_threshold_cm = threshold;
    }
    if args.stopped {
        config.start_running = false;
    }
    if let Some(epsilon) = args.epsilon {
        config.publish = PublishPolicy::OnChange { epsilon };
    }
    Ok(config)
}

fn spawn_console() -> Receiver<Command> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to read stdin: {}", e);
                    break;
                }
            };
            match console::parse(&line) {
                Ok(Some(command)) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("{:#}", e),
            }
        }
    });
    rx
}

/// Result of handling one console command
enum Flow {
    Continue,
    Quit,
}

fn handle_command(
    controller: &mut Controller,
    queue: &mut EventQueue<Command>,
    led: &SimLed,
    command: Command,
) -> Flow {
    match command {
        Command::Write { cell, data, offset } => {
            let handle = controller.service().handle(cell);
            let write = PendingWrite::new(handle, data).with_offset(offset);
            match controller.handle_write(&write, queue) {
                Ok(()) => info!("Write to {} accepted", cell.name()),
                Err(e) => warn!(
                    "Write to {} rejected with ATT error 0x{:02X}",
                    cell.name(),
                    u8::from(e.to_error_code())
                ),
            }
        }
        Command::Read(cell) => match controller.handle_read(controller.service().handle(cell)) {
            Ok(value) => info!("{} = {}", cell.name(), hex::encode(value)),
            Err(e) => warn!("Read of {} failed: {}", cell.name(), e),
        },
        Command::Subscribe { cell, subscription } => {
            let service = controller.service();
            let cccd = service
                .server()
                .get_characteristics(service.service_handle())
                .ok()
                .and_then(|chars| chars.into_iter().find(|c| c.uuid == cell.uuid()))
                .and_then(|c| c.cccd_handle);
            let Some(cccd) = cccd else {
                warn!("{} has no configuration descriptor", cell.name());
                return Flow::Continue;
            };
            let write = PendingWrite::new(cccd, subscription.bits().to_le_bytes().to_vec());
            if let Err(e) = controller.handle_write(&write, queue) {
                warn!("Subscription to {} rejected: {}", cell.name(), e);
            }
        }
        Command::Disconnect => controller.peer_disconnected(),
        Command::Status => {
            let values: Vec<String> = Cell::ALL
                .iter()
                .map(|cell| format!("{}={}", cell.name(), controller.service().read(*cell)))
                .collect();
            info!(
                "{} led={} running={}",
                values.join(" "),
                if led.is_lit() { "on" } else { "off" },
                controller.is_running()
            );
        }
        Command::Quit => return Flow::Quit,
    }
    Flow::Continue
}

fn deliver_updates(controller: &mut Controller) {
    for update in controller.drain_updates() {
        let cell = controller
            .service()
            .cell_for_handle(update.handle)
            .map_or("?", Cell::name);
        let kind = match update.kind {
            UpdateKind::Notification => "notify",
            UpdateKind::Indication => "indicate",
        };
        info!("{} {} = {}", kind, cell, hex::encode(&update.value));
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let config = load_config(&args)?;
    info!("Starting radard with {:?}", config);

    let (trigger, echo) = sim::sonar_pins(SceneConfig {
        object_cm: args.object_cm,
        jitter_cm: args.jitter_cm,
        dropout: args.dropout,
    });
    let sonar = Sonar::new(trigger, echo, HostDelay, HostTimer::default())
        .with_echo_budget(config.echo_timeout_us);
    let servo = Servo::new(SimPwm::default(), config.servo)
        .map_err(|e| anyhow::anyhow!("Failed to set up servo: {}", e))?;
    let led = SimLed::default();

    let mut controller = ScanController::new(
        config,
        GattServer::new(GattServerConfig::default()),
        sonar,
        servo,
        led.clone(),
    )
    .context("Failed to start the scan controller")?;

    let mut queue = EventQueue::new();
    controller.start(&mut queue);

    let commands = spawn_console();
    let mut console_open = true;
    let mut ticks = 0u64;
    let epoch = Instant::now();

    loop {
        while let Some(event) = queue.next_due(epoch.elapsed()) {
            match event {
                Dispatch::Timer(task) => {
                    if controller.on_timer(task) {
                        ticks += 1;
                    }
                }
                Dispatch::Message(command) => {
                    if let Flow::Quit = handle_command(&mut controller, &mut queue, &led, command) {
                        info!("Shutting down after {} ticks", ticks);
                        return Ok(());
                    }
                }
            }
            deliver_updates(&mut controller);
        }

        if args.ticks.is_some_and(|limit| ticks >= limit) {
            info!("Tick limit reached after {} ticks", ticks);
            return Ok(());
        }

        // Sleep until the next deadline, waking early for console input
        let wait = queue
            .next_deadline()
            .map_or(Duration::from_millis(500), |due| {
                due.saturating_sub(epoch.elapsed())
            });
        if console_open {
            match commands.recv_timeout(wait) {
                Ok(command) => queue.post(command),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Console closed");
                    console_open = false;
                }
            }
        } else {
            thread::sleep(wait);
        }
    }
}
