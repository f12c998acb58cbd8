//! humidfan: scripted simulator for the fan controller.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Adapters (outer ring)                     │
//! │                                                             │
//! │  SimBench          LogEventSink   FileStore   ManualClock   │
//! │  (Sensor+Switch)   LogNotifier    (Storage)   TimerQueue    │
//! │                                                             │
//! │  ─────────────── Port Trait Boundary ───────────────        │
//! │                                                             │
//! │  ┌───────────────────────────────────────────────────┐      │
//! │  │          Controller (pure logic)                  │      │
//! │  │  Aggregation · FSM · Actuator · Recovery          │      │
//! │  └───────────────────────────────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Replays a JSON-lines trace against simulated devices.  Each line is one
//! of:
//!
//! ```text
//! {"at":120,"sensor":"bath","value":84.0}
//! {"at":130,"switch":"sleep-mode","state":"on"}
//! {"at":140,"fan_stuck":true}
//! {"at":150,"restart":true}
//! ```
//!
//! Timers due up to `at` fire before the line is applied.  `restart` drops
//! every in-memory timer and starts a fresh controller on the same state
//! directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use serde::Deserialize;

use humidfan::adapters::log_sink::{LogEventSink, LogNotifier};
use humidfan::adapters::sim::{SimBench, SwitchRole};
use humidfan::adapters::store::FileStore;
use humidfan::adapters::time::ManualClock;
use humidfan::app::ports::{Clock, Devices, SwitchState};
use humidfan::config::ControllerConfig;
use humidfan::fsm::HumidityState;
use humidfan::scheduler::{TimerQueue, Timestamp};
use humidfan::{Controller, Input, Ports, SiteConfig};

#[derive(Parser)]
#[command(name = "humidfan")]
#[command(about = "Replay a humidity trace against the exhaust fan controller")]
#[command(version)]
struct Cli {
    /// Site configuration (thresholds and device layout), JSON
    #[arg(long)]
    config: PathBuf,

    /// Directory holding the persisted controller state
    #[arg(long)]
    state_dir: PathBuf,

    /// Event trace, one JSON object per line
    #[arg(long)]
    script: PathBuf,

    /// Simulated clock at startup (seconds since the epoch)
    #[arg(long, default_value_t = 0)]
    start: Timestamp,
}

/// One line of the event trace.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TraceLine {
    Sensor {
        at: Timestamp,
        sensor: String,
        value: f32,
    },
    Switch {
        at: Timestamp,
        switch: String,
        state: SwitchState,
    },
    FanStuck {
        at: Timestamp,
        fan_stuck: bool,
    },
    Restart {
        at: Timestamp,
        restart: bool,
    },
}

impl TraceLine {
    fn at(&self) -> Timestamp {
        match self {
            Self::Sensor { at, .. }
            | Self::Switch { at, .. }
            | Self::FanStuck { at, .. }
            | Self::Restart { at, .. } => *at,
        }
    }
}

// ── Simulator ─────────────────────────────────────────────────

struct Simulator {
    config: ControllerConfig,
    state_dir: PathBuf,
    bench: SimBench,
    devices: Devices,
    clock: ManualClock,
    timers: TimerQueue<ManualClock>,
    notifier: LogNotifier,
    sink: LogEventSink,
    controller: Controller<FileStore>,
}

impl Simulator {
    fn new(site: SiteConfig, state_dir: &Path, start: Timestamp) -> Result<Self> {
        let (bench, devices) = SimBench::from_layout(&site.devices);
        let clock = ManualClock::new(start);
        let store = FileStore::open(state_dir).context("opening state directory")?;
        let controller = Controller::new(site.controller.clone(), store)?;
        Ok(Self {
            config: site.controller,
            state_dir: state_dir.to_path_buf(),
            bench,
            devices,
            timers: TimerQueue::new(clock.clone()),
            clock,
            notifier: LogNotifier::new(),
            sink: LogEventSink::new(),
            controller,
        })
    }

    fn start(&mut self) {
        let mut io = Ports {
            devices: &mut self.devices,
            timers: &mut self.timers,
            notifier: &mut self.notifier,
            sink: &mut self.sink,
            clock: &self.clock,
        };
        let repairs = self.controller.start(&mut io);
        for repair in repairs {
            warn!("Startup repair: {:?}", repair);
        }
        self.print_status();
    }

    /// Drop in-memory timers and bring a fresh controller up from disk.
    fn restart(&mut self) -> Result<()> {
        info!("── restart at t={} ──", self.clock.now());
        self.timers = TimerQueue::new(self.clock.clone());
        let store = FileStore::open(&self.state_dir).context("reopening state directory")?;
        self.controller = Controller::new(self.config.clone(), store)?;
        self.start();
        Ok(())
    }

    fn dispatch(&mut self, input: Input) {
        let before = self.controller.state();
        let mut io = Ports {
            devices: &mut self.devices,
            timers: &mut self.timers,
            notifier: &mut self.notifier,
            sink: &mut self.sink,
            clock: &self.clock,
        };
        self.controller.handle(input, &mut io);
        if self.controller.state() != before {
            self.print_status();
        }
    }

    /// Fire every timer due up to `at`, in deadline order, then set the
    /// clock to `at`.
    fn advance_to(&mut self, at: Timestamp) {
        while let Some(deadline) = self.timers.next_deadline().filter(|&d| d <= at) {
            self.clock.set(deadline.max(self.clock.now()));
            while let Some(event) = self.timers.pop_due() {
                self.dispatch(Input::Timer(event));
            }
        }
        if at > self.clock.now() {
            self.clock.set(at);
        }
    }

    fn apply(&mut self, line: TraceLine) -> Result<()> {
        self.advance_to(line.at());
        let at = self.clock.now();
        match line {
            TraceLine::Sensor { sensor, value, .. } => {
                let Some((role, handle)) = self.bench.sensor(&sensor) else {
                    warn!("Trace: unknown sensor {:?}", sensor);
                    return Ok(());
                };
                handle.report(value, at);
                self.dispatch(Input::SensorEvent(role));
            }
            TraceLine::Switch { switch, state, .. } => {
                let Some((role, handle)) = self.bench.switch(&switch) else {
                    warn!("Trace: unknown switch {:?}", switch);
                    return Ok(());
                };
                handle.set(state);
                match role {
                    SwitchRole::Fan => self.dispatch(Input::FanReported(state)),
                    SwitchRole::Interlock => self.dispatch(Input::InterlockChanged),
                    SwitchRole::Companion => debug!("Trace: companion {} set by hand", switch),
                }
            }
            TraceLine::FanStuck { fan_stuck, .. } => {
                info!("Trace: fan stuck = {}", fan_stuck);
                self.bench.fan().set_stuck(fan_stuck);
            }
            TraceLine::Restart { restart, .. } => {
                if restart {
                    self.restart()?;
                }
            }
        }
        Ok(())
    }

    fn print_status(&self) {
        println!("t={} {}", self.clock.now(), self.controller.status());
    }
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() -> Result<()> {
    init_logger();
    let cli = Cli::parse();

    info!("╔══════════════════════════════════════╗");
    info!("║  humidfan v{}                     ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let site = SiteConfig::load(&cli.config)
        .with_context(|| format!("loading site config {}", cli.config.display()))?;
    let script = fs::read_to_string(&cli.script)
        .with_context(|| format!("reading trace {}", cli.script.display()))?;

    let mut sim = Simulator::new(site, &cli.state_dir, cli.start)?;
    sim.start();

    for (index, raw) in script.lines().enumerate() {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('#') {
            continue;
        }
        let line: TraceLine = serde_json::from_str(raw)
            .with_context(|| format!("{}:{}: bad trace line", cli.script.display(), index + 1))?;
        sim.apply(line)?;
    }

    let state = sim.controller.state();
    println!("final: t={} {}", sim.clock.now(), sim.controller.status());
    if state != HumidityState::Normal {
        info!(
            "Trace ended with humidity still {} ({} timers pending)",
            state,
            sim.timers.len()
        );
    }
    Ok(())
}
