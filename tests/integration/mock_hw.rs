//! Test rig for integration tests.
//!
//! Wires a [`Controller`] to simulated sensors and switches, a manual
//! clock and an in-memory store.  Every handle is shared, so tests drive
//! devices from the outside and inspect what the controller did to them.

#![allow(dead_code)]

use humidfan::adapters::log_sink::LogNotifier;
use humidfan::adapters::sim::{SimSensor, SimSwitch};
use humidfan::adapters::store::MemoryStore;
use humidfan::adapters::time::ManualClock;
use humidfan::app::events::AppEvent;
use humidfan::app::ports::{Clock, Devices, EventSink, SwitchCapability, SwitchState};
use humidfan::app::state::ControllerState;
use humidfan::config::ControllerConfig;
use humidfan::scheduler::{TimerQueue, Timestamp};
use humidfan::sensors::SensorRole;
use humidfan::{Controller, Input, Ports, Repair};

/// Rig clock starts here so "0" never looks like a valid deadline.
pub const T0: Timestamp = 100_000;

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// One bathroom: a single monitored and reference sensor, the fan, a
/// companion light, a must-be-off "sleep" switch and a must-be-on "home"
/// switch (initially in their unrestricted positions).
pub struct Rig {
    pub clock: ManualClock,
    pub timers: TimerQueue<ManualClock>,
    pub devices: Devices,
    pub notifier: LogNotifier,
    pub sink: RecordingSink,
    pub store: MemoryStore,
    pub controller: Controller<MemoryStore>,

    pub bath: SimSensor,
    pub hall: SimSensor,
    pub fan: SimSwitch,
    pub light: SimSwitch,
    pub sleep: SimSwitch,
    pub home: SimSwitch,
}

impl Rig {
    /// Build the rig without starting the controller.
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_store(config, MemoryStore::new())
    }

    /// Build the rig over an existing store, e.g. one pre-seeded with a
    /// crafted [`ControllerState`].
    pub fn with_store(config: ControllerConfig, store: MemoryStore) -> Self {
        let clock = ManualClock::new(T0);
        let bath = SimSensor::new("bath");
        let hall = SimSensor::new("hall");
        let fan = SimSwitch::new("fan", SwitchState::Off);
        let light = SimSwitch::new("mirror-light", SwitchState::Off);
        let sleep = SimSwitch::new("sleep", SwitchState::Off);
        let home = SimSwitch::new("home", SwitchState::On);

        let devices = Devices::new(
            vec![Box::new(bath.clone())],
            vec![Box::new(hall.clone())],
            Box::new(fan.clone()),
        )
        .with_companion(Box::new(light.clone()))
        .with_interlocks(vec![Box::new(sleep.clone())], vec![Box::new(home.clone())]);

        let controller = Controller::new(config, store.clone()).expect("valid config");
        Self {
            timers: TimerQueue::new(clock.clone()),
            clock,
            devices,
            notifier: LogNotifier::new(),
            sink: RecordingSink::default(),
            store,
            controller,
            bath,
            hall,
            fan,
            light,
            sleep,
            home,
        }
    }

    /// Default config, started.
    pub fn started() -> Self {
        Self::started_with(ControllerConfig::default())
    }

    pub fn started_with(config: ControllerConfig) -> Self {
        let mut rig = Self::new(config);
        rig.start();
        rig
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn start(&mut self) -> Vec<Repair> {
        let mut io = Ports {
            devices: &mut self.devices,
            timers: &mut self.timers,
            notifier: &mut self.notifier,
            sink: &mut self.sink,
            clock: &self.clock,
        };
        self.controller.start(&mut io)
    }

    pub fn consistency_pass(&mut self) -> Vec<Repair> {
        let mut io = Ports {
            devices: &mut self.devices,
            timers: &mut self.timers,
            notifier: &mut self.notifier,
            sink: &mut self.sink,
            clock: &self.clock,
        };
        self.controller.consistency_pass(&mut io)
    }

    pub fn handle(&mut self, input: Input) {
        let mut io = Ports {
            devices: &mut self.devices,
            timers: &mut self.timers,
            notifier: &mut self.notifier,
            sink: &mut self.sink,
            clock: &self.clock,
        };
        self.controller.handle(input, &mut io);
    }

    /// Report both clusters, then deliver one monitored-sensor event.
    pub fn readings(&mut self, monitored: f32, reference: f32) {
        let now = self.now();
        self.hall.report(reference, now);
        self.bath.report(monitored, now);
        self.handle(Input::SensorEvent(SensorRole::Monitored));
    }

    /// Reference-only update (does not count as monitored activity).
    pub fn reference(&mut self, value: f32) {
        let now = self.now();
        self.hall.report(value, now);
        self.handle(Input::SensorEvent(SensorRole::Reference));
    }

    /// Move the clock forward `secs`, firing due timers in deadline order.
    pub fn advance(&mut self, secs: u64) {
        let target = self.now() + secs;
        while let Some(deadline) = self.timers.next_deadline().filter(|&d| d <= target) {
            self.clock.set(deadline.max(self.now()));
            while let Some(event) = self.timers.pop_due() {
                self.handle(Input::Timer(event));
            }
        }
        self.clock.set(target);
    }

    /// Flip an interlock switch by hand and notify the controller.
    pub fn interlock(&mut self, which: &SimSwitch, state: SwitchState) {
        which.set(state);
        self.handle(Input::InterlockChanged);
    }

    /// Someone toggles the fan at the wall.
    pub fn external_fan(&mut self, state: SwitchState) {
        self.fan.set(state);
        self.handle(Input::FanReported(state));
    }

    /// Simulate a process restart: in-memory timers are lost and a fresh
    /// controller loads from the same store.
    pub fn restart(&mut self) -> Vec<Repair> {
        let config = self.controller.config().clone();
        self.timers = TimerQueue::new(self.clock.clone());
        self.controller = Controller::new(config, self.store.clone()).expect("valid config");
        self.start()
    }

    /// Same as [`restart`](Self::restart) after `secs` of downtime during
    /// which no timer fires.
    pub fn restart_after(&mut self, secs: u64) -> Vec<Repair> {
        self.clock.advance(secs);
        self.restart()
    }

    pub fn fan_commands(&self) -> Vec<SwitchState> {
        self.fan.commands()
    }

    pub fn alerts(&self) -> &[String] {
        self.notifier.sent()
    }

    pub fn fan_state(&self) -> SwitchState {
        self.fan.current_state()
    }
}

/// Persist a crafted state so the next controller loads it.
pub fn seed(state: &ControllerState) -> MemoryStore {
    let mut store = MemoryStore::new();
    state.save(&mut store).expect("memory store never fails");
    store
}
