//! Application service: the hexagonal core.
//!
//! [`Controller`] owns the humidity state machine, the persisted
//! [`ControllerState`] and the storage backend.  Everything else it talks
//! to arrives per call in a [`Ports`] bundle, so the whole service runs
//! against fakes in tests.
//!
//! ```text
//!  Sensor events ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!  Interlocks    ──▶ │          Controller           │ ──▶ Notifier
//!  Fan reports   ──▶ │  aggregate · FSM · actuator   │ ──▶ Fan / companion
//!  Timer fires   ──▶ └──────────────────────────────┘ ──▶ TimerService
//!                                  │
//!                                  ▼
//!                        StoragePort (every input)
//! ```
//!
//! Each [`Input`] runs to completion and ends with a persist, so the stored
//! state is consistent between any two inputs.

use log::{debug, error, info, warn};

use crate::app::commands::Input;
use crate::app::events::{AppEvent, StatusReport};
use crate::app::ports::{
    Clock, Devices, EventSink, NotificationCapability, StoragePort, SwitchState, TimerService,
};
use crate::app::state::ControllerState;
use crate::config::ControllerConfig;
use crate::control::actuator::{ActuatorController, ActuatorOwnership};
use crate::error::{ConfigError, ControlError, StorageError};
use crate::fsm::context::{FsmContext, HumidityRecord};
use crate::fsm::{HumidityState, HumidityStateMachine, Transition};
use crate::safety::RestrictionChange;
use crate::scheduler::{
    LedgerEntry, ScheduledEvent, TimerKey, TimerLedger, TimerRequest, Timestamp, recovery_delay,
};
use crate::sensors::{SensorRole, representative_value};

// ───────────────────────────────────────────────────────────────
// Call-site context
// ───────────────────────────────────────────────────────────────

/// Everything outside the controller, borrowed for one call.
pub struct Ports<'a> {
    pub devices: &'a mut Devices,
    pub timers: &'a mut dyn TimerService,
    pub notifier: &'a mut dyn NotificationCapability,
    pub sink: &'a mut dyn EventSink,
    pub clock: &'a dyn Clock,
}

/// A correction made by the startup consistency pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repair {
    /// Pending state with no debounce record; reverted to the settled state.
    MissingPending(HumidityState),
    /// Non-normal state with no reference snapshot; forced to `Normal`.
    MissingSnapshot(HumidityState),
    /// Debounce record in a settled state; dropped.
    StrayPending(HumidityState),
    /// Reference snapshot left over in `Normal`; cleared.
    StraySnapshot,
    /// `Normal` while the fan is owned; fan turned off.
    ForcedOff,
    /// `High`, unrestricted, fan off and not owned; fan turned on.
    ForcedOn,
}

// ───────────────────────────────────────────────────────────────
// Controller
// ───────────────────────────────────────────────────────────────

pub struct Controller<S: StoragePort> {
    config: ControllerConfig,
    fsm: HumidityStateMachine,
    state: ControllerState,
    storage: S,
}

impl<S: StoragePort> Controller<S> {
    /// Validate `config` and load the persisted state from `storage`.
    ///
    /// Does **not** touch any device: call [`start`](Self::start) next.
    pub fn new(config: ControllerConfig, storage: S) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = ControllerState::load(&storage);
        Ok(Self {
            config,
            fsm: HumidityStateMachine::new(),
            state,
            storage,
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Bring the controller up after a (re)start.
    ///
    /// Recomputes the interlock restriction, rebuilds every pending timer
    /// from its persisted deadline, repairs inconsistent state, syncs the
    /// companion switch and persists.  Returns the repairs performed.
    pub fn start(&mut self, io: &mut Ports<'_>) -> Vec<Repair> {
        let now = io.clock.now();
        info!(
            "Controller starting at t={} in {}",
            now, self.state.humidity.state
        );

        let change = self
            .state
            .gate
            .evaluate(&io.devices.must_be_off, &io.devices.must_be_on);
        self.on_restriction(change, now, io);

        self.recover_timers(now, io);
        let repairs = self.consistency_pass(io);
        self.sync_companion(io);
        self.persist();

        io.sink.emit(&AppEvent::Started(self.state.humidity.state));
        info!("Controller started in {}", self.state.humidity.state);
        repairs
    }

    /// Repair invariant violations toward the nearest safe default.
    ///
    /// Running it twice with no intervening input is a no-op the second
    /// time.
    pub fn consistency_pass(&mut self, io: &mut Ports<'_>) -> Vec<Repair> {
        let now = io.clock.now();
        let mut repairs = Vec::new();

        let state = self.state.humidity.state;
        if state != HumidityState::Normal && self.state.humidity.snapshot.is_none() {
            warn!("Repair: {} without reference snapshot, forcing NORMAL", state);
            repairs.push(Repair::MissingSnapshot(state));
            self.force(HumidityState::Normal, now, io);
        }

        let state = self.state.humidity.state;
        let has_pending = self.state.humidity.pending.is_some();
        match state {
            HumidityState::PendingHigh if !has_pending => {
                warn!("Repair: PENDING_HIGH without debounce, back to NORMAL");
                repairs.push(Repair::MissingPending(state));
                self.force(HumidityState::Normal, now, io);
            }
            HumidityState::PendingNormal if !has_pending => {
                warn!("Repair: PENDING_NORMAL without debounce, back to HIGH");
                repairs.push(Repair::MissingPending(state));
                self.force(HumidityState::High, now, io);
            }
            HumidityState::Normal | HumidityState::High if has_pending => {
                warn!("Repair: stray debounce record in {}, dropped", state);
                repairs.push(Repair::StrayPending(state));
                self.state.humidity.pending = None;
                self.apply_timers(
                    &[
                        TimerRequest::Cancel(TimerKey::Activation),
                        TimerRequest::Cancel(TimerKey::Deactivation),
                    ],
                    io.timers,
                );
            }
            _ => {}
        }

        let state = self.state.humidity.state;
        if state == HumidityState::Normal && self.state.humidity.snapshot.is_some() {
            warn!("Repair: reference snapshot left in NORMAL, cleared");
            repairs.push(Repair::StraySnapshot);
            self.state.humidity.snapshot = None;
        }

        let ownership = self.state.ownership;
        if state == HumidityState::Normal && ownership.is_running_for_app() {
            warn!("Repair: NORMAL but fan owned, forcing off");
            repairs.push(Repair::ForcedOff);
            self.actuate(now, io, |a| a.ensure_off());
        }

        let fan_off = io.devices.fan.current_state() == SwitchState::Off;
        if state == HumidityState::High
            && !self.state.gate.is_active()
            && !ownership.controlled_by_app
            && fan_off
        {
            warn!("Repair: HIGH with fan off and unowned, forcing on");
            repairs.push(Repair::ForcedOn);
            self.actuate(now, io, |a| a.turn_on());
        }

        repairs
    }

    /// Erase the persisted state and cancel every timer.
    pub fn uninstall(&mut self, timers: &mut dyn TimerService) -> Result<(), StorageError> {
        for key in TimerKey::ALL {
            timers.cancel(key);
        }
        self.state = ControllerState::default();
        ControllerState::erase(&mut self.storage)?;
        info!("Controller uninstalled, persisted state erased");
        Ok(())
    }

    // ── Event dispatch ────────────────────────────────────────

    /// Process one input to completion and persist.
    pub fn handle(&mut self, input: Input, io: &mut Ports<'_>) {
        let now = io.clock.now();
        debug!("Input at t={}: {:?}", now, input);

        match input {
            Input::SensorEvent(role) => self.on_sensor_event(role, now, io),
            Input::InterlockChanged => {
                let change = self
                    .state
                    .gate
                    .evaluate(&io.devices.must_be_off, &io.devices.must_be_on);
                self.on_restriction(change, now, io);
            }
            Input::FanReported(reported) => {
                self.actuate(now, io, |a| a.on_actuator_report(reported));
            }
            Input::Timer(event) => self.on_timer(event, now, io),
        }

        self.persist();
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> HumidityState {
        self.state.humidity.state
    }

    pub fn humidity(&self) -> &HumidityRecord {
        &self.state.humidity
    }

    pub fn ownership(&self) -> &ActuatorOwnership {
        &self.state.ownership
    }

    pub fn is_restricted(&self) -> bool {
        self.state.gate.is_active()
    }

    /// Persisted deadlines of every pending timer.
    pub fn ledger(&self) -> &TimerLedger {
        &self.state.timers
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Human-readable status built from the persisted state only.
    pub fn status(&self) -> StatusReport {
        StatusReport {
            state: self.state.humidity.state,
            monitored: self.state.monitored.last,
            reference: self.state.reference.last,
            snapshot: self.state.humidity.snapshot,
            pending_deadline: self.state.humidity.pending.map(|p| p.deadline()),
            controlled_by_app: self.state.ownership.controlled_by_app,
            pending_command: self.state.ownership.pending_command,
            restricted: self.state.gate.is_active(),
        }
    }

    // ── Handlers ──────────────────────────────────────────────

    fn on_sensor_event(&mut self, role: SensorRole, now: Timestamp, io: &mut Ports<'_>) {
        if role == SensorRole::Monitored {
            self.actuate(now, io, |a| a.note_monitored_activity());
        }

        let monitored = self.aggregate(SensorRole::Monitored, now, io);
        let reference = self.aggregate(SensorRole::Reference, now, io);

        let mut ctx = FsmContext::new(&self.config, &mut self.state.humidity, now)
            .with_readings(monitored, reference);
        let result = self.fsm.evaluate(&mut ctx);
        let requests = ctx.timers;
        self.apply_timers(&requests, io.timers);

        match result {
            Ok(Some(t)) => self.after_transition(t, now, io),
            Ok(None) => {}
            Err(ControlError::SensorUnavailable(role)) => {
                warn!("Evaluation skipped: no active {} sensors", role);
                io.sink.emit(&AppEvent::SensorsUnavailable(role));
            }
            Err(e) => warn!("Evaluation skipped: {}", e),
        }
    }

    fn on_restriction(&mut self, change: RestrictionChange, now: Timestamp, io: &mut Ports<'_>) {
        if change == RestrictionChange::Unchanged {
            return;
        }
        io.sink
            .emit(&AppEvent::RestrictionChanged(self.state.gate.is_active()));
        let state = self.state.humidity.state;
        self.actuate(now, io, |a| a.on_restriction_change(change, state));
    }

    fn on_timer(&mut self, event: ScheduledEvent, now: Timestamp, io: &mut Ports<'_>) {
        self.state.timers.clear(event.key());

        match event {
            ScheduledEvent::ActivationTimer | ScheduledEvent::DeactivationTimer => {
                let mut ctx = FsmContext::new(&self.config, &mut self.state.humidity, now);
                let transition = self.fsm.on_timer(event, &mut ctx);
                let requests = ctx.timers;
                self.apply_timers(&requests, io.timers);
                if let Some(t) = transition {
                    self.after_transition(t, now, io);
                }
            }
            ScheduledEvent::VerificationTimer { expected } => {
                self.actuate(now, io, |a| a.on_verification(expected));
            }
            ScheduledEvent::SafetyTimer => {
                let mut forced = false;
                self.actuate(now, io, |a| forced = a.on_safety_timeout());
                if forced {
                    self.force(HumidityState::Normal, now, io);
                    self.actuate(now, io, |a| a.ensure_off());
                }
            }
        }
    }

    // ── Side-effect plumbing ──────────────────────────────────

    /// Hook run after every committed transition.
    fn after_transition(&mut self, t: Transition, now: Timestamp, io: &mut Ports<'_>) {
        io.sink.emit(&AppEvent::StateChanged {
            from: t.from,
            to: t.to,
        });
        self.sync_companion(io);
        let restricted = self.state.gate.is_active();
        self.actuate(now, io, |a| a.on_transition(t.to, restricted));
    }

    fn force(&mut self, target: HumidityState, now: Timestamp, io: &mut Ports<'_>) {
        let mut ctx = FsmContext::new(&self.config, &mut self.state.humidity, now);
        let transition = self.fsm.force_transition(target, &mut ctx);
        let requests = ctx.timers;
        self.apply_timers(&requests, io.timers);
        if let Some(t) = transition {
            self.after_transition(t, now, io);
        }
    }

    /// Run `f` against the fan and apply the timer requests it queued.
    fn actuate(
        &mut self,
        now: Timestamp,
        io: &mut Ports<'_>,
        f: impl FnOnce(&mut ActuatorController<'_>),
    ) {
        let mut actuator = ActuatorController::new(
            now,
            &self.config,
            &mut self.state.ownership,
            &mut *io.devices.fan,
            &mut *io.notifier,
            &mut *io.sink,
        );
        f(&mut actuator);
        let requests = actuator.into_timers();
        self.apply_timers(&requests, io.timers);
    }

    /// Mirror timer requests into the persisted ledger and the live service.
    fn apply_timers(&mut self, requests: &[TimerRequest], timers: &mut dyn TimerService) {
        for req in requests {
            match *req {
                TimerRequest::Schedule { event, at } => {
                    self.state.timers.record(event, at);
                    timers.schedule_at(at, event);
                }
                TimerRequest::Cancel(key) => {
                    self.state.timers.clear(key);
                    timers.cancel(key);
                }
            }
        }
    }

    /// Reduce one cluster, update its diagnostics and alert latch.
    fn aggregate(&mut self, role: SensorRole, now: Timestamp, io: &mut Ports<'_>) -> Option<f32> {
        let cluster = match role {
            SensorRole::Monitored => &io.devices.monitored,
            SensorRole::Reference => &io.devices.reference,
        };
        let agg = representative_value(cluster, self.config.stale_after_secs, now);
        for (id, reason) in &agg.excluded {
            debug!("Sensors: {} {} excluded ({:?})", role, id, reason);
        }

        let status = self.state.cluster_mut(role);
        status.last = agg.summary();
        if agg.all_excluded() {
            if !status.unavailable_alerted {
                status.unavailable_alerted = true;
                warn!("Sensors: every {} sensor excluded", role);
                io.notifier
                    .send(&format!("All {} humidity sensors are unavailable", role));
            }
        } else if !agg.included.is_empty() && status.unavailable_alerted {
            status.unavailable_alerted = false;
            info!("Sensors: {} cluster reporting again", role);
        }
        agg.value
    }

    /// Companion switch mirrors the fan demand: on while `High` or
    /// `PendingNormal`.
    fn sync_companion(&self, io: &mut Ports<'_>) {
        let Some(companion) = io.devices.companion.as_mut() else {
            return;
        };
        let want = SwitchState::from_on(self.state.humidity.state.is_elevated());
        if companion.current_state() == want {
            return;
        }
        info!("Companion: {} -> {}", companion.id(), want);
        match want {
            SwitchState::On => companion.turn_on(),
            SwitchState::Off => companion.turn_off(),
        }
    }

    /// Rebuild every live timer from persisted absolute deadlines.
    ///
    /// Debounce timers come from the pending transition, verification from
    /// the ledger (or now, if the command never got a timer) and safety
    /// from the last relevant event.  Keys with nothing to recover are
    /// cleared.
    fn recover_timers(&mut self, now: Timestamp, io: &mut Ports<'_>) {
        let mut plan: [Option<LedgerEntry>; TimerKey::COUNT] = [None; TimerKey::COUNT];
        let mut plan_entry = |event: ScheduledEvent, deadline: Timestamp| {
            plan[event.key().index()] = Some(LedgerEntry { deadline, event });
        };

        if let Some(p) = self.state.humidity.pending {
            plan_entry(p.timer_event(), p.deadline());
        }

        let ownership = self.state.ownership;
        if let Some(expected) = ownership.pending_command {
            let event = ScheduledEvent::VerificationTimer { expected };
            let deadline = self
                .state
                .timers
                .get(TimerKey::Verification)
                .filter(|e| e.event == event)
                .map_or(now, |e| e.deadline);
            plan_entry(event, deadline);
        }

        if ownership.is_running_for_app() {
            let deadline = ownership
                .last_relevant_event
                .map_or(now, |t| t.saturating_add(u64::from(self.config.max_run_secs)));
            plan_entry(ScheduledEvent::SafetyTimer, deadline);
        }

        for key in TimerKey::ALL {
            match plan[key.index()] {
                Some(entry) => {
                    let delay = recovery_delay(entry.deadline, now);
                    if entry.deadline > now {
                        info!("Recovery: {:?} resumes, {}s remaining", key, delay);
                    } else {
                        info!(
                            "Recovery: {:?} overdue by {}s, firing after {}s grace",
                            key,
                            now - entry.deadline,
                            delay
                        );
                    }
                    let at = now.saturating_add(delay);
                    self.state.timers.record(entry.event, at);
                    io.timers.schedule_at(at, entry.event);
                }
                None => {
                    if self.state.timers.get(key).is_some() {
                        debug!("Recovery: dropping orphaned {:?} timer", key);
                    }
                    self.state.timers.clear(key);
                    io.timers.cancel(key);
                }
            }
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.state.save(&mut self.storage) {
            error!("State: persist failed ({}), keeping in-memory state", e);
        }
    }
}
