//! Context threaded through every state handler, plus the persisted
//! humidity record it mutates.
//!
//! `FsmContext` is built fresh for each evaluation: the aggregated
//! readings, the configuration snapshot and the clock are read-only
//! inputs; the [`HumidityRecord`] and the timer request buffer are the
//! only outputs.  Handlers never touch devices or timers directly.

use log::error;
use serde::{Deserialize, Serialize};

use super::HumidityState;
use crate::config::ControllerConfig;
use crate::scheduler::{ScheduledEvent, TimerRequest, TimerRequests, Timestamp};

// ---------------------------------------------------------------------------
// Persisted humidity record
// ---------------------------------------------------------------------------

/// A debounce in progress.  Present iff the state is a pending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransition {
    /// When the pending state was entered.
    pub since: Timestamp,
    /// State committed to when the timer fires.
    pub target: HumidityState,
    pub delay_secs: u32,
}

impl PendingTransition {
    /// Absolute time at which the debounce timer fires.
    pub fn deadline(&self) -> Timestamp {
        self.since.saturating_add(u64::from(self.delay_secs))
    }

    /// The timer payload that commits this transition.
    pub fn timer_event(&self) -> ScheduledEvent {
        match self.target {
            HumidityState::High => ScheduledEvent::ActivationTimer,
            _ => ScheduledEvent::DeactivationTimer,
        }
    }
}

/// Everything the humidity state machine needs to survive a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HumidityRecord {
    pub state: HumidityState,
    pub pending: Option<PendingTransition>,
    /// Reference humidity captured when the excursion began.  Deactivation
    /// compares against this instead of the live reference.
    pub snapshot: Option<f32>,
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct FsmContext<'a> {
    // -- Timing --
    pub now: Timestamp,

    // -- Sensor data --
    /// Representative monitored-area humidity.
    pub monitored: Option<f32>,
    /// Representative reference-area humidity.
    pub reference: Option<f32>,

    // -- Configuration --
    pub config: &'a ControllerConfig,

    // -- Outputs --
    pub record: &'a mut HumidityRecord,
    /// Timer side effects for the service layer to apply.
    pub timers: TimerRequests,
}

impl<'a> FsmContext<'a> {
    pub fn new(
        config: &'a ControllerConfig,
        record: &'a mut HumidityRecord,
        now: Timestamp,
    ) -> Self {
        Self {
            now,
            monitored: None,
            reference: None,
            config,
            record,
            timers: TimerRequests::new(),
        }
    }

    #[must_use]
    pub fn with_readings(mut self, monitored: Option<f32>, reference: Option<f32>) -> Self {
        self.monitored = monitored;
        self.reference = reference;
        self
    }

    /// Queue a timer side effect.
    pub fn request(&mut self, req: TimerRequest) {
        if self.timers.push(req).is_err() {
            error!("FSM: timer request buffer full, dropping {:?}", req);
        }
    }

    /// Start the debounce toward `target` and schedule its timer.
    pub fn begin_pending(&mut self, target: HumidityState, delay_secs: u32) {
        let pending = PendingTransition {
            since: self.now,
            target,
            delay_secs,
        };
        self.record.pending = Some(pending);
        self.request(TimerRequest::Schedule {
            event: pending.timer_event(),
            at: pending.deadline(),
        });
    }
}
