//! Reactive fan controller.
//!
//! Not a state machine of its own: five kinds of input drive it.
//!
//! | Input                     | Handler                                        |
//! |---------------------------|------------------------------------------------|
//! | humidity transition       | [`on_transition`](ActuatorController::on_transition) |
//! | restriction edge          | [`on_restriction_change`](ActuatorController::on_restriction_change) |
//! | fan reported a new state  | [`on_actuator_report`](ActuatorController::on_actuator_report) |
//! | verification timer        | [`on_verification`](ActuatorController::on_verification) |
//! | safety timer              | [`on_safety_timeout`](ActuatorController::on_safety_timeout) |
//!
//! Commands are fire-and-forget.  Each one records `pending_command`,
//! schedules a verification read after `verification_timeout_secs` and,
//! for "on", (re)arms the safety timer.  The fan is never turned off
//! unless the controller believes it turned it on.
//!
//! Like the humidity handlers, this controller never touches the timer
//! service: it pushes [`TimerRequest`]s which the service layer applies
//! and persists.

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, NotificationCapability, SwitchCapability, SwitchState};
use crate::config::{ControllerConfig, OffFailurePolicy};
use crate::fsm::HumidityState;
use crate::safety::RestrictionChange;
use crate::scheduler::{ScheduledEvent, TimerKey, TimerRequest, TimerRequests, Timestamp};

/// Persisted fan ownership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActuatorOwnership {
    /// The controller turned the fan on and has not lost control of it.
    pub controlled_by_app: bool,
    /// Command issued but not yet verified.  At most one in flight.
    pub pending_command: Option<SwitchState>,
    /// Last event that (re)armed the safety timer.
    pub last_relevant_event: Option<Timestamp>,
}

impl ActuatorOwnership {
    /// True while the fan runs on the controller's behalf and no "off" is
    /// already underway.  This is the condition under which the safety
    /// timer is armed.
    pub fn is_running_for_app(&self) -> bool {
        self.controlled_by_app && self.pending_command != Some(SwitchState::Off)
    }
}

/// One handler invocation's view of the fan and its collaborators.
pub struct ActuatorController<'a> {
    now: Timestamp,
    config: &'a ControllerConfig,
    ownership: &'a mut ActuatorOwnership,
    fan: &'a mut dyn SwitchCapability,
    notifier: &'a mut dyn NotificationCapability,
    sink: &'a mut dyn EventSink,
    timers: TimerRequests,
}

impl<'a> ActuatorController<'a> {
    pub fn new(
        now: Timestamp,
        config: &'a ControllerConfig,
        ownership: &'a mut ActuatorOwnership,
        fan: &'a mut dyn SwitchCapability,
        notifier: &'a mut dyn NotificationCapability,
        sink: &'a mut dyn EventSink,
    ) -> Self {
        Self {
            now,
            config,
            ownership,
            fan,
            notifier,
            sink,
            timers: TimerRequests::new(),
        }
    }

    /// Hand the queued timer side effects to the caller.
    pub fn into_timers(self) -> TimerRequests {
        self.timers
    }

    // ── Reactions ─────────────────────────────────────────────

    /// React to the humidity state machine entering `to`.
    pub fn on_transition(&mut self, to: HumidityState, restricted: bool) {
        match to {
            HumidityState::High => {
                if restricted {
                    info!("Fan: HIGH while restricted, activation deferred");
                } else {
                    self.ensure_on();
                }
            }
            HumidityState::Normal => {
                if self.ownership.controlled_by_app {
                    self.ensure_off();
                } else {
                    debug!("Fan: NORMAL, fan not ours, leaving it alone");
                }
            }
            HumidityState::PendingHigh | HumidityState::PendingNormal => {}
        }
    }

    /// React to an interlock edge.  `state` is the current humidity state.
    pub fn on_restriction_change(&mut self, change: RestrictionChange, state: HumidityState) {
        match change {
            RestrictionChange::Activated => {
                if self.ownership.controlled_by_app {
                    info!("Fan: restriction active, turning off");
                    self.ensure_off();
                }
            }
            RestrictionChange::Cleared => {
                if state == HumidityState::High {
                    info!("Fan: restriction cleared while HIGH, resuming");
                    self.ensure_on();
                }
            }
            RestrictionChange::Unchanged => {}
        }
    }

    /// The fan reported `reported` on its own event stream.
    pub fn on_actuator_report(&mut self, reported: SwitchState) {
        match reported {
            SwitchState::Off if self.ownership.is_running_for_app() => {
                warn!(
                    "Fan: {} switched off externally, releasing control",
                    self.fan.id()
                );
                self.release();
                if self.ownership.pending_command == Some(SwitchState::On) {
                    self.ownership.pending_command = None;
                    self.request(TimerRequest::Cancel(TimerKey::Verification));
                }
                self.sink.emit(&AppEvent::ExternalOverride);
            }
            SwitchState::On if !self.ownership.controlled_by_app => {
                debug!("Fan: {} switched on externally", self.fan.id());
            }
            _ => {}
        }
    }

    /// Verification timer fired: compare the fan's reported state against
    /// the command it was scheduled for.
    pub fn on_verification(&mut self, expected: SwitchState) {
        if self.ownership.pending_command != Some(expected) {
            debug!("Fan: stale verification for {}", expected);
            return;
        }
        self.ownership.pending_command = None;

        let actual = self.fan.current_state();
        if actual == expected {
            info!("Fan: {} verified {}", self.fan.id(), expected);
            self.ownership.controlled_by_app = expected.is_on();
            self.sink.emit(&AppEvent::CommandVerified(expected));
            return;
        }

        error!(
            "Fan: {} failed to turn {} (reports {})",
            self.fan.id(),
            expected,
            actual
        );
        let message = format!(
            "Exhaust fan {} did not turn {} when commanded",
            self.fan.id(),
            expected
        );
        self.notifier.send(&message);
        self.sink.emit(&AppEvent::VerificationFailed(expected));

        match expected {
            SwitchState::On => self.release(),
            SwitchState::Off => match self.config.off_failure_policy {
                OffFailurePolicy::RetainOwnership => {
                    warn!("Fan: keeping ownership, off retried at next startup");
                }
                OffFailurePolicy::ReleaseOwnership => {
                    warn!("Fan: releasing ownership, manual intervention needed");
                    self.ownership.controlled_by_app = false;
                }
            },
        }
    }

    /// Safety timer fired.  Returns `true` if the caller must force the
    /// humidity state machine to `Normal`.
    ///
    /// A fire while not running for the app is stale and does nothing, so
    /// a second fire without new activity has no effect.
    pub fn on_safety_timeout(&mut self) -> bool {
        if !self.ownership.is_running_for_app() {
            debug!("Fan: stale safety timer");
            return false;
        }
        error!(
            "SAFETY TIMEOUT: no monitored activity for {}s, shutting fan off",
            self.config.max_run_secs
        );
        let message = format!(
            "Exhaust fan {} ran {}s without humidity updates and was turned off",
            self.fan.id(),
            self.config.max_run_secs
        );
        self.notifier.send(&message);
        self.sink.emit(&AppEvent::SafetyTimeout);
        true
    }

    /// A monitored-cluster sensor reported.  Re-arms the safety timer while
    /// the fan runs for the app.
    pub fn note_monitored_activity(&mut self) {
        if !self.ownership.is_running_for_app() {
            return;
        }
        self.ownership.last_relevant_event = Some(self.now);
        self.arm_safety();
    }

    // ── Commands ──────────────────────────────────────────────

    /// Turn the fan on unless an "on" of ours is already underway or
    /// verified.  Without ownership nothing counts as already on.
    pub fn ensure_on(&mut self) {
        let o = *self.ownership;
        let already = o.controlled_by_app
            && (o.pending_command == Some(SwitchState::On)
                || (o.pending_command.is_none() && self.fan.current_state().is_on()));
        if already {
            debug!("Fan: already on for the app");
            return;
        }
        self.turn_on();
    }

    /// Turn the fan off unless an "off" is already in flight.
    pub fn ensure_off(&mut self) {
        if self.ownership.pending_command == Some(SwitchState::Off) {
            debug!("Fan: off already pending");
            return;
        }
        self.turn_off();
    }

    /// Issue "on", take ownership and arm verification plus safety timers.
    pub fn turn_on(&mut self) {
        info!("Fan: {} -> on", self.fan.id());
        self.ownership.pending_command = Some(SwitchState::On);
        self.ownership.controlled_by_app = true;
        self.ownership.last_relevant_event = Some(self.now);
        self.fan.turn_on();
        self.sink.emit(&AppEvent::CommandIssued(SwitchState::On));
        self.arm_verification(SwitchState::On);
        self.arm_safety();
    }

    /// Issue "off".  Ownership is released only once verified.
    pub fn turn_off(&mut self) {
        info!("Fan: {} -> off", self.fan.id());
        self.ownership.pending_command = Some(SwitchState::Off);
        self.fan.turn_off();
        self.sink.emit(&AppEvent::CommandIssued(SwitchState::Off));
        self.arm_verification(SwitchState::Off);
        self.request(TimerRequest::Cancel(TimerKey::Safety));
    }

    // ── Internal ──────────────────────────────────────────────

    fn release(&mut self) {
        self.ownership.controlled_by_app = false;
        self.request(TimerRequest::Cancel(TimerKey::Safety));
    }

    fn arm_verification(&mut self, expected: SwitchState) {
        let at = self
            .now
            .saturating_add(u64::from(self.config.verification_timeout_secs));
        self.request(TimerRequest::Schedule {
            event: ScheduledEvent::VerificationTimer { expected },
            at,
        });
    }

    fn arm_safety(&mut self) {
        let at = self.now.saturating_add(u64::from(self.config.max_run_secs));
        self.request(TimerRequest::Schedule {
            event: ScheduledEvent::SafetyTimer,
            at,
        });
    }

    fn request(&mut self, req: TimerRequest) {
        if self.timers.push(req).is_err() {
            error!("Fan: timer request buffer full, dropping {:?}", req);
        }
    }
}
