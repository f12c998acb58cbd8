//! Function-pointer humidity state machine.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                        │
//! │  ┌────────────────┬───────────┬──────────┬─────────────────────┐   │
//! │  │ HumidityState  │ on_enter  │ on_exit  │ on_evaluate         │   │
//! │  ├────────────────┼───────────┼──────────┼─────────────────────┤   │
//! │  │ Normal         │ fn(ctx)   │ -        │ fn(ctx)->Option<>   │   │
//! │  │ PendingHigh    │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<>   │   │
//! │  │ High           │ fn(ctx)   │ -        │ fn(ctx)->Option<>   │   │
//! │  │ PendingNormal  │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<>   │   │
//! │  └────────────────┴───────────┴──────────┴─────────────────────┘   │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The machine is event-driven rather than ticked.  Each sensor event
//! calls [`evaluate`](HumidityStateMachine::evaluate), which runs
//! `on_evaluate` for the current state; debounce timers come back through
//! [`on_timer`](HumidityStateMachine::on_timer).  A timer that fires while
//! its pending state is still current commits without re-checking the
//! readings: any intervening event that broke the condition has already
//! left the pending state and cancelled the timer.
//!
//! The machine itself is stateless.  All state lives in the persisted
//! [`HumidityRecord`](context::HumidityRecord) reached through
//! [`FsmContext`].

pub mod context;
pub mod states;

use context::FsmContext;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::ControlError;
use crate::scheduler::ScheduledEvent;
use crate::sensors::SensorRole;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Humidity classification of the monitored area.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum HumidityState {
    #[default]
    Normal = 0,
    PendingHigh = 1,
    High = 2,
    PendingNormal = 3,
}

impl HumidityState {
    /// Total number of states: used to size the table array.
    pub const COUNT: usize = 4;

    /// True while the fan should be running (companion switch ON).
    pub fn is_elevated(self) -> bool {
        matches!(self, Self::High | Self::PendingNormal)
    }

    /// True for states whose evaluation compares against the live reference.
    fn needs_reference(self) -> bool {
        matches!(self, Self::Normal | Self::PendingHigh)
    }
}

impl core::fmt::Display for HumidityState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Normal => "NORMAL",
            Self::PendingHigh => "PENDING_HIGH",
            Self::High => "HIGH",
            Self::PendingNormal => "PENDING_NORMAL",
        };
        f.write_str(name)
    }
}

/// A completed state change, reported to the side-effect hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: HumidityState,
    pub to: HumidityState,
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut FsmContext<'_>);

/// Signature for the per-event evaluation handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateEvaluateFn = fn(&mut FsmContext<'_>) -> Option<HumidityState>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single state.
pub struct StateDescriptor {
    pub id: HumidityState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_evaluate: StateEvaluateFn,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The humidity state machine engine.
pub struct HumidityStateMachine {
    /// Fixed-size table indexed by `HumidityState as usize`.
    table: [StateDescriptor; HumidityState::COUNT],
}

impl Default for HumidityStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl HumidityStateMachine {
    pub fn new() -> Self {
        Self {
            table: states::build_state_table(),
        }
    }

    /// Evaluate the current readings against the current state.
    ///
    /// Returns `Err(SensorUnavailable)` without touching the record when a
    /// reading the current state depends on is missing.
    pub fn evaluate(&self, ctx: &mut FsmContext) -> Result<Option<Transition>, ControlError> {
        let state = ctx.record.state;
        if ctx.monitored.is_none() {
            return Err(ControlError::SensorUnavailable(SensorRole::Monitored));
        }
        if state.needs_reference() && ctx.reference.is_none() {
            return Err(ControlError::SensorUnavailable(SensorRole::Reference));
        }

        let next = (self.descriptor(state).on_evaluate)(ctx);
        Ok(next.and_then(|to| self.transition(to, ctx)))
    }

    /// Handle a debounce timer.  Commits only if the matching pending state
    /// is still current; anything else is a stale fire and is ignored.
    pub fn on_timer(&self, event: ScheduledEvent, ctx: &mut FsmContext) -> Option<Transition> {
        let state = ctx.record.state;
        let target = match (event, state) {
            (ScheduledEvent::ActivationTimer, HumidityState::PendingHigh) => HumidityState::High,
            (ScheduledEvent::DeactivationTimer, HumidityState::PendingNormal) => {
                HumidityState::Normal
            }
            _ => {
                debug!("FSM: ignoring {:?} in {}", event, state);
                return None;
            }
        };
        self.transition(target, ctx)
    }

    /// Force an immediate transition (safety timeout, startup repair).
    /// No-op if already in `next`.
    pub fn force_transition(
        &self,
        next: HumidityState,
        ctx: &mut FsmContext,
    ) -> Option<Transition> {
        self.transition(next, ctx)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn descriptor(&self, state: HumidityState) -> &StateDescriptor {
        &self.table[state as usize]
    }

    fn transition(&self, next: HumidityState, ctx: &mut FsmContext) -> Option<Transition> {
        let from = ctx.record.state;
        if from == next {
            return None;
        }

        info!(
            "FSM transition: {} -> {}",
            self.descriptor(from).name,
            self.descriptor(next).name
        );

        if let Some(exit) = self.descriptor(from).on_exit {
            exit(ctx);
        }

        ctx.record.state = next;

        if let Some(enter) = self.descriptor(next).on_enter {
            enter(ctx);
        }

        Some(Transition { from, to: next })
    }
}
