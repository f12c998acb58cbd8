//! Timer engine.
//!
//! Every delayed action in the controller is one of four purpose-named
//! one-shot timers.  Handlers never talk to the timer service directly:
//! they push [`TimerRequest`]s, and the service layer applies them to both
//! the [`TimerService`] and the persisted [`TimerLedger`], so that every
//! pending deadline survives a restart as an absolute timestamp.
//!
//! ```text
//!  handler ──▶ TimerRequest ──▶ Controller ──┬──▶ TimerLedger (persisted)
//!                                            └──▶ TimerService (in-memory)
//!
//!  restart: TimerLedger ──[recovery_delay]──▶ TimerService
//! ```

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::app::ports::{Clock, SwitchState, TimerService};

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// A deadline already in the past fires after this grace delay, so that
/// no handler re-enters during initialisation.
pub const MIN_GRACE_SECS: u64 = 1;

// ═══════════════════════════════════════════════════════════════
//  Timer identity
// ═══════════════════════════════════════════════════════════════

/// Timer purpose.  At most one timer per key is pending at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TimerKey {
    Activation = 0,
    Deactivation = 1,
    Verification = 2,
    Safety = 3,
}

impl TimerKey {
    pub const COUNT: usize = 4;
    pub const ALL: [Self; Self::COUNT] = [
        Self::Activation,
        Self::Deactivation,
        Self::Verification,
        Self::Safety,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Closed set of timer payloads, matched exhaustively by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduledEvent {
    /// Debounce for `PendingHigh → High` elapsed.
    ActivationTimer,
    /// Debounce for `PendingNormal → Normal` elapsed.
    DeactivationTimer,
    /// Time to read back the fan and compare against `expected`.
    VerificationTimer { expected: SwitchState },
    /// No monitored-sensor activity for the maximum run time.
    SafetyTimer,
}

impl ScheduledEvent {
    pub fn key(self) -> TimerKey {
        match self {
            Self::ActivationTimer => TimerKey::Activation,
            Self::DeactivationTimer => TimerKey::Deactivation,
            Self::VerificationTimer { .. } => TimerKey::Verification,
            Self::SafetyTimer => TimerKey::Safety,
        }
    }
}

/// A timer side effect requested by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRequest {
    /// Replace any pending timer of the same key with one firing at `at`.
    Schedule { event: ScheduledEvent, at: Timestamp },
    Cancel(TimerKey),
}

/// Per-event buffer of timer requests.  Sized well above the worst case
/// (safety timeout: cancel debounce + verification + cancel safety).
pub type TimerRequests = heapless::Vec<TimerRequest, 8>;

// ═══════════════════════════════════════════════════════════════
//  Persisted ledger
// ═══════════════════════════════════════════════════════════════

/// One persisted pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub deadline: Timestamp,
    pub event: ScheduledEvent,
}

/// Absolute deadlines of every pending timer, indexed by [`TimerKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerLedger {
    slots: [Option<LedgerEntry>; TimerKey::COUNT],
}

impl TimerLedger {
    pub fn record(&mut self, event: ScheduledEvent, deadline: Timestamp) {
        self.slots[event.key().index()] = Some(LedgerEntry { deadline, event });
    }

    pub fn clear(&mut self, key: TimerKey) {
        self.slots[key.index()] = None;
    }

    pub fn get(&self, key: TimerKey) -> Option<LedgerEntry> {
        self.slots[key.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

/// Delay to use when rebuilding a timer from a persisted deadline.
///
/// Positive remaining time is kept as is; a deadline at or before `now`
/// fires after [`MIN_GRACE_SECS`].
pub fn recovery_delay(deadline: Timestamp, now: Timestamp) -> u64 {
    if deadline > now {
        deadline - now
    } else {
        MIN_GRACE_SECS
    }
}

// ═══════════════════════════════════════════════════════════════
//  In-memory timer service
// ═══════════════════════════════════════════════════════════════

/// Deterministic single-threaded [`TimerService`].
///
/// One slot per [`TimerKey`]; the hosting loop polls
/// [`pop_due`](Self::pop_due) and feeds each event back to the controller.
pub struct TimerQueue<C: Clock> {
    slots: [Option<LedgerEntry>; TimerKey::COUNT],
    clock: C,
}

impl<C: Clock> TimerQueue<C> {
    pub fn new(clock: C) -> Self {
        Self {
            slots: [None; TimerKey::COUNT],
            clock,
        }
    }

    /// Remove and return the earliest timer whose deadline has passed.
    pub fn pop_due(&mut self) -> Option<ScheduledEvent> {
        let now = self.clock.now();
        let idx = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|e| (i, e.deadline)))
            .filter(|&(_, deadline)| deadline <= now)
            .min_by_key(|&(_, deadline)| deadline)
            .map(|(i, _)| i)?;
        self.slots[idx].take().map(|e| e.event)
    }

    /// Earliest pending deadline, if any.
    pub fn next_deadline(&self) -> Option<Timestamp> {
        self.slots.iter().flatten().map(|e| e.deadline).min()
    }

    /// Deadline of the pending timer for `key`.
    pub fn pending(&self, key: TimerKey) -> Option<Timestamp> {
        self.slots[key.index()].map(|e| e.deadline)
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C: Clock> TimerService for TimerQueue<C> {
    fn schedule_at(&mut self, at: Timestamp, event: ScheduledEvent) {
        let slot = &mut self.slots[event.key().index()];
        if slot.is_some() {
            debug!("TimerQueue: replacing pending {:?}", event.key());
        }
        info!("TimerQueue: {:?} scheduled at t={}", event, at);
        *slot = Some(LedgerEntry { deadline: at, event });
    }

    fn schedule_after(&mut self, delay_secs: u64, event: ScheduledEvent) {
        let at = self.clock.now().saturating_add(delay_secs);
        self.schedule_at(at, event);
    }

    fn cancel(&mut self, key: TimerKey) {
        if self.slots[key.index()].take().is_some() {
            info!("TimerQueue: {:?} cancelled", key);
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
