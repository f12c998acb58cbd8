//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Controller (domain)
//! ```
//!
//! Driven adapters (sensors, switches, notifier, storage, timers, clock)
//! implement these traits.  The [`Controller`](super::service::Controller)
//! only ever reaches hardware through them, so every test double can
//! implement a port directly.
//!
//! Subscriptions are owned by the hosting runtime: it routes device
//! callbacks into [`Input`](super::commands::Input)s and timer fires into
//! [`Input::Timer`](super::commands::Input::Timer).

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::scheduler::{ScheduledEvent, TimerKey, Timestamp};

// ───────────────────────────────────────────────────────────────
// Sensor capability (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side view of one humidity sensor.
pub trait SensorCapability {
    /// Stable identifier used in logs and diagnostics.
    fn id(&self) -> &str;

    /// Latest reported humidity, `None` if the sensor never reported.
    fn current_value(&self) -> Option<f32>;

    /// Time of the sensor's last activity, `None` if unknown.
    fn last_activity(&self) -> Option<Timestamp>;
}

// ───────────────────────────────────────────────────────────────
// Switch capability (driven adapter: domain ↔ hardware)
// ───────────────────────────────────────────────────────────────

/// Binary switch state, also used as the command vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    Off,
}

impl SwitchState {
    pub fn is_on(self) -> bool {
        self == Self::On
    }

    pub fn from_on(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

impl core::fmt::Display for SwitchState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
        }
    }
}

/// An on/off device: the fan, the companion switch, or an interlock.
///
/// Commands are fire-and-forget.  Whether they took effect is learned
/// later from [`current_state`](Self::current_state).
pub trait SwitchCapability {
    fn id(&self) -> &str;

    /// State the device currently reports.
    fn current_state(&self) -> SwitchState;

    fn turn_on(&mut self);

    fn turn_off(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Notification port (driven adapter: domain → human)
// ───────────────────────────────────────────────────────────────

/// Alerts meant for a person (push notification, SMS, ...).
pub trait NotificationCapability {
    fn send(&mut self, message: &str);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Time ports
// ───────────────────────────────────────────────────────────────

/// Wall-clock source.  Seconds since the Unix epoch, so that persisted
/// deadlines stay meaningful across restarts.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// One-shot timers identified by purpose.
///
/// Scheduling a key that is already pending replaces it; each schedule
/// fires at most once unless cancelled.  Timers do not survive a restart.
pub trait TimerService {
    /// Fire `event` at the absolute time `at`.
    fn schedule_at(&mut self, at: Timestamp, event: ScheduledEvent);

    /// Fire `event` after `delay_secs` seconds.
    fn schedule_after(&mut self, delay_secs: u64, event: ScheduledEvent);

    /// Cancel the timer for `key`.  No-op if none is pending.
    fn cancel(&mut self, key: TimerKey);
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ durable store)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic: no partial writes on power loss.
pub trait StoragePort {
    /// Read a value.
    fn read(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Device handles
// ───────────────────────────────────────────────────────────────

/// Every device the controller talks to, grouped by role.
pub struct Devices {
    pub monitored: Vec<Box<dyn SensorCapability>>,
    pub reference: Vec<Box<dyn SensorCapability>>,
    pub fan: Box<dyn SwitchCapability>,
    pub companion: Option<Box<dyn SwitchCapability>>,
    pub must_be_off: Vec<Box<dyn SwitchCapability>>,
    pub must_be_on: Vec<Box<dyn SwitchCapability>>,
}

impl Devices {
    /// Fan plus sensors, no interlocks and no companion.
    pub fn new(
        monitored: Vec<Box<dyn SensorCapability>>,
        reference: Vec<Box<dyn SensorCapability>>,
        fan: Box<dyn SwitchCapability>,
    ) -> Self {
        Self {
            monitored,
            reference,
            fan,
            companion: None,
            must_be_off: Vec::new(),
            must_be_on: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_companion(mut self, companion: Box<dyn SwitchCapability>) -> Self {
        self.companion = Some(companion);
        self
    }

    #[must_use]
    pub fn with_interlocks(
        mut self,
        must_be_off: Vec<Box<dyn SwitchCapability>>,
        must_be_on: Vec<Box<dyn SwitchCapability>>,
    ) -> Self {
        self.must_be_off = must_be_off;
        self.must_be_on = must_be_on;
        self
    }
}
