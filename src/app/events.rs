//! Outbound application events and the status report.
//!
//! The [`Controller`](super::service::Controller) emits events through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log them, publish them, or record
//! them in a test.

use core::fmt;

use crate::app::ports::SwitchState;
use crate::fsm::HumidityState;
use crate::scheduler::Timestamp;
use crate::sensors::{ClusterReading, SensorRole};

/// Structured events emitted by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Startup finished (carries the recovered state).
    Started(HumidityState),

    /// The humidity state machine moved between states.
    StateChanged {
        from: HumidityState,
        to: HumidityState,
    },

    /// A command was sent to the fan.
    CommandIssued(SwitchState),

    /// The fan reported the commanded state after the verification delay.
    CommandVerified(SwitchState),

    /// The fan did not reach the commanded state.
    VerificationFailed(SwitchState),

    /// Someone else switched the fan off while the controller owned it.
    ExternalOverride,

    /// The interlock restriction was set (`true`) or cleared (`false`).
    RestrictionChanged(bool),

    /// The max-run safety timer expired.
    SafetyTimeout,

    /// An evaluation was skipped: no active sensors in that cluster.
    SensorsUnavailable(SensorRole),
}

/// Human-readable snapshot of the persisted state.  Reads state only.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub state: HumidityState,
    pub monitored: ClusterReading,
    pub reference: ClusterReading,
    pub snapshot: Option<f32>,
    /// Deadline of the running debounce, if any.
    pub pending_deadline: Option<Timestamp>,
    pub controlled_by_app: bool,
    pub pending_command: Option<SwitchState>,
    pub restricted: bool,
}

fn write_reading(f: &mut fmt::Formatter<'_>, r: &ClusterReading) -> fmt::Result {
    match r.value {
        Some(v) => write!(f, "{:.1}% ({}/{} active)", v, r.active, r.total),
        None => write!(f, "n/a ({}/{} active)", r.active, r.total),
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state={} | monitored=", self.state)?;
        write_reading(f, &self.monitored)?;
        f.write_str(" | reference=")?;
        write_reading(f, &self.reference)?;
        if let Some(s) = self.snapshot {
            write!(f, " | snapshot={:.1}%", s)?;
        }
        if let Some(d) = self.pending_deadline {
            write!(f, " | pending_until={}", d)?;
        }
        write!(
            f,
            " | fan={}",
            if self.controlled_by_app { "app" } else { "external" }
        )?;
        if let Some(cmd) = self.pending_command {
            write!(f, " (verifying {})", cmd)?;
        }
        if self.restricted {
            f.write_str(" | RESTRICTED")?;
        }
        Ok(())
    }
}
