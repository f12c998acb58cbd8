//! Restriction gate (external interlocks).
//!
//! Two sets of interlock switches suppress automatic fan control:
//!
//! - **must be off**: e.g. a "guests asleep" virtual switch; any one ON
//!   restricts.
//! - **must be on**: e.g. a "house occupied" switch; any one OFF restricts.
//!
//! The gate is recomputed from the live switch states on every interlock
//! change and at startup.  It latches the last result so the actuator
//! controller can react to *edges* (restriction set / cleared) rather
//! than levels.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{SwitchCapability, SwitchState};

/// Edge produced by [`RestrictionGate::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestrictionChange {
    Unchanged,
    Activated,
    Cleared,
}

/// Latched interlock state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestrictionGate {
    active: bool,
}

impl RestrictionGate {
    /// Recompute the restriction from the interlock switches.
    pub fn evaluate(
        &mut self,
        must_be_off: &[Box<dyn SwitchCapability>],
        must_be_on: &[Box<dyn SwitchCapability>],
    ) -> RestrictionChange {
        let offenders = offending_switches(must_be_off, must_be_on);
        let active = !offenders.is_empty();

        let change = match (self.active, active) {
            (false, true) => {
                warn!("RESTRICTION SET: {}", offenders.join(", "));
                RestrictionChange::Activated
            }
            (true, false) => {
                info!("RESTRICTION CLEARED");
                RestrictionChange::Cleared
            }
            _ => RestrictionChange::Unchanged,
        };
        self.active = active;
        change
    }

    /// True if automatic control is currently suppressed.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Ids of every interlock switch in the wrong position.
pub fn offending_switches(
    must_be_off: &[Box<dyn SwitchCapability>],
    must_be_on: &[Box<dyn SwitchCapability>],
) -> Vec<String> {
    let on_but_should_be_off = must_be_off
        .iter()
        .filter(|s| s.current_state() == SwitchState::On);
    let off_but_should_be_on = must_be_on
        .iter()
        .filter(|s| s.current_state() == SwitchState::Off);
    on_but_should_be_off
        .chain(off_but_should_be_on)
        .map(|s| s.id().to_owned())
        .collect()
}
