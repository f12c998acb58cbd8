//! Persisted controller state.
//!
//! Everything that must survive a restart lives in one [`ControllerState`]
//! value, postcard-encoded under a single storage key and rewritten after
//! every handled input.  A blob that fails to decode is discarded and the
//! controller starts from the safe default (state `Normal`, fan not owned).

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::StoragePort;
use crate::control::actuator::ActuatorOwnership;
use crate::error::StorageError;
use crate::fsm::context::HumidityRecord;
use crate::safety::RestrictionGate;
use crate::scheduler::TimerLedger;
use crate::sensors::{ClusterReading, SensorRole};

pub const STATE_NAMESPACE: &str = "humidfan";
pub const STATE_KEY: &str = "state";

/// Bumped whenever the encoded layout changes; older blobs are discarded.
const STATE_VERSION: u8 = 1;

/// Per-cluster diagnostics kept across restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub last: ClusterReading,
    /// Latched once the "all sensors excluded" alert was sent.
    pub unavailable_alerted: bool,
}

/// The whole persisted state of one controller instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    version: u8,
    pub humidity: HumidityRecord,
    pub ownership: ActuatorOwnership,
    pub gate: RestrictionGate,
    pub timers: TimerLedger,
    pub monitored: ClusterStatus,
    pub reference: ClusterStatus,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            humidity: HumidityRecord::default(),
            ownership: ActuatorOwnership::default(),
            gate: RestrictionGate::default(),
            timers: TimerLedger::default(),
            monitored: ClusterStatus::default(),
            reference: ClusterStatus::default(),
        }
    }
}

impl ControllerState {
    /// A fresh state carrying the given humidity record and fan ownership,
    /// with no restriction, no timers and empty cluster diagnostics.
    pub fn new(humidity: HumidityRecord, ownership: ActuatorOwnership) -> Self {
        Self {
            humidity,
            ownership,
            ..Self::default()
        }
    }

    /// Load the persisted state, falling back to defaults when absent or
    /// unreadable.
    pub fn load(storage: &dyn StoragePort) -> Self {
        let bytes = match storage.read(STATE_NAMESPACE, STATE_KEY) {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound) => {
                info!("State: nothing persisted, starting fresh");
                return Self::default();
            }
            Err(e) => {
                warn!("State: read failed ({}), starting fresh", e);
                return Self::default();
            }
        };

        match postcard::from_bytes::<Self>(&bytes) {
            Ok(state) if state.version == STATE_VERSION => {
                info!(
                    "State: restored {} (fan owned: {})",
                    state.humidity.state, state.ownership.controlled_by_app
                );
                state
            }
            Ok(state) => {
                warn!(
                    "State: version {} != {}, starting fresh",
                    state.version, STATE_VERSION
                );
                Self::default()
            }
            Err(e) => {
                warn!("State: corrupted blob ({}), starting fresh", e);
                Self::default()
            }
        }
    }

    /// Write the state atomically.
    pub fn save(&self, storage: &mut dyn StoragePort) -> Result<(), StorageError> {
        let bytes = postcard::to_allocvec(self).map_err(|_| StorageError::Corrupted)?;
        storage.write(STATE_NAMESPACE, STATE_KEY, &bytes)
    }

    /// Remove the persisted state.
    pub fn erase(storage: &mut dyn StoragePort) -> Result<(), StorageError> {
        storage.delete(STATE_NAMESPACE, STATE_KEY)
    }

    pub fn cluster_mut(&mut self, role: SensorRole) -> &mut ClusterStatus {
        match role {
            SensorRole::Monitored => &mut self.monitored,
            SensorRole::Reference => &mut self.reference,
        }
    }
}
