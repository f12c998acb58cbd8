//! Simulated devices for the `humidfan` binary.
//!
//! Each simulated device is a cheap handle around shared state: the boxed
//! copy handed to the controller and the copy kept by the simulator see
//! the same readings and switch positions.
//!
//! ```text
//!  trace line ──▶ SimBench ──▶ SimSensor / SimSwitch handle
//!                                        │ (shared Rc<RefCell<_>>)
//!                                        ▼
//!                     Devices (Box<dyn ...>) ──▶ Controller
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, info};

use crate::app::ports::{Devices, SensorCapability, SwitchCapability, SwitchState};
use crate::config::DeviceLayout;
use crate::scheduler::Timestamp;
use crate::sensors::SensorRole;

// ───────────────────────────────────────────────────────────────
// Sensor
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SensorCell {
    value: Option<f32>,
    last_activity: Option<Timestamp>,
}

/// Humidity sensor whose value is set by the simulator.
#[derive(Debug, Clone)]
pub struct SimSensor {
    id: Rc<str>,
    cell: Rc<RefCell<SensorCell>>,
}

impl SimSensor {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.into(),
            cell: Rc::default(),
        }
    }

    /// Record a reading taken at `at`.
    pub fn report(&self, value: f32, at: Timestamp) {
        let mut cell = self.cell.borrow_mut();
        cell.value = Some(value);
        cell.last_activity = Some(at);
    }
}

impl SensorCapability for SimSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn current_value(&self) -> Option<f32> {
        self.cell.borrow().value
    }

    fn last_activity(&self) -> Option<Timestamp> {
        self.cell.borrow().last_activity
    }
}

// ───────────────────────────────────────────────────────────────
// Switch
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SwitchCell {
    state: SwitchState,
    /// Commands are accepted but the state does not move.
    stuck: bool,
    commands: Vec<SwitchState>,
}

/// On/off switch.  Commands from the controller are recorded and, unless
/// the switch is stuck, applied.
#[derive(Debug, Clone)]
pub struct SimSwitch {
    id: Rc<str>,
    cell: Rc<RefCell<SwitchCell>>,
}

impl SimSwitch {
    pub fn new(id: &str, state: SwitchState) -> Self {
        Self {
            id: id.into(),
            cell: Rc::new(RefCell::new(SwitchCell {
                state,
                stuck: false,
                commands: Vec::new(),
            })),
        }
    }

    /// Flip the switch by hand (outside the controller).
    pub fn set(&self, state: SwitchState) {
        self.cell.borrow_mut().state = state;
    }

    pub fn set_stuck(&self, stuck: bool) {
        self.cell.borrow_mut().stuck = stuck;
    }

    /// Every command received, oldest first.
    pub fn commands(&self) -> Vec<SwitchState> {
        self.cell.borrow().commands.clone()
    }

    fn command(&self, target: SwitchState) {
        let mut cell = self.cell.borrow_mut();
        cell.commands.push(target);
        if cell.stuck {
            debug!("Sim: {} is stuck, ignoring {}", self.id, target);
        } else {
            cell.state = target;
        }
    }
}

impl SwitchCapability for SimSwitch {
    fn id(&self) -> &str {
        &self.id
    }

    fn current_state(&self) -> SwitchState {
        self.cell.borrow().state
    }

    fn turn_on(&mut self) {
        self.command(SwitchState::On);
    }

    fn turn_off(&mut self) {
        self.command(SwitchState::Off);
    }
}

// ───────────────────────────────────────────────────────────────
// Bench: all simulated devices of one site
// ───────────────────────────────────────────────────────────────

/// What a switch is wired as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchRole {
    Fan,
    Companion,
    Interlock,
}

/// Simulator-side handles of every device named in a [`DeviceLayout`].
pub struct SimBench {
    sensors: HashMap<String, (SensorRole, SimSensor)>,
    switches: HashMap<String, (SwitchRole, SimSwitch)>,
    fan: SimSwitch,
}

impl SimBench {
    /// Build the simulated devices and the [`Devices`] bundle wired to them.
    /// Every switch starts off and every sensor starts without a reading.
    pub fn from_layout(layout: &DeviceLayout) -> (Self, Devices) {
        let mut sensors = HashMap::new();
        let mut cluster = |ids: &[String], role: SensorRole| -> Vec<Box<dyn SensorCapability>> {
            ids.iter()
                .map(|id| {
                    let s = SimSensor::new(id);
                    sensors.insert(id.clone(), (role, s.clone()));
                    Box::new(s) as Box<dyn SensorCapability>
                })
                .collect()
        };
        let monitored = cluster(&layout.monitored, SensorRole::Monitored);
        let reference = cluster(&layout.reference, SensorRole::Reference);

        let fan = SimSwitch::new(&layout.fan, SwitchState::Off);
        let mut switches = HashMap::new();
        switches.insert(layout.fan.clone(), (SwitchRole::Fan, fan.clone()));
        let mut switch = |id: &str, role: SwitchRole| -> Box<dyn SwitchCapability> {
            let s = SimSwitch::new(id, SwitchState::Off);
            switches.insert(id.to_owned(), (role, s.clone()));
            Box::new(s)
        };
        let companion = layout
            .companion
            .as_deref()
            .map(|id| switch(id, SwitchRole::Companion));
        let must_be_off = layout
            .must_be_off
            .iter()
            .map(|id| switch(id.as_str(), SwitchRole::Interlock))
            .collect();
        let must_be_on = layout
            .must_be_on
            .iter()
            .map(|id| switch(id.as_str(), SwitchRole::Interlock))
            .collect();

        info!(
            "Sim: {} sensors, {} switches",
            sensors.len(),
            switches.len()
        );

        let mut devices = Devices::new(monitored, reference, Box::new(fan.clone()))
            .with_interlocks(must_be_off, must_be_on);
        if let Some(c) = companion {
            devices = devices.with_companion(c);
        }
        (
            Self {
                sensors,
                switches,
                fan,
            },
            devices,
        )
    }

    pub fn sensor(&self, id: &str) -> Option<(SensorRole, &SimSensor)> {
        self.sensors.get(id).map(|(role, s)| (*role, s))
    }

    pub fn switch(&self, id: &str) -> Option<(SwitchRole, &SimSwitch)> {
        self.switches.get(id).map(|(role, s)| (*role, s))
    }

    pub fn fan(&self) -> &SimSwitch {
        &self.fan
    }
}
