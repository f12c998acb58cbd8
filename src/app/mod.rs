//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the business rules of the fan controller: event
//! dispatch, startup recovery, persistence of controller state and the
//! status report.  All interaction with devices happens through **port
//! traits** defined in [`ports`], keeping this layer fully testable
//! without real hardware.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
pub mod state;
