//! Humidity-driven exhaust fan controller.
//!
//! Exposes the pure-logic modules for integration testing and for hosting
//! runtimes that supply their own device adapters.  The `humidfan` binary
//! drives the same core against simulated devices.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod control;
pub mod error;
pub mod fsm;
pub mod safety;
pub mod scheduler;
pub mod sensors;

pub use app::commands::Input;
pub use app::service::{Controller, Ports, Repair};
pub use config::{ControllerConfig, OffFailurePolicy, SiteConfig};
