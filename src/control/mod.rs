//! Actuator control.
//!
//! - [`actuator`]: fan command issuance, verification, ownership tracking,
//!   interlock reactions and the max-run safety timeout.

pub mod actuator;
