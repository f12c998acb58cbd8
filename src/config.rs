//! Controller configuration parameters.
//!
//! [`ControllerConfig`] is the immutable per-evaluation snapshot of every
//! threshold, delay and timeout.  [`SiteConfig`] wraps it together with the
//! device layout for the simulator binary and is loaded from JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What to do with fan ownership when an "off" command fails verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffFailurePolicy {
    /// Keep `controlled_by_app` set.  The next transition to `Normal` or the
    /// next startup consistency pass re-issues the "off".
    #[default]
    RetainOwnership,
    /// Clear `controlled_by_app` and leave the fan to manual intervention.
    ReleaseOwnership,
}

/// Core controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    // --- Absolute thresholds (%RH) ---
    /// Monitored humidity above this activates regardless of the reference.
    pub absolute_high: f32,
    /// Floor: never activate below `absolute_low + tolerance`,
    /// always deactivate below `absolute_low - tolerance`.
    pub absolute_low: f32,
    /// Band around `absolute_low`.
    pub tolerance: f32,

    // --- Relative thresholds (%RH above reference) ---
    /// Activate when monitored exceeds reference by more than this.
    pub high_offset: f32,
    /// Deactivate when monitored falls below snapshot + this.
    pub normal_offset: f32,

    // --- Debounce ---
    /// Seconds the activation predicate must hold before committing to High.
    pub activation_delay_secs: u32,
    /// Seconds the deactivation predicate must hold before committing to Normal.
    pub deactivation_delay_secs: u32,

    // --- Actuator ---
    /// Seconds after a command before the fan's reported state is checked.
    pub verification_timeout_secs: u32,
    /// Maximum run time without monitored-sensor activity (seconds).
    pub max_run_secs: u32,
    /// Ownership handling after a failed "off".
    pub off_failure_policy: OffFailurePolicy,

    // --- Sensors ---
    /// Sensors silent for longer than this are excluded (seconds).
    pub stale_after_secs: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            absolute_high: 85.0,
            absolute_low: 60.0,
            tolerance: 2.0,

            high_offset: 15.0,
            normal_offset: 8.0,

            activation_delay_secs: 60,
            deactivation_delay_secs: 300,

            verification_timeout_secs: 10,
            max_run_secs: 3600,
            off_failure_policy: OffFailurePolicy::RetainOwnership,

            stale_after_secs: 7200,
        }
    }
}

impl ControllerConfig {
    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.absolute_low) {
            return Err(ConfigError::ValidationFailed("absolute_low must be 0–100"));
        }
        if !(0.0..=100.0).contains(&self.absolute_high) {
            return Err(ConfigError::ValidationFailed("absolute_high must be 0–100"));
        }
        if self.absolute_low >= self.absolute_high {
            return Err(ConfigError::ValidationFailed(
                "absolute_low must be < absolute_high",
            ));
        }
        if !(0.0..=20.0).contains(&self.tolerance) {
            return Err(ConfigError::ValidationFailed("tolerance must be 0–20"));
        }
        if !(0.0..=100.0).contains(&self.high_offset) {
            return Err(ConfigError::ValidationFailed("high_offset must be 0–100"));
        }
        if !(0.0..=100.0).contains(&self.normal_offset) {
            return Err(ConfigError::ValidationFailed("normal_offset must be 0–100"));
        }
        if self.normal_offset >= self.high_offset {
            return Err(ConfigError::ValidationFailed(
                "normal_offset must be < high_offset",
            ));
        }
        if self.activation_delay_secs > 3600 {
            return Err(ConfigError::ValidationFailed(
                "activation_delay_secs must be 0–3600",
            ));
        }
        if self.deactivation_delay_secs > 7200 {
            return Err(ConfigError::ValidationFailed(
                "deactivation_delay_secs must be 0–7200",
            ));
        }
        if !(1..=300).contains(&self.verification_timeout_secs) {
            return Err(ConfigError::ValidationFailed(
                "verification_timeout_secs must be 1–300",
            ));
        }
        if !(60..=86_400).contains(&self.max_run_secs) {
            return Err(ConfigError::ValidationFailed(
                "max_run_secs must be 60–86400",
            ));
        }
        if self.max_run_secs <= self.verification_timeout_secs {
            return Err(ConfigError::ValidationFailed(
                "max_run_secs must be > verification_timeout_secs",
            ));
        }
        if !(60..=604_800).contains(&self.stale_after_secs) {
            return Err(ConfigError::ValidationFailed(
                "stale_after_secs must be 60–604800",
            ));
        }
        Ok(())
    }
}

/// Device ids wired into the controller by the hosting runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceLayout {
    /// Humidity sensors in the monitored area (e.g. bathroom).
    pub monitored: Vec<String>,
    /// Humidity sensors in the reference area (e.g. hallway).
    pub reference: Vec<String>,
    /// The exhaust fan switch.
    pub fan: String,
    /// Optional switch mirrored ON while humidity is High / PendingNormal.
    pub companion: Option<String>,
    /// Interlocks that must be OFF for automatic control.
    pub must_be_off: Vec<String>,
    /// Interlocks that must be ON for automatic control.
    pub must_be_on: Vec<String>,
}

/// Everything the simulator binary needs: thresholds plus wiring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    pub devices: DeviceLayout,
}

impl SiteConfig {
    /// Load and validate a site configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let site: Self = serde_json::from_str(&text)?;
        site.validate()?;
        Ok(site)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.controller.validate()?;
        if self.devices.fan.is_empty() {
            return Err(ConfigError::ValidationFailed("devices.fan must be set"));
        }
        if self.devices.monitored.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "devices.monitored needs at least one sensor",
            ));
        }
        if self.devices.reference.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "devices.reference needs at least one sensor",
            ));
        }
        Ok(())
    }
}
