//! Log-based event sink and notifier adapters.
//!
//! Implements [`EventSink`] by writing structured controller events to the
//! `log` facade, one line per event.  [`LogNotifier`] does the same for
//! human-facing alerts and keeps a copy of each for later inspection.  A
//! push-notification adapter would implement the same traits.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, NotificationCapability};

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(state) => {
                info!("START | state={}", state);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {} -> {}", from, to);
            }
            AppEvent::CommandIssued(cmd) => {
                info!("FAN   | command {}", cmd);
            }
            AppEvent::CommandVerified(cmd) => {
                info!("FAN   | verified {}", cmd);
            }
            AppEvent::VerificationFailed(cmd) => {
                warn!("FAN   | verification FAILED for {}", cmd);
            }
            AppEvent::ExternalOverride => {
                warn!("FAN   | external override, control released");
            }
            AppEvent::RestrictionChanged(active) => {
                info!(
                    "LOCK  | restriction {}",
                    if *active { "set" } else { "cleared" }
                );
            }
            AppEvent::SafetyTimeout => {
                warn!("SAFETY | max run time exceeded");
            }
            AppEvent::SensorsUnavailable(role) => {
                warn!("SENSOR | no active {} sensors, evaluation skipped", role);
            }
        }
    }
}

/// Notifier that writes alerts to the log and remembers them.
#[derive(Debug, Default)]
pub struct LogNotifier {
    sent: Vec<String>,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every alert sent so far, oldest first.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }
}

impl NotificationCapability for LogNotifier {
    fn send(&mut self, message: &str) {
        warn!("ALERT | {}", message);
        self.sent.push(message.to_owned());
    }
}
