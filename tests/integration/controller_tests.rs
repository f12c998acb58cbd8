//! End-to-end controller scenarios: sensors in, fan commands out.
//!
//! Default thresholds with a 50% reference: activation above 65%,
//! deactivation below 58% (snapshot 50 + 8).

use crate::mock_hw::{Rig, T0};

use humidfan::app::events::AppEvent;
use humidfan::app::ports::SwitchState::{Off, On};
use humidfan::config::{ControllerConfig, OffFailurePolicy};
use humidfan::fsm::HumidityState;
use humidfan::scheduler::TimerKey;
use humidfan::sensors::SensorRole;

/// Spike, commit to HIGH and verify the fan came on.  Leaves the clock at
/// T0 + 70.
fn to_high(rig: &mut Rig) {
    rig.readings(80.0, 50.0);
    rig.advance(70);
    assert_eq!(rig.controller.state(), HumidityState::High);
    assert_eq!(rig.controller.ownership().pending_command, None);
}

fn stale_config() -> ControllerConfig {
    ControllerConfig {
        stale_after_secs: 600,
        ..ControllerConfig::default()
    }
}

// ── Debounce ──────────────────────────────────────────────────

#[test]
fn spike_commits_to_high_after_activation_delay() {
    let mut rig = Rig::started();
    rig.readings(80.0, 50.0);

    assert_eq!(rig.controller.state(), HumidityState::PendingHigh);
    assert_eq!(rig.controller.humidity().snapshot, Some(50.0));
    assert_eq!(rig.timers.pending(TimerKey::Activation), Some(T0 + 60));
    assert_eq!(
        rig.controller.ledger().get(TimerKey::Activation).map(|e| e.deadline),
        Some(T0 + 60)
    );

    rig.advance(59);
    assert_eq!(rig.controller.state(), HumidityState::PendingHigh);
    assert!(rig.fan_commands().is_empty());

    rig.advance(1);
    assert_eq!(rig.controller.state(), HumidityState::High);
    assert_eq!(rig.fan_commands(), vec![On]);
    assert!(rig.controller.ownership().controlled_by_app);
    assert_eq!(rig.controller.ownership().pending_command, Some(On));

    rig.advance(10);
    assert_eq!(rig.controller.ownership().pending_command, None);
    assert!(rig.sink.events.contains(&AppEvent::CommandVerified(On)));
    assert!(rig.alerts().is_empty());
}

#[test]
fn false_alarm_reverts_without_touching_fan() {
    let mut rig = Rig::started();
    rig.readings(80.0, 50.0);
    rig.advance(30);
    rig.readings(60.0, 50.0);

    assert_eq!(rig.controller.state(), HumidityState::Normal);
    assert_eq!(rig.controller.humidity().snapshot, None);
    assert_eq!(rig.controller.humidity().pending, None);
    assert_eq!(rig.timers.pending(TimerKey::Activation), None);
    assert!(rig.controller.ledger().get(TimerKey::Activation).is_none());

    rig.advance(120);
    assert_eq!(rig.controller.state(), HumidityState::Normal);
    assert!(rig.fan_commands().is_empty());
}

#[test]
fn reference_drift_during_debounce_keeps_first_snapshot() {
    let mut rig = Rig::started();
    rig.readings(80.0, 50.0);
    rig.advance(10);
    rig.readings(80.0, 54.0);

    assert_eq!(rig.controller.state(), HumidityState::PendingHigh);
    assert_eq!(rig.controller.humidity().snapshot, Some(50.0));
    // Deadline is not pushed back by further qualifying readings.
    assert_eq!(rig.timers.pending(TimerKey::Activation), Some(T0 + 60));
}

#[test]
fn zero_activation_delay_commits_on_next_poll() {
    let mut rig = Rig::started_with(ControllerConfig {
        activation_delay_secs: 0,
        ..ControllerConfig::default()
    });
    rig.readings(80.0, 50.0);
    assert_eq!(rig.controller.state(), HumidityState::PendingHigh);
    assert_eq!(rig.timers.pending(TimerKey::Activation), Some(T0));

    rig.advance(0);
    assert_eq!(rig.controller.state(), HumidityState::High);
}

#[test]
fn deactivation_judged_against_snapshot_not_live_reference() {
    let mut rig = Rig::started();
    to_high(&mut rig);

    // Hall humidity climbs to 65; 70 would be "normal" against it but is
    // still well above snapshot 50 + 8.
    rig.readings(70.0, 65.0);
    assert_eq!(rig.controller.state(), HumidityState::High);

    rig.readings(55.0, 65.0);
    assert_eq!(rig.controller.state(), HumidityState::PendingNormal);
    let deadline = rig.now() + 300;
    assert_eq!(rig.timers.pending(TimerKey::Deactivation), Some(deadline));

    rig.advance(300);
    assert_eq!(rig.controller.state(), HumidityState::Normal);
    assert_eq!(rig.fan_commands(), vec![On, Off]);
    assert!(rig.controller.ownership().controlled_by_app, "until verified");

    rig.advance(10);
    assert!(!rig.controller.ownership().controlled_by_app);
    assert_eq!(rig.controller.humidity().snapshot, None);
    assert!(rig.sink.events.contains(&AppEvent::CommandVerified(Off)));
}

#[test]
fn rise_during_deactivation_debounce_returns_to_high() {
    let mut rig = Rig::started();
    to_high(&mut rig);
    rig.readings(55.0, 50.0);
    assert_eq!(rig.controller.state(), HumidityState::PendingNormal);

    rig.advance(100);
    rig.readings(75.0, 50.0);
    assert_eq!(rig.controller.state(), HumidityState::High);
    assert_eq!(rig.timers.pending(TimerKey::Deactivation), None);

    rig.advance(400);
    assert_eq!(rig.controller.state(), HumidityState::High);
    assert_eq!(rig.fan_commands(), vec![On], "no duplicate on");
}

// ── Companion ─────────────────────────────────────────────────

#[test]
fn companion_follows_fan_demand() {
    let mut rig = Rig::started();
    to_high(&mut rig);
    assert_eq!(rig.light.commands(), vec![On]);

    rig.readings(55.0, 50.0);
    assert_eq!(rig.light.commands(), vec![On], "still elevated");

    rig.advance(300);
    assert_eq!(rig.light.commands(), vec![On, Off]);
}

// ── Restriction gate ──────────────────────────────────────────

#[test]
fn restriction_defers_activation_until_cleared() {
    let mut rig = Rig::started();
    let sleep = rig.sleep.clone();
    rig.interlock(&sleep, On);
    assert!(rig.controller.is_restricted());
    assert!(rig.sink.events.contains(&AppEvent::RestrictionChanged(true)));

    rig.readings(80.0, 50.0);
    rig.advance(60);
    assert_eq!(rig.controller.state(), HumidityState::High);
    assert!(rig.fan_commands().is_empty());

    rig.interlock(&sleep, Off);
    assert!(!rig.controller.is_restricted());
    assert!(rig.sink.events.contains(&AppEvent::RestrictionChanged(false)));
    assert_eq!(rig.fan_commands(), vec![On]);
}

#[test]
fn restriction_turns_owned_fan_off_and_resumes() {
    let mut rig = Rig::started();
    to_high(&mut rig);

    let home = rig.home.clone();
    rig.interlock(&home, Off);
    assert_eq!(rig.fan_commands(), vec![On, Off]);
    assert_eq!(rig.controller.state(), HumidityState::High);

    rig.advance(10);
    assert!(!rig.controller.ownership().controlled_by_app);

    rig.interlock(&home, On);
    assert_eq!(rig.fan_commands(), vec![On, Off, On]);
}

#[test]
fn restriction_leaves_foreign_fan_alone() {
    let mut rig = Rig::started();
    rig.external_fan(On);
    let sleep = rig.sleep.clone();
    rig.interlock(&sleep, On);
    assert!(rig.fan_commands().is_empty());
    assert_eq!(rig.fan_state(), On);
}

// ── Ownership ─────────────────────────────────────────────────

#[test]
fn external_off_releases_ownership() {
    let mut rig = Rig::started();
    to_high(&mut rig);

    rig.external_fan(Off);
    assert!(!rig.controller.ownership().controlled_by_app);
    assert!(rig.sink.events.contains(&AppEvent::ExternalOverride));
    assert_eq!(rig.timers.pending(TimerKey::Safety), None);

    rig.readings(55.0, 50.0);
    rig.advance(300);
    assert_eq!(rig.controller.state(), HumidityState::Normal);
    assert_eq!(rig.fan_commands(), vec![On], "never turns off a fan it gave up");
}

#[test]
fn external_off_during_verification_window() {
    let mut rig = Rig::started();
    rig.readings(80.0, 50.0);
    rig.advance(60);
    assert_eq!(rig.controller.ownership().pending_command, Some(On));

    rig.external_fan(Off);
    assert!(!rig.controller.ownership().controlled_by_app);
    assert_eq!(rig.controller.ownership().pending_command, None);
    assert_eq!(rig.timers.pending(TimerKey::Verification), None);

    rig.advance(20);
    assert!(!rig.sink.events.contains(&AppEvent::VerificationFailed(On)));
    assert!(rig.alerts().is_empty());

    rig.readings(55.0, 50.0);
    assert_eq!(rig.controller.state(), HumidityState::PendingNormal);
    rig.readings(75.0, 50.0);
    assert_eq!(rig.controller.state(), HumidityState::High);
    assert_eq!(rig.fan_commands(), vec![On, On]);

    rig.advance(10);
    assert_eq!(rig.fan_state(), On);
    assert!(rig.controller.ownership().controlled_by_app);
    assert!(rig.sink.events.contains(&AppEvent::CommandVerified(On)));
}

#[test]
fn failed_on_alerts_and_releases() {
    let mut rig = Rig::started();
    rig.fan.set_stuck(true);
    rig.readings(80.0, 50.0);
    rig.advance(70);

    assert_eq!(rig.fan_commands(), vec![On]);
    assert!(rig.sink.events.contains(&AppEvent::VerificationFailed(On)));
    assert_eq!(rig.alerts().len(), 1);
    assert!(rig.alerts()[0].contains("did not turn on"));
    assert!(!rig.controller.ownership().controlled_by_app);
    assert_eq!(rig.timers.pending(TimerKey::Safety), None);
}

#[test]
fn failed_off_retains_ownership_by_default() {
    let mut rig = Rig::started();
    to_high(&mut rig);
    rig.fan.set_stuck(true);
    rig.readings(55.0, 50.0);
    rig.advance(310);

    assert_eq!(rig.controller.state(), HumidityState::Normal);
    assert!(rig.sink.events.contains(&AppEvent::VerificationFailed(Off)));
    assert_eq!(rig.alerts().len(), 1);
    let own = rig.controller.ownership();
    assert!(own.controlled_by_app);
    assert_eq!(own.pending_command, None);
}

#[test]
fn failed_off_can_release_ownership() {
    let mut rig = Rig::started_with(ControllerConfig {
        off_failure_policy: OffFailurePolicy::ReleaseOwnership,
        ..ControllerConfig::default()
    });
    to_high(&mut rig);
    rig.fan.set_stuck(true);
    rig.readings(55.0, 50.0);
    rig.advance(310);

    assert!(rig.sink.events.contains(&AppEvent::VerificationFailed(Off)));
    assert!(!rig.controller.ownership().controlled_by_app);
}

// ── Safety timeout ────────────────────────────────────────────

#[test]
fn safety_timeout_forces_normal_exactly_once() {
    let mut rig = Rig::started();
    to_high(&mut rig);
    assert_eq!(rig.timers.pending(TimerKey::Safety), Some(T0 + 60 + 3600));

    rig.advance(3600);
    let timeouts = |r: &Rig| r.sink.count(|e| *e == AppEvent::SafetyTimeout);
    assert_eq!(timeouts(&rig), 1);
    assert_eq!(rig.controller.state(), HumidityState::Normal);
    assert_eq!(rig.fan_commands(), vec![On, Off]);
    assert_eq!(rig.alerts().len(), 1);

    rig.advance(7200);
    assert_eq!(timeouts(&rig), 1);
    assert!(!rig.controller.ownership().controlled_by_app);
}

#[test]
fn monitored_activity_postpones_safety_timeout() {
    let mut rig = Rig::started();
    to_high(&mut rig);
    for _ in 0..3 {
        rig.advance(3000);
        rig.readings(80.0, 50.0);
    }
    assert_eq!(rig.sink.count(|e| *e == AppEvent::SafetyTimeout), 0);
    assert_eq!(rig.timers.pending(TimerKey::Safety), Some(rig.now() + 3600));
    assert_eq!(rig.controller.ownership().last_relevant_event, Some(rig.now()));
}

#[test]
fn reference_activity_does_not_postpone_safety_timeout() {
    let mut rig = Rig::started();
    to_high(&mut rig);
    rig.advance(3000);
    rig.reference(50.0);
    rig.advance(700);
    assert_eq!(rig.sink.count(|e| *e == AppEvent::SafetyTimeout), 1);
    assert_eq!(rig.controller.state(), HumidityState::Normal);
}

// ── Sensor availability ───────────────────────────────────────

#[test]
fn stale_monitored_cluster_skips_and_alerts_once() {
    let mut rig = Rig::started_with(stale_config());
    rig.readings(50.0, 50.0);
    rig.advance(700);

    rig.reference(50.0);
    rig.reference(50.0);
    let skipped = |r: &Rig| {
        r.sink
            .count(|e| *e == AppEvent::SensorsUnavailable(SensorRole::Monitored))
    };
    assert_eq!(skipped(&rig), 2);
    assert_eq!(
        rig.alerts(),
        ["All monitored humidity sensors are unavailable"]
    );
    assert_eq!(rig.controller.status().monitored.active, 0);

    // Fresh data re-arms the alert.
    rig.readings(50.0, 50.0);
    assert_eq!(rig.controller.status().monitored.active, 1);
    rig.advance(700);
    rig.reference(50.0);
    assert_eq!(rig.alerts().len(), 2);
}

#[test]
fn missing_reference_skips_only_while_normal() {
    let mut rig = Rig::started_with(stale_config());
    to_high(&mut rig);
    rig.advance(600);

    // Hall went silent; HIGH judges against the snapshot and keeps going.
    let now = rig.now();
    rig.bath.report(55.0, now);
    rig.handle(humidfan::Input::SensorEvent(SensorRole::Monitored));
    assert_eq!(rig.controller.state(), HumidityState::PendingNormal);
    assert_eq!(
        rig.sink
            .count(|e| matches!(e, AppEvent::SensorsUnavailable(_))),
        0
    );
    assert_eq!(rig.alerts(), ["All reference humidity sensors are unavailable"]);

    rig.advance(300);
    assert_eq!(rig.controller.state(), HumidityState::Normal);
    let now = rig.now();
    rig.bath.report(90.0, now);
    rig.handle(humidfan::Input::SensorEvent(SensorRole::Monitored));
    assert_eq!(rig.controller.state(), HumidityState::Normal);
    assert!(
        rig.sink
            .events
            .contains(&AppEvent::SensorsUnavailable(SensorRole::Reference))
    );
}

// ── Status / lifecycle ────────────────────────────────────────

#[test]
fn status_reports_persisted_view() {
    let mut rig = Rig::started();
    rig.readings(80.0, 50.0);

    let status = rig.controller.status();
    assert_eq!(status.state, HumidityState::PendingHigh);
    assert_eq!(status.monitored.value, Some(80.0));
    assert_eq!((status.monitored.active, status.monitored.total), (1, 1));
    assert_eq!(status.reference.value, Some(50.0));
    assert_eq!(status.snapshot, Some(50.0));
    assert_eq!(status.pending_deadline, Some(T0 + 60));
    assert!(!status.controlled_by_app);
    assert!(!status.restricted);
    assert!(status.to_string().starts_with("state=PENDING_HIGH"));
}

#[test]
fn started_event_carries_loaded_state() {
    let rig = Rig::started();
    assert_eq!(
        rig.sink.events.last(),
        Some(&AppEvent::Started(HumidityState::Normal))
    );
}

#[test]
fn uninstall_erases_state_and_timers_but_not_fan() {
    let mut rig = Rig::started();
    to_high(&mut rig);
    assert!(!rig.store.is_empty());

    rig.controller.uninstall(&mut rig.timers).unwrap();
    assert!(rig.store.is_empty());
    assert!(rig.timers.is_empty());
    assert_eq!(rig.controller.state(), HumidityState::Normal);
    assert_eq!(rig.fan_state(), On);
}
