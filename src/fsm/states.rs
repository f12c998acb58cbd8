//! Concrete state handler functions, predicates and table builder.
//!
//! Each state is defined by plain `fn` pointers: no closures, no dynamic
//! dispatch.
//!
//! ```text
//!  NORMAL ──[activation]──▶ PENDING_HIGH ──[activation timer]──▶ HIGH
//!    ▲                          │                                  │
//!    └──────[!activation]───────┘                        [deactivation]
//!    │                                                             ▼
//!    └──[deactivation timer]── PENDING_NORMAL ◀────────────────────┘
//!                                    │               ▲
//!                                    └─[!deact.]─▶ HIGH
//!
//!  Any state ──[safety timeout]──▶ NORMAL
//! ```

use super::context::FsmContext;
use super::{HumidityState, StateDescriptor};
use crate::config::ControllerConfig;
use crate::scheduler::{TimerKey, TimerRequest};
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Predicates
// ═══════════════════════════════════════════════════════════════════════════

/// Humidity is high enough to start (or keep) an activation debounce.
///
/// The absolute floor always applies; above it either the absolute ceiling
/// or the offset over the reference area triggers.
pub fn activation_predicate(monitored: f32, reference: f32, cfg: &ControllerConfig) -> bool {
    monitored >= cfg.absolute_low + cfg.tolerance
        && (monitored > cfg.absolute_high || monitored > reference + cfg.high_offset)
}

/// Humidity has come back down, judged against the snapshot reference.
pub fn deactivation_predicate(monitored: f32, snapshot: f32, cfg: &ControllerConfig) -> bool {
    monitored < cfg.absolute_low - cfg.tolerance || monitored < snapshot + cfg.normal_offset
}

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the state table.  Indexed by `HumidityState as usize`.
pub fn build_state_table() -> [StateDescriptor; HumidityState::COUNT] {
    [
        // Index 0: Normal
        StateDescriptor {
            id: HumidityState::Normal,
            name: "NORMAL",
            on_enter: Some(normal_enter),
            on_exit: None,
            on_evaluate: normal_evaluate,
        },
        // Index 1: PendingHigh
        StateDescriptor {
            id: HumidityState::PendingHigh,
            name: "PENDING_HIGH",
            on_enter: Some(pending_high_enter),
            on_exit: Some(pending_high_exit),
            on_evaluate: pending_high_evaluate,
        },
        // Index 2: High
        StateDescriptor {
            id: HumidityState::High,
            name: "HIGH",
            on_enter: Some(high_enter),
            on_exit: None,
            on_evaluate: high_evaluate,
        },
        // Index 3: PendingNormal
        StateDescriptor {
            id: HumidityState::PendingNormal,
            name: "PENDING_NORMAL",
            on_enter: Some(pending_normal_enter),
            on_exit: Some(pending_normal_exit),
            on_evaluate: pending_normal_evaluate,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  NORMAL
// ═══════════════════════════════════════════════════════════════════════════

fn normal_enter(ctx: &mut FsmContext) {
    ctx.record.pending = None;
    ctx.record.snapshot = None;
}

fn normal_evaluate(ctx: &mut FsmContext) -> Option<HumidityState> {
    let (Some(monitored), Some(reference)) = (ctx.monitored, ctx.reference) else {
        return None;
    };
    if activation_predicate(monitored, reference, ctx.config) {
        info!(
            "NORMAL: monitored {:.1}% vs reference {:.1}% crosses activation",
            monitored, reference
        );
        return Some(HumidityState::PendingHigh);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  PENDING_HIGH: activation debounce
// ═══════════════════════════════════════════════════════════════════════════

fn pending_high_enter(ctx: &mut FsmContext) {
    ctx.record.snapshot = ctx.reference;
    let delay = ctx.config.activation_delay_secs;
    ctx.begin_pending(HumidityState::High, delay);
    info!(
        "PENDING_HIGH: snapshot reference {:?}, committing in {}s",
        ctx.record.snapshot, delay
    );
}

fn pending_high_exit(ctx: &mut FsmContext) {
    ctx.request(TimerRequest::Cancel(TimerKey::Activation));
}

fn pending_high_evaluate(ctx: &mut FsmContext) -> Option<HumidityState> {
    let (Some(monitored), Some(reference)) = (ctx.monitored, ctx.reference) else {
        return None;
    };
    if !activation_predicate(monitored, reference, ctx.config) {
        info!(
            "PENDING_HIGH: monitored {:.1}% no longer qualifies, cancelling",
            monitored
        );
        return Some(HumidityState::Normal);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  HIGH
// ═══════════════════════════════════════════════════════════════════════════

fn high_enter(ctx: &mut FsmContext) {
    ctx.record.pending = None;
}

fn high_evaluate(ctx: &mut FsmContext) -> Option<HumidityState> {
    let Some(monitored) = ctx.monitored else {
        return None;
    };
    let Some(snapshot) = ctx.record.snapshot else {
        warn!("HIGH: reference snapshot missing, forcing NORMAL");
        return Some(HumidityState::Normal);
    };
    if deactivation_predicate(monitored, snapshot, ctx.config) {
        info!(
            "HIGH: monitored {:.1}% below snapshot {:.1}% + {:.1}",
            monitored, snapshot, ctx.config.normal_offset
        );
        return Some(HumidityState::PendingNormal);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  PENDING_NORMAL: deactivation debounce
// ═══════════════════════════════════════════════════════════════════════════

fn pending_normal_enter(ctx: &mut FsmContext) {
    let delay = ctx.config.deactivation_delay_secs;
    ctx.begin_pending(HumidityState::Normal, delay);
    info!("PENDING_NORMAL: committing in {}s", delay);
}

fn pending_normal_exit(ctx: &mut FsmContext) {
    ctx.request(TimerRequest::Cancel(TimerKey::Deactivation));
}

fn pending_normal_evaluate(ctx: &mut FsmContext) -> Option<HumidityState> {
    let Some(monitored) = ctx.monitored else {
        return None;
    };
    let Some(snapshot) = ctx.record.snapshot else {
        warn!("PENDING_NORMAL: reference snapshot missing, forcing NORMAL");
        return Some(HumidityState::Normal);
    };
    if !deactivation_predicate(monitored, snapshot, ctx.config) {
        info!(
            "PENDING_NORMAL: monitored {:.1}% rose again, back to HIGH",
            monitored
        );
        return Some(HumidityState::High);
    }
    None
}
