//! Concrete state handler functions and table builder.
//!
//! Each state is defined by plain `fn` pointers: no closures, no dynamic
//! dispatch, no heap.
//!
//! ```text
//!  IDLE ──[card]──▶ READING_CARD ──[bypass]──────────────────▶ BYPASS_ENABLED
//!    ▲                 │    │                                       │
//!    │      [read fail]┘    └[spec ok]──▶ AWAITING_BOBBINS          │
//!    │                                        │                     │
//!    │                          [both present, debounced]           │
//!    │                                        ▼                     │
//!    │                  SCANNING_CH1 ──▶ SCANNING_CH2 ──▶ VERIFYING  │
//!    │                                                      │       │
//!    ├────────[bobbin removed]──── ENABLED ◀──[match]───────┘       │
//!    ├────────[card removed or swapped]─────────────────────────────┘
//!    │
//!    └──[both bobbins removed]── FAULT ◀── invalid kanban / sensor timeout /
//!                                          scan timeout / mismatch
//! ```

use log::{debug, info, warn};

use super::context::{FsmContext, LampState};
use super::{StateDescriptor, StateId};
use crate::app::events::{AppEvent, SensorSnapshot, VerifyReport};
use crate::config::CardRemovalPolicy;
use crate::error::FaultReason;
use crate::scan::ScanChannelId;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0 — Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 1 — ReadingCard
        StateDescriptor {
            id: StateId::ReadingCard,
            name: "ReadingCard",
            on_enter: Some(reading_card_enter),
            on_exit: None,
            on_update: reading_card_update,
        },
        // Index 2 — AwaitingBobbins
        StateDescriptor {
            id: StateId::AwaitingBobbins,
            name: "AwaitingBobbins",
            on_enter: Some(awaiting_bobbins_enter),
            on_exit: None,
            on_update: awaiting_bobbins_update,
        },
        // Index 3 — ScanningChannel1
        StateDescriptor {
            id: StateId::ScanningChannel1,
            name: "ScanningChannel1",
            on_enter: Some(scanning_enter),
            on_exit: None,
            on_update: scanning_channel1_update,
        },
        // Index 4 — ScanningChannel2
        StateDescriptor {
            id: StateId::ScanningChannel2,
            name: "ScanningChannel2",
            on_enter: Some(scanning_enter),
            on_exit: None,
            on_update: scanning_channel2_update,
        },
        // Index 5 — Verifying
        StateDescriptor {
            id: StateId::Verifying,
            name: "Verifying",
            on_enter: None,
            on_exit: None,
            on_update: verifying_update,
        },
        // Index 6 — Enabled
        StateDescriptor {
            id: StateId::Enabled,
            name: "Enabled",
            on_enter: Some(enabled_enter),
            on_exit: Some(relay_off_exit),
            on_update: enabled_update,
        },
        // Index 7 — BypassEnabled
        StateDescriptor {
            id: StateId::BypassEnabled,
            name: "BypassEnabled",
            on_enter: Some(bypass_enter),
            on_exit: Some(relay_off_exit),
            on_update: bypass_update,
        },
        // Index 8 — Fault
        StateDescriptor {
            id: StateId::Fault,
            name: "Fault",
            on_enter: Some(fault_enter),
            on_exit: Some(fault_exit),
            on_update: fault_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Shared helpers
// ═══════════════════════════════════════════════════════════════════════════

/// Queue a bobbin snapshot at most once per configured interval.
fn maybe_snapshot(ctx: &mut FsmContext) {
    let interval = u64::from(ctx.config.debug_snapshot_interval_ms);
    let due = match ctx.scratch.last_snapshot_ms {
        None => true,
        Some(last) => ctx.now_ms.saturating_sub(last) >= interval,
    };
    if due {
        ctx.scratch.last_snapshot_ms = Some(ctx.now_ms);
        let snapshot = SensorSnapshot {
            bobbin1: ctx.inputs.bobbin1,
            bobbin2: ctx.inputs.bobbin2,
            ms_in_state: ctx.ms_in_state(),
        };
        ctx.emit(AppEvent::SensorSnapshot(snapshot));
    }
}

fn enter_fault(ctx: &mut FsmContext, reason: FaultReason) -> Option<StateId> {
    ctx.fault = Some(reason);
    Some(StateId::Fault)
}

/// Whether the card that opened the session still answers in the field.
/// Logs why not.
fn session_card_held(ctx: &FsmContext, tag: &str) -> bool {
    match &ctx.inputs.card_in_field {
        Some(uid) if *uid == ctx.card => true,
        Some(uid) => {
            warn!("{tag}: different card {uid} presented, ending session");
            false
        }
        None => {
            info!("{tag}: card removed, ending session");
            false
        }
    }
}

fn relay_off_exit(ctx: &mut FsmContext) {
    ctx.commands.relay = false;
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE — session reset, polling for a card
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut FsmContext) {
    // settle_delay_ms is left alone: the exiting state may have requested one.
    ctx.commands.relay = false;
    ctx.commands.lamps = LampState::OFF;
    ctx.reset_session();
    info!("IDLE: waiting for kanban card");
}

fn idle_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.inputs.card_present {
        return Some(StateId::ReadingCard);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  READING_CARD — one authenticated read of both thread sectors
// ═══════════════════════════════════════════════════════════════════════════

fn reading_card_enter(ctx: &mut FsmContext) {
    ctx.spec.clear();
    info!("READING_CARD: card detected");
}

fn reading_card_update(ctx: &mut FsmContext) -> Option<StateId> {
    match ctx.inputs.card_read.take()? {
        Ok((card, spec)) => {
            ctx.card = card.clone();
            ctx.spec = spec.clone();
            ctx.emit(AppEvent::CardRead { card, spec });

            if ctx.spec.is_bypass {
                Some(StateId::BypassEnabled)
            } else if ctx.spec.is_complete() {
                info!(
                    "READING_CARD: expecting '{}' / '{}'",
                    ctx.spec.thread1, ctx.spec.thread2
                );
                Some(StateId::AwaitingBobbins)
            } else {
                warn!("READING_CARD: kanban has an empty thread field");
                enter_fault(ctx, FaultReason::InvalidKanban)
            }
        }
        Err(e) => {
            warn!(
                "READING_CARD: {e}, retrying in {} ms",
                ctx.config.read_fail_backoff_ms
            );
            ctx.emit(AppEvent::CardReadFailed(e));
            ctx.commands.settle_delay_ms = ctx.config.read_fail_backoff_ms;
            Some(StateId::Idle)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  AWAITING_BOBBINS — lamps mirror the sensors until both are loaded
// ═══════════════════════════════════════════════════════════════════════════

fn awaiting_bobbins_enter(ctx: &mut FsmContext) {
    ctx.commands.lamps = LampState::ALARM;
    info!(
        "AWAITING_BOBBINS: load both bobbins within {} s",
        ctx.config.bobbin_timeout_ms / 1000
    );
}

fn awaiting_bobbins_update(ctx: &mut FsmContext) -> Option<StateId> {
    let (b1, b2) = (ctx.inputs.bobbin1, ctx.inputs.bobbin2);
    ctx.commands.lamps = LampState::from_bobbins(b1, b2);
    maybe_snapshot(ctx);

    if b1 && b2 {
        let since = *ctx.scratch.both_present_since_ms.get_or_insert(ctx.now_ms);
        if ctx.now_ms.saturating_sub(since) >= u64::from(ctx.config.bobbin_debounce_ms) {
            info!("AWAITING_BOBBINS: both bobbins loaded");
            return Some(StateId::ScanningChannel1);
        }
    } else {
        ctx.scratch.both_present_since_ms = None;
    }

    if ctx.ms_in_state() > u64::from(ctx.config.bobbin_timeout_ms) {
        warn!("AWAITING_BOBBINS: timed out (bobbin1={b1}, bobbin2={b2})");
        return enter_fault(ctx, FaultReason::SensorTimeout);
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  SCANNING_CHANNEL_1 / _2 — the service triggers and reads; we judge
// ═══════════════════════════════════════════════════════════════════════════

fn scanning_enter(ctx: &mut FsmContext) {
    debug!("SCANNING: waiting up to {} ms", ctx.config.scan_timeout_ms);
}

fn scanning_channel1_update(ctx: &mut FsmContext) -> Option<StateId> {
    let payload = ctx.inputs.scan.take()?;
    ctx.emit(AppEvent::ScanCompleted {
        channel: ScanChannelId::One,
        payload: payload.clone(),
    });
    if payload.is_empty() {
        return enter_fault(ctx, FaultReason::ScanTimeout(ScanChannelId::One));
    }
    ctx.scans[ScanChannelId::One.index()] = payload;
    ctx.commands.lamps = LampState::new(true, false, false, false);
    Some(StateId::ScanningChannel2)
}

fn scanning_channel2_update(ctx: &mut FsmContext) -> Option<StateId> {
    let payload = ctx.inputs.scan.take()?;
    ctx.emit(AppEvent::ScanCompleted {
        channel: ScanChannelId::Two,
        payload: payload.clone(),
    });
    if payload.is_empty() {
        return enter_fault(ctx, FaultReason::ScanTimeout(ScanChannelId::Two));
    }
    ctx.scans[ScanChannelId::Two.index()] = payload;
    ctx.commands.lamps = LampState::new(true, true, false, false);
    Some(StateId::Verifying)
}

// ═══════════════════════════════════════════════════════════════════════════
//  VERIFYING — exact, case-sensitive comparison
// ═══════════════════════════════════════════════════════════════════════════

fn verifying_update(ctx: &mut FsmContext) -> Option<StateId> {
    let report = VerifyReport {
        expected1: ctx.spec.thread1.clone(),
        scanned1: ctx.scan(ScanChannelId::One).clone(),
        expected2: ctx.spec.thread2.clone(),
        scanned2: ctx.scan(ScanChannelId::Two).clone(),
    };
    let (thread1_ok, thread2_ok) = (report.thread1_ok(), report.thread2_ok());
    ctx.emit(AppEvent::Verified(report));

    if thread1_ok && thread2_ok {
        Some(StateId::Enabled)
    } else {
        enter_fault(
            ctx,
            FaultReason::VerificationMismatch {
                thread1_ok,
                thread2_ok,
            },
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  ENABLED — relay closed while both bobbins stay loaded
// ═══════════════════════════════════════════════════════════════════════════

fn enabled_enter(ctx: &mut FsmContext) {
    ctx.commands.relay = true;
    ctx.commands.lamps = LampState::READY;
    info!("ENABLED: threads verified, machine enabled");
}

fn enabled_update(ctx: &mut FsmContext) -> Option<StateId> {
    maybe_snapshot(ctx);
    if !ctx.inputs.bobbin1 || !ctx.inputs.bobbin2 {
        info!("ENABLED: bobbin removed, ending session");
        return Some(StateId::Idle);
    }
    if ctx.config.card_removal_policy == CardRemovalPolicy::ResetSession
        && !session_card_held(ctx, "ENABLED")
    {
        return Some(StateId::Idle);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  BYPASS_ENABLED — maintenance override while the same card stays present
// ═══════════════════════════════════════════════════════════════════════════

fn bypass_enter(ctx: &mut FsmContext) {
    ctx.commands.relay = true;
    ctx.commands.lamps = LampState::READY;
    warn!("BYPASS: machine enabled without verification");
}

fn bypass_update(ctx: &mut FsmContext) -> Option<StateId> {
    if !session_card_held(ctx, "BYPASS") {
        return Some(StateId::Idle);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  FAULT — relay open, fault lamps blinking until the bobbins are cleared
// ═══════════════════════════════════════════════════════════════════════════

fn fault_enter(ctx: &mut FsmContext) {
    ctx.commands.relay = false;
    ctx.commands.lamps = LampState::for_fault(ctx.fault);
    match ctx.fault {
        Some(reason) => {
            warn!("FAULT: {reason}, remove both bobbins to reset");
            ctx.emit(AppEvent::FaultEntered(reason));
        }
        None => warn!("FAULT: entered without a recorded reason"),
    }
}

fn fault_exit(_ctx: &mut FsmContext) {
    info!("FAULT: cleared by operator");
}

fn fault_update(ctx: &mut FsmContext) -> Option<StateId> {
    let half = u64::from(ctx.config.fault_blink_half_period_ms).max(1);
    let lit = (ctx.ms_in_state() / half) % 2 == 0;
    ctx.commands.relay = false;
    ctx.commands.lamps = if lit {
        LampState::for_fault(ctx.fault)
    } else {
        LampState::OFF
    };
    maybe_snapshot(ctx);

    if !ctx.inputs.bobbin1 && !ctx.inputs.bobbin2 {
        ctx.commands.settle_delay_ms = ctx.config.fault_reset_delay_ms;
        return Some(StateId::Idle);
    }
    None
}
