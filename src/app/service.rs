//! Application service: the hexagonal core.
//!
//! [`AppService`] owns the FSM, the shared context and the session
//! counters.  It exposes a clean, hardware-agnostic API.  All I/O flows
//! through port traits injected at call sites, making the entire service
//! testable with mock adapters.
//!
//! ```text
//!  IdentityPort ──▶ ┌──────────────────────────┐
//!      ScanPort ──▶ │        AppService         │ ──▶ EventSink
//!  PresencePort ──▶ │  gather · FSM · outputs   │
//! IndicatorPort ◀── └──────────────────────────┘
//! ```

use log::info;

use crate::config::{CardRemovalPolicy, SystemConfig};
use crate::diagnostics::SessionStats;
use crate::fsm::context::{FsmContext, PortInputs};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::scan::ScanChannelId;
use crate::sensors::BobbinId;

use super::events::AppEvent;
use super::ports::{EventSink, IndicatorPort, MachinePorts};

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService {
    fsm: Fsm,
    ctx: FsmContext,
    stats: SessionStats,
    tick_count: u64,
}

impl AppService {
    /// Construct the service from configuration.
    ///
    /// Does **not** start the FSM; call [`start`](Self::start) next.
    pub fn new(config: SystemConfig) -> Self {
        let ctx = FsmContext::new(config);
        let fsm = Fsm::new(build_state_table(), StateId::Idle);
        Self {
            fsm,
            ctx,
            stats: SessionStats::default(),
            tick_count: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Enter `Idle`, drive the outputs to their safe levels and announce
    /// the start.
    pub fn start(&mut self, hw: &mut impl MachinePorts, sink: &mut impl EventSink) {
        self.ctx.now_ms = hw.now_ms();
        self.fsm.start(&mut self.ctx);
        self.apply_outputs(hw);
        self.drain_events(sink);
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        info!("AppService started in {}", self.fsm.current_state());
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one control cycle: gather inputs → FSM → outputs → events.
    ///
    /// Only the ports the current state consults are touched.  A scanning
    /// state blocks here for up to one scan window.
    pub fn tick(&mut self, hw: &mut impl MachinePorts, sink: &mut impl EventSink) {
        self.tick_count += 1;
        let prev_state = self.fsm.current_state();

        // 1. Gather the readings this state needs
        self.ctx.inputs = PortInputs::default();
        self.gather_inputs(prev_state, hw);
        self.ctx.now_ms = hw.now_ms();

        // 2. FSM tick (pure state logic)
        self.fsm.tick(&mut self.ctx);

        // 3. Apply lamp and relay commands
        self.apply_outputs(hw);

        // 4. One-shot settle pause requested by the handlers
        let settle = core::mem::take(&mut self.ctx.commands.settle_delay_ms);
        if settle > 0 {
            hw.delay_ms(settle);
        }

        // 5. Events queued by the handlers, then the state change
        self.drain_events(sink);
        let new_state = self.fsm.current_state();
        if new_state != prev_state {
            self.publish(
                sink,
                AppEvent::StateChanged {
                    from: prev_state,
                    to: new_state,
                },
            );
            if new_state == StateId::Idle {
                info!("STATS | {}", self.stats);
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    /// Current FSM state.
    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// Total control ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Counters accumulated since startup.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Read-only view of the session context.
    pub fn context(&self) -> &FsmContext {
        &self.ctx
    }

    /// The live configuration.
    pub fn config(&self) -> &SystemConfig {
        &self.ctx.config
    }

    // ── Internal ──────────────────────────────────────────────

    fn gather_inputs(&mut self, state: StateId, hw: &mut impl MachinePorts) {
        let scratch = &mut self.ctx.scratch;
        let inputs = &mut self.ctx.inputs;
        match state {
            StateId::Idle => {
                if !scratch.reader_reset {
                    hw.reset_reader();
                    scratch.reader_reset = true;
                }
                inputs.card_present = hw.is_card_present();
            }
            StateId::ReadingCard => {
                if !scratch.read_attempted {
                    scratch.read_attempted = true;
                    inputs.card_read = Some(hw.read_identity_spec());
                }
            }
            StateId::AwaitingBobbins | StateId::Fault => {
                inputs.bobbin1 = hw.read(BobbinId::One);
                inputs.bobbin2 = hw.read(BobbinId::Two);
            }
            StateId::ScanningChannel1 | StateId::ScanningChannel2 => {
                if !scratch.scan_started {
                    scratch.scan_started = true;
                    let channel = if state == StateId::ScanningChannel1 {
                        ScanChannelId::One
                    } else {
                        ScanChannelId::Two
                    };
                    hw.trigger(channel);
                    inputs.scan = Some(hw.read_payload(channel, self.ctx.config.scan_timeout_ms));
                }
            }
            StateId::Verifying => {}
            StateId::Enabled => {
                inputs.bobbin1 = hw.read(BobbinId::One);
                inputs.bobbin2 = hw.read(BobbinId::Two);
                if self.ctx.config.card_removal_policy == CardRemovalPolicy::ResetSession {
                    inputs.card_in_field = hw.card_in_field();
                }
            }
            StateId::BypassEnabled => {
                inputs.card_in_field = hw.card_in_field();
            }
        }
    }

    /// Translate FSM output commands into port calls.
    fn apply_outputs(&self, hw: &mut impl IndicatorPort) {
        let cmds = &self.ctx.commands;
        hw.set_lamps(cmds.lamps);
        // Relay is double-gated: requested by the handler and allowed by the state.
        hw.set_relay(cmds.relay && self.fsm.current_state().permits_relay());
    }

    fn drain_events(&mut self, sink: &mut impl EventSink) {
        let events = core::mem::take(&mut self.ctx.outbox);
        for event in events {
            self.publish(sink, event);
        }
    }

    fn publish(&mut self, sink: &mut impl EventSink, event: AppEvent) {
        self.stats.record(&event);
        sink.emit(&event);
    }
}
