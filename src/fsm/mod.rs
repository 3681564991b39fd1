//! Function-pointer finite state machine engine.
//!
//! Classic embedded FSM pattern ported to Rust:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  StateTable                                                   │
//! │  ┌──────────────────┬──────────┬─────────┬──────────────────┐ │
//! │  │ StateId          │ on_enter │ on_exit │ on_update        │ │
//! │  ├──────────────────┼──────────┼─────────┼──────────────────┤ │
//! │  │ Idle             │ fn(ctx)  │ -       │ fn(ctx)->Option  │ │
//! │  │ ReadingCard      │ fn(ctx)  │ -       │ fn(ctx)->Option  │ │
//! │  │ AwaitingBobbins  │ fn(ctx)  │ -       │ fn(ctx)->Option  │ │
//! │  │ ScanningChannel1 │ fn(ctx)  │ -       │ fn(ctx)->Option  │ │
//! │  │ ScanningChannel2 │ fn(ctx)  │ -       │ fn(ctx)->Option  │ │
//! │  │ Verifying        │ -        │ -       │ fn(ctx)->Option  │ │
//! │  │ Enabled          │ fn(ctx)  │ fn(ctx) │ fn(ctx)->Option  │ │
//! │  │ BypassEnabled    │ fn(ctx)  │ fn(ctx) │ fn(ctx)->Option  │ │
//! │  │ Fault            │ fn(ctx)  │ fn(ctx) │ fn(ctx)->Option  │ │
//! │  └──────────────────┴──────────┴─────────┴──────────────────┘ │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, stamps the entry time, clears the per-state scratch,
//! then runs `on_enter` for the next.  Handlers never touch hardware:
//! they read `ctx.inputs` and write `ctx.commands`.

pub mod context;
pub mod states;

use core::fmt;

use context::{FsmContext, StateScratch};
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all verification session states.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Idle = 0,
    ReadingCard = 1,
    AwaitingBobbins = 2,
    ScanningChannel1 = 3,
    ScanningChannel2 = 4,
    Verifying = 5,
    Enabled = 6,
    BypassEnabled = 7,
    Fault = 8,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 9;

    /// Convert an index back to `StateId`.  Panics on out-of-range in
    /// debug builds; returns `Fault` in release (relay-off fallback).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::ReadingCard,
            2 => Self::AwaitingBobbins,
            3 => Self::ScanningChannel1,
            4 => Self::ScanningChannel2,
            5 => Self::Verifying,
            6 => Self::Enabled,
            7 => Self::BypassEnabled,
            8 => Self::Fault,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Fault
            }
        }
    }

    /// States in which the machine relay may be closed.
    pub fn permits_relay(self) -> bool {
        matches!(self, Self::Enabled | Self::BypassEnabled)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::ReadingCard => "ReadingCard",
            Self::AwaitingBobbins => "AwaitingBobbins",
            Self::ScanningChannel1 => "ScanningChannel1",
            Self::ScanningChannel2 => "ScanningChannel2",
            Self::Verifying => "Verifying",
            Self::Enabled => "Enabled",
            Self::BypassEnabled => "BypassEnabled",
            Self::Fault => "Fault",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each state transition.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
/// Stored in a fixed-size array: no heap, no `dyn`.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
///
/// Owns the state table (array of [`StateDescriptor`]); the mutable
/// [`FsmContext`] is threaded through every handler call.
pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    /// Index of the currently active state.
    current: usize,
    /// Monotonically increasing tick counter.
    tick_count: u64,
    /// Tick at which the current state was entered.
    state_entry_tick: u64,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        ctx.state_entered_ms = ctx.now_ms;
        ctx.scratch = StateScratch::default();
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    ///
    /// 1. Call `on_update` for the current state.
    /// 2. If it returns `Some(next)`, execute the transition:
    ///    `on_exit(current)` → update pointer → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut FsmContext) {
        self.tick_count += 1;

        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// Force an immediate transition, bypassing `on_update`.
    pub fn force_transition(&mut self, next: StateId, ctx: &mut FsmContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    /// How many ticks the FSM has been in the current state.
    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut FsmContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        // Exit current state
        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        // Update pointer, timing and per-visit scratch
        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        ctx.state_entered_ms = ctx.now_ms;
        ctx.scratch = StateScratch::default();

        // Enter new state
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
