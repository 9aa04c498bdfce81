//! Function-pointer finite state machine engine.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  StateTable                                          │
//! │  ┌────────────────┬──────────────────────────────┐   │
//! │  │ State          │ on_update                    │   │
//! │  ├────────────────┼──────────────────────────────┤   │
//! │  │ Startup        │ fn(&StepInput) -> Transition │   │
//! │  │ WaitForEvent   │ fn(&StepInput) -> Transition │   │
//! │  │ ProcessEvent   │ fn(&StepInput) -> Transition │   │
//! │  │ WaitEndEvent   │ fn(&StepInput) -> Transition │   │
//! │  │ EndEvent       │ fn(&StepInput) -> Transition │   │
//! │  │ Watchdog       │ fn(&StepInput) -> Transition │   │
//! │  └────────────────┴──────────────────────────────┘   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The current state is not held here: it lives in retained memory and is
//! passed into every [`Fsm::step`].  Handlers are pure; side effects (the
//! report, the watchdog reschedule) are described by the returned
//! [`Transition`] and carried out by the service.

pub mod states;

use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Every state the device can be in.  Each tag is a distinct bit so set
/// membership is a single AND against a [`StateMask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Startup,
    WaitForEvent,
    ProcessEvent,
    WaitEndEvent,
    EndEvent,
    Watchdog,
}

impl State {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 6;

    pub const ALL: [State; Self::COUNT] = [
        Self::Startup,
        Self::WaitForEvent,
        Self::ProcessEvent,
        Self::WaitEndEvent,
        Self::EndEvent,
        Self::Watchdog,
    ];

    /// Tag stored in retained memory and sent as `st` / `rst`.
    pub const fn bit(self) -> u8 {
        match self {
            Self::Startup => 0x01,
            Self::WaitForEvent => 0x02,
            Self::ProcessEvent => 0x04,
            Self::WaitEndEvent => 0x08,
            Self::EndEvent => 0x10,
            Self::Watchdog => 0x20,
        }
    }

    /// Decode a retained tag.  Anything that is not exactly one known bit
    /// is rejected.
    pub fn from_bits(bits: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.bit() == bits)
    }

    /// Position in the state table, i.e. in [`State::ALL`].
    pub const fn index(self) -> usize {
        let mut i = 0;
        while i < Self::COUNT {
            if Self::ALL[i].bit() == self.bit() {
                return i;
            }
            i += 1;
        }
        unreachable!()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Startup => "STARTUP",
            Self::WaitForEvent => "WAIT_FOR_EVENT",
            Self::ProcessEvent => "PROCESS_EVENT",
            Self::WaitEndEvent => "WAIT_END_EVENT",
            Self::EndEvent => "END_EVENT",
            Self::Watchdog => "WATCHDOG",
        }
    }

    /// States a watchdog report may interrupt and later resume.
    pub const fn is_operational(self) -> bool {
        OPERATIONAL.contains(self)
    }
}

/// A set of states as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateMask(u8);

impl StateMask {
    pub const fn of(states: &[State]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < states.len() {
            bits |= states[i].bit();
            i += 1;
        }
        Self(bits)
    }

    pub const fn contains(self, state: State) -> bool {
        self.0 & state.bit() != 0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// States that must run another step immediately instead of suspending.
pub const NON_SUSPENDING: StateMask =
    StateMask::of(&[State::ProcessEvent, State::EndEvent, State::Watchdog]);

/// States a watchdog report resumes into.
pub const OPERATIONAL: StateMask =
    StateMask::of(&[State::WaitForEvent, State::ProcessEvent, State::WaitEndEvent]);

// ---------------------------------------------------------------------------
// Step inputs and outputs
// ---------------------------------------------------------------------------

/// What the application callback reports for the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UserResult {
    Completed = 1,
    NotCompleted,
    /// Meaningful in `ProcessEvent` only.
    Aborted,
    /// Meaningful in `WaitForEvent` only.
    NewEvent,
    /// Meaningful in `WaitEndEvent` only.
    Retry,
}

/// Everything a handler needs to decide the next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepInput {
    pub result: UserResult,
    pub return_state: State,
    /// Wall clock has reached the next watchdog deadline.
    pub watchdog_due: bool,
}

/// Reports the state machine itself emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Startup,
    Watchdog,
}

impl Report {
    /// Message type tag carried on the wire.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Startup => "STARTUP",
            Self::Watchdog => "WATCHDOG",
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub state: State,
    pub return_state: State,
    pub report: Option<Report>,
    /// Move the watchdog deadline to `now + interval`.
    pub reschedule_watchdog: bool,
}

impl Transition {
    /// Plain move to `state` with a matching return state.
    pub const fn to(state: State) -> Self {
        Self {
            state,
            return_state: state,
            report: None,
            reschedule_watchdog: false,
        }
    }

    /// Stay where we are, keeping `return_state` untouched.
    pub const fn stay(state: State, return_state: State) -> Self {
        Self {
            state,
            return_state,
            report: None,
            reschedule_watchdog: false,
        }
    }

    /// Park in `state` unless the watchdog is due, in which case divert to
    /// `Watchdog` and remember `state` as the place to resume.
    pub const fn watchdog_check(state: State, watchdog_due: bool) -> Self {
        Self {
            state: if watchdog_due { State::Watchdog } else { state },
            return_state: state,
            report: None,
            reschedule_watchdog: false,
        }
    }

    pub const fn with_report(mut self, report: Report) -> Self {
        self.report = Some(report);
        self
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for the per-step handler.
pub type StateUpdateFn = fn(&StepInput) -> Transition;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
/// Stored in a fixed-size array; no heap, no `dyn`.
pub struct StateDescriptor {
    pub id: State,
    pub name: &'static str,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
pub struct Fsm {
    /// Fixed-size table indexed by [`State::index`].
    table: [StateDescriptor; State::COUNT],
}

impl Default for Fsm {
    fn default() -> Self {
        Self::new(states::build_state_table())
    }
}

impl Fsm {
    pub fn new(table: [StateDescriptor; State::COUNT]) -> Self {
        debug_assert!(
            table.iter().enumerate().all(|(i, d)| d.id.index() == i),
            "state table out of order"
        );
        Self { table }
    }

    /// Decide the transition out of `current`.
    pub fn step(&self, current: State, input: &StepInput) -> Transition {
        let row = &self.table[current.index()];
        let next = (row.on_update)(input);

        if next.state != current {
            info!(
                "FSM transition: {} -> {} (result={:?}, return={})",
                row.name,
                self.table[next.state.index()].name,
                input.result,
                next.return_state.name()
            );
        }
        next
    }
}
