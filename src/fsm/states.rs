//! Concrete state handler functions and table builder.
//!
//! Each state is one plain `fn` pointer, with no closures and no heap.
//!
//! ```text
//!  STARTUP ──[done]──▶ WAIT_FOR_EVENT ──[new event]──▶ PROCESS_EVENT
//!                         ▲      ▲                       │        │
//!                         │      └───────[aborted]───────┘     [done]
//!                         │                                       ▼
//!                         └──[done]── END_EVENT ◀──[done]── WAIT_END_EVENT
//!                                                   [retry]──▶ PROCESS_EVENT
//!
//!  WAIT_FOR_EVENT / PROCESS_EVENT / WAIT_END_EVENT ──[deadline]──▶ WATCHDOG
//!  WATCHDOG ──[report sent]──▶ interrupted state
//! ```

use super::{Report, State, StateDescriptor, StepInput, Transition, UserResult};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table, indexed by [`State::index`].
pub fn build_state_table() -> [StateDescriptor; State::COUNT] {
    [
        StateDescriptor {
            id: State::Startup,
            name: State::Startup.name(),
            on_update: startup_update,
        },
        StateDescriptor {
            id: State::WaitForEvent,
            name: State::WaitForEvent.name(),
            on_update: wait_for_event_update,
        },
        StateDescriptor {
            id: State::ProcessEvent,
            name: State::ProcessEvent.name(),
            on_update: process_event_update,
        },
        StateDescriptor {
            id: State::WaitEndEvent,
            name: State::WaitEndEvent.name(),
            on_update: wait_end_event_update,
        },
        StateDescriptor {
            id: State::EndEvent,
            name: State::EndEvent.name(),
            on_update: end_event_update,
        },
        StateDescriptor {
            id: State::Watchdog,
            name: State::Watchdog.name(),
            on_update: watchdog_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  STARTUP
// ═══════════════════════════════════════════════════════════════════════════

fn startup_update(input: &StepInput) -> Transition {
    match input.result {
        UserResult::NotCompleted => Transition::stay(State::Startup, input.return_state),
        _ => Transition::to(State::WaitForEvent).with_report(Report::Startup),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  WATCHDOG: report liveness, then resume whatever was interrupted
// ═══════════════════════════════════════════════════════════════════════════

fn watchdog_update(input: &StepInput) -> Transition {
    // A return state outside the operational set can only come from a
    // corrupted retained region; fall back to idling.
    let resume = if input.return_state.is_operational() {
        input.return_state
    } else {
        State::WaitForEvent
    };
    Transition {
        state: resume,
        return_state: resume,
        report: Some(Report::Watchdog),
        reschedule_watchdog: true,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  WAIT_FOR_EVENT
// ═══════════════════════════════════════════════════════════════════════════

fn wait_for_event_update(input: &StepInput) -> Transition {
    match input.result {
        UserResult::NewEvent => Transition::to(State::ProcessEvent),
        _ => Transition::watchdog_check(State::WaitForEvent, input.watchdog_due),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  PROCESS_EVENT
// ═══════════════════════════════════════════════════════════════════════════

fn process_event_update(input: &StepInput) -> Transition {
    match input.result {
        UserResult::Aborted => Transition::to(State::WaitForEvent),
        UserResult::NotCompleted => {
            Transition::watchdog_check(State::ProcessEvent, input.watchdog_due)
        }
        _ => Transition::to(State::WaitEndEvent),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  WAIT_END_EVENT
// ═══════════════════════════════════════════════════════════════════════════

fn wait_end_event_update(input: &StepInput) -> Transition {
    match input.result {
        UserResult::Retry => Transition::to(State::ProcessEvent),
        UserResult::NotCompleted => {
            Transition::watchdog_check(State::WaitEndEvent, input.watchdog_due)
        }
        _ => Transition::to(State::EndEvent),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  END_EVENT
// ═══════════════════════════════════════════════════════════════════════════

fn end_event_update(input: &StepInput) -> Transition {
    match input.result {
        UserResult::NotCompleted => Transition::stay(State::EndEvent, input.return_state),
        _ => Transition::to(State::WaitForEvent),
    }
}
