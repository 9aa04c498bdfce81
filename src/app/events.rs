//! Outbound application events.
//!
//! The [`IotService`](super::service::IotService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them (log to serial, count them in tests).

use crate::error::TransportError;
use crate::fsm::State;
use crate::retained::BootClass;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Initialisation finished (carries the state the first step runs in).
    Started { boot: BootClass, state: State },

    /// The FSM transitioned between states.
    StateChanged { from: State, to: State },

    /// A status report was handed to the transport and confirmed.
    ReportSent { kind: &'static str, seq: u32 },

    /// A status report failed; the error counter was incremented.
    ReportFailed {
        kind: &'static str,
        seq: u32,
        error: TransportError,
    },

    /// The device is about to deep sleep.
    Suspending { secs: u32, awake_ms: u32 },

    /// Gateway discovery failed; the device sleeps before retrying.
    DiscoveryBackoff { failures: u32, secs: u32 },
}
