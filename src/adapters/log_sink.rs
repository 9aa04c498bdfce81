//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC on the device).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::retained::BootClass;

/// Adapter that logs every [`AppEvent`] to the serial console.
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
            AppEvent::Started { boot, state } => {
                let boot = match boot {
                    BootClass::Cold => "cold",
                    BootClass::SleepWake => "wake",
                };
                info!("START | boot={} state={}", boot, state.name());
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {} -> {}", from.name(), to.name());
            }
            AppEvent::ReportSent { kind, seq } => {
                info!("REPORT | {} #{} delivered", kind, seq);
            }
            AppEvent::ReportFailed { kind, seq, error } => {
                warn!("REPORT | {} #{} failed: {}", kind, seq, error);
            }
            AppEvent::Suspending { secs, awake_ms } => {
                info!("SLEEP | {}s after {}ms awake", secs, awake_ms);
            }
            AppEvent::DiscoveryBackoff { failures, secs } => {
                warn!("SLEEP | no gateway ({} failures), retry in {}s", failures, secs);
            }
        }
    }
}
