//! Per-step view handed to the application callback.

use heapless::{String, Vec};
use log::warn;

use crate::retained::{BootClass, WakeCause};

/// Application reports one step may queue.
pub const MAX_PENDING_REPORTS: usize = 2;
/// Longest caller-supplied report field.
pub const MAX_OTHER_FIELD: usize = 64;

/// A report requested by the callback, sent once it returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReport {
    pub kind: &'static str,
    pub other_field: Option<String<MAX_OTHER_FIELD>>,
}

/// What the application may inspect and request during one step.
///
/// Requests are applied by the service once the callback returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepContext {
    boot: BootClass,
    wake_cause: WakeCause,
    deep_sleep_override: i32,
    error_increments: u32,
    reports: Vec<PendingReport, MAX_PENDING_REPORTS>,
}

impl StepContext {
    pub(crate) fn new(boot: BootClass, wake_cause: WakeCause) -> Self {
        Self {
            boot,
            wake_cause,
            deep_sleep_override: 0,
            error_increments: 0,
            reports: Vec::new(),
        }
    }

    /// Override this step's suspension: `< 0` stays awake, `0` sleeps until
    /// the next watchdog report, `> 0` sleeps that many seconds with the
    /// event pin armed.  Reset after every step.
    pub fn set_deep_sleep_duration(&mut self, secs: i32) {
        self.deep_sleep_override = secs;
    }

    pub fn deep_sleep_duration(&self) -> i32 {
        self.deep_sleep_override
    }

    /// Count an application-level failure in the next report.
    pub fn increment_error_count(&mut self) {
        self.error_increments = self.error_increments.saturating_add(1);
    }

    pub(crate) fn error_increments(&self) -> u32 {
        self.error_increments
    }

    /// Queue a status report of type `kind`, sent right after the callback
    /// returns and before the state transition.  Returns `false` when the
    /// step already queued [`MAX_PENDING_REPORTS`] or `other_field` is longer
    /// than [`MAX_OTHER_FIELD`] bytes.
    pub fn send_msg(&mut self, kind: &'static str, other_field: Option<&str>) -> bool {
        let other_field = match other_field {
            Some(f) => match String::try_from(f) {
                Ok(s) => Some(s),
                Err(()) => {
                    warn!("IoT: report field of {} bytes too long", f.len());
                    return false;
                }
            },
            None => None,
        };
        if self.reports.push(PendingReport { kind, other_field }).is_err() {
            warn!("IoT: too many reports queued in one step, dropping '{}'", kind);
            return false;
        }
        true
    }

    pub(crate) fn take_reports(&mut self) -> Vec<PendingReport, MAX_PENDING_REPORTS> {
        core::mem::take(&mut self.reports)
    }

    /// This run started from a cold boot.
    pub fn was_reset(&self) -> bool {
        self.boot == BootClass::Cold
    }

    /// This run started because the deep-sleep timer expired.
    pub fn was_deep_sleep_timeout(&self) -> bool {
        self.boot == BootClass::SleepWake && self.wake_cause == WakeCause::Timer
    }

    pub fn wake_cause(&self) -> WakeCause {
        self.wake_cause
    }
}
