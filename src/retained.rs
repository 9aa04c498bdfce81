//! Memory retained across deep sleep.
//!
//! On the ESP32 the region lives in RTC slow memory in the `.rtc_noinit`
//! section: the bootloader leaves it untouched after a deep-sleep wake, and
//! it holds garbage after power-on.  Nothing here is read on the cold path
//! before it has been re-initialised.
//!
//! The layout is `#[repr(C)]` and free of pointers so that any bit pattern
//! is a valid value; decoding into typed state happens through
//! [`State::from_bits`](crate::fsm::State::from_bits).

use crate::config::ConfigRecord;

/// Why the chip is running this time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootClass {
    /// Power-on, brownout, panic or software reset: retained memory is garbage.
    Cold,
    /// Returned from deep sleep: retained memory is intact.
    SleepWake,
}

/// What ended the previous deep sleep.  Only meaningful after a
/// [`BootClass::SleepWake`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeCause {
    Timer,
    External,
    Other,
}

/// State-machine and counter fields owned by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct CoreRetained {
    pub state: u8,
    pub return_state: u8,
    pub sequence_number: u32,
    pub error_count: u32,
    /// Awake time of the previous cycle in milliseconds.
    pub last_duration_ms: u32,
    /// Absolute wall-clock second at which the next watchdog report is due.
    pub next_watchdog_at: i64,
}

/// Discovery bookkeeping owned by the radio transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct RadioRetained {
    /// Non-zero once discovery has failed in this power cycle.
    pub discovery_failed: u8,
    /// Consecutive discovery failures, drives the backoff.
    pub gateway_failures: u32,
}

impl RadioRetained {
    pub const ZEROED: Self = Self {
        discovery_failed: 0,
        gateway_failures: 0,
    };

    pub fn reset(&mut self) {
        *self = Self::ZEROED;
    }
}

/// The whole retained region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct RetainedRegion {
    pub config: ConfigRecord,
    pub core: CoreRetained,
    pub radio: RadioRetained,
}

impl RetainedRegion {
    pub const ZEROED: Self = Self {
        config: ConfigRecord::ZEROED,
        core: CoreRetained {
            state: 0,
            return_state: 0,
            sequence_number: 0,
            error_count: 0,
            last_duration_ms: 0,
            next_watchdog_at: 0,
        },
        radio: RadioRetained::ZEROED,
    };
}

// ── Device backing store ──────────────────────────────────────

#[cfg(target_os = "espidf")]
#[unsafe(link_section = ".rtc_noinit")]
static mut RETAINED: RetainedRegion = RetainedRegion::ZEROED;

#[cfg(target_os = "espidf")]
static TAKEN: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);

/// Hand out the RTC-resident region.  Returns `None` on every call after
/// the first, so there is never more than one live `&mut`.
#[cfg(target_os = "espidf")]
pub fn take() -> Option<&'static mut RetainedRegion> {
    use core::sync::atomic::Ordering;
    if TAKEN.swap(true, Ordering::AcqRel) {
        return None;
    }
    // SAFETY: guarded by TAKEN, so this is the only reference ever created.
    // Every field is plain data for which any bit pattern is valid.
    Some(unsafe { &mut *(&raw mut RETAINED) })
}
