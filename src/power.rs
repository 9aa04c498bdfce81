//! Duty-cycle policy.
//!
//! Pure functions deciding whether an idle device suspends and for how
//! long.  The service applies the resulting [`SleepPlan`] through the
//! platform port; nothing here touches hardware.

/// Longest discovery backoff: one day.
pub const MAX_BACKOFF_SECS: u32 = 86_400;

/// Wake sources armed for a deep sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeSource {
    /// RTC timer only.
    Timer,
    /// RTC timer, or the external event pin, whichever comes first.
    TimerOrExternal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepPlan {
    /// Run another step without suspending.
    StayAwake,
    Sleep { secs: u32, wake: WakeSource },
}

/// Decide the suspension for an idle step.
///
/// * `override_secs < 0`: the application asked to stay awake.
/// * `override_secs == 0`: sleep until the watchdog deadline, timer only;
///   stay awake if the deadline has already passed.
/// * `override_secs > 0`: sleep exactly that long, and let the event pin
///   cut it short.
pub fn plan_sleep(override_secs: i32, next_watchdog_at: i64, now: i64) -> SleepPlan {
    match override_secs {
        s if s < 0 => SleepPlan::StayAwake,
        0 => {
            let remaining = next_watchdog_at.saturating_sub(now);
            if remaining > 0 {
                SleepPlan::Sleep {
                    secs: u32::try_from(remaining).unwrap_or(u32::MAX),
                    wake: WakeSource::Timer,
                }
            } else {
                SleepPlan::StayAwake
            }
        }
        s => SleepPlan::Sleep {
            secs: s.unsigned_abs(),
            wake: WakeSource::TimerOrExternal,
        },
    }
}

/// Suspension after `failures` consecutive discovery failures:
/// `min(failures⁴ × 10, 86400)` seconds.
pub fn discovery_backoff_secs(failures: u32) -> u32 {
    failures
        .saturating_pow(4)
        .saturating_mul(10)
        .min(MAX_BACKOFF_SECS)
}
