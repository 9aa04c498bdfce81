//! SoC platform adapter.
//!
//! Implements [`Clock`] and [`PlatformPort`]: reset reason, wake cause,
//! wall clock, uptime, free heap and deep sleep.
//!
//! - **`target_os = "espidf"`**: `esp_reset_reason()`,
//!   `esp_sleep_get_wakeup_cause()`, `gettimeofday()` (RTC-backed, keeps
//!   counting through deep sleep), `esp_timer_get_time()` and the
//!   `esp_sleep_*` wake-source API.
//! - **`not(target_os = "espidf")`**: `std::time` clocks, and a deep sleep
//!   that is only recorded, for host-side runs.

use log::info;

use crate::app::ports::{Clock, PlatformPort};
use crate::power::WakeSource;
use crate::retained::{BootClass, WakeCause};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(target_os = "espidf")]
use log::warn;

/// Platform adapter for the ESP32.
pub struct EspPlatform {
    /// RTC-capable GPIO that ends a sleep early when driven high.
    wake_pin: Option<i32>,
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
    #[cfg(not(target_os = "espidf"))]
    last_sleep: Option<(u32, WakeSource)>,
}

impl EspPlatform {
    pub fn new(wake_pin: Option<i32>) -> Self {
        Self {
            wake_pin,
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
            #[cfg(not(target_os = "espidf"))]
            last_sleep: None,
        }
    }

    /// Simulation: the last deep sleep requested.
    #[cfg(not(target_os = "espidf"))]
    pub fn last_sleep(&self) -> Option<(u32, WakeSource)> {
        self.last_sleep
    }
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

impl Clock for EspPlatform {
    #[cfg(target_os = "espidf")]
    fn uptime_ms(&self) -> u64 {
        (unsafe { esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    fn uptime_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    #[cfg(target_os = "espidf")]
    fn now_secs(&self) -> i64 {
        let mut tv = timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: `tv` outlives the call; a null timezone is allowed.
        if unsafe { gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return 0;
        }
        tv.tv_sec as i64
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_secs(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
    }

    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_hal::delay::FreeRtos::delay_ms(ms);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}

// ───────────────────────────────────────────────────────────────
// PlatformPort
// ───────────────────────────────────────────────────────────────

impl PlatformPort for EspPlatform {
    #[cfg(target_os = "espidf")]
    fn boot_class(&self) -> BootClass {
        // SAFETY: read-only query.
        let reason = unsafe { esp_reset_reason() };
        if reason == esp_reset_reason_t_ESP_RST_DEEPSLEEP {
            BootClass::SleepWake
        } else {
            info!("Platform: reset reason {}", reason);
            BootClass::Cold
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn boot_class(&self) -> BootClass {
        BootClass::Cold
    }

    #[cfg(target_os = "espidf")]
    fn wake_cause(&self) -> WakeCause {
        // SAFETY: read-only query.
        let cause = unsafe { esp_sleep_get_wakeup_cause() };
        if cause == esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER {
            WakeCause::Timer
        } else if cause == esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT0 {
            WakeCause::External
        } else {
            WakeCause::Other
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn wake_cause(&self) -> WakeCause {
        WakeCause::Other
    }

    #[cfg(target_os = "espidf")]
    fn free_heap(&self) -> u32 {
        unsafe { esp_get_free_heap_size() }
    }

    #[cfg(not(target_os = "espidf"))]
    fn free_heap(&self) -> u32 {
        0
    }

    #[cfg(target_os = "espidf")]
    fn deep_sleep(&mut self, secs: u32, wake: WakeSource) {
        // SAFETY: wake sources are configured from the only running task
        // immediately before sleeping; esp_deep_sleep_start does not return.
        unsafe {
            esp_sleep_enable_timer_wakeup(u64::from(secs) * 1_000_000);
            if let (WakeSource::TimerOrExternal, Some(pin)) = (wake, self.wake_pin) {
                let ret = esp_sleep_enable_ext0_wakeup(pin, 1);
                if ret != ESP_OK {
                    warn!("Platform: cannot arm wake pin {} ({})", pin, ret);
                }
            }
            info!("Platform: entering deep sleep for {}s", secs);
            esp_deep_sleep_start();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn deep_sleep(&mut self, secs: u32, wake: WakeSource) {
        let pin = match wake {
            WakeSource::TimerOrExternal => self.wake_pin,
            WakeSource::Timer => None,
        };
        info!("Platform(sim): deep sleep {}s, wake pin {:?}", secs, pin);
        self.last_sleep = Some((secs, wake));
    }
}
