//! Application service: the hexagonal core.
//!
//! [`IotService`] owns the platform and transport adapters, borrows the
//! retained region, and runs one FSM step per [`process`](IotService::process)
//! call.  All I/O flows through port traits, so the whole duty cycle runs
//! on the host against mocks.
//!
//! ```text
//!  ConfigSource ──▶ ┌────────────────────────┐ ──▶ EventSink
//!  ProcessHandler ─▶│       IotService       │
//!  PlatformPort ◀──▶│  FSM · sleep · report  │◀──▶ Transport
//!                   └────────────────────────┘
//! ```

use log::{debug, error, info, warn};

use crate::config::{self, DeviceConfig};
use crate::error::{Error, Result, TransportError};
use crate::fsm::{Fsm, NON_SUSPENDING, State, StepInput, UserResult};
use crate::power::{SleepPlan, WakeSource, plan_sleep};
use crate::retained::{BootClass, CoreRetained, RetainedRegion, WakeCause};
use crate::transport::{CONFIRMATION_TIMEOUT_MS, Transport, TransportInit};

use super::context::StepContext;
use super::events::AppEvent;
use super::ports::{BatteryPort, ConfigSource, EventSink, PlatformPort, ProcessHandler};
use super::report::{self, ReportFields};

/// Result of one [`IotService::process`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    /// Still awake; call `process` again.
    Awake,
    /// Deep sleep was entered.  On the device this value is never observed.
    Suspended { secs: u32 },
}

// ───────────────────────────────────────────────────────────────
// IotService
// ───────────────────────────────────────────────────────────────

pub struct IotService<'r, P: PlatformPort, T: Transport> {
    platform: P,
    transport: T,
    retained: &'r mut RetainedRegion,
    fsm: Fsm,
    handler: Option<Box<dyn ProcessHandler + 'r>>,
    battery: Option<Box<dyn BatteryPort + 'r>>,
    config: DeviceConfig,
    boot: BootClass,
    wake_cause: WakeCause,
    /// Consumed and reset by every step.
    deep_sleep_override: i32,
    initialized: bool,
}

impl<'r, P: PlatformPort, T: Transport> IotService<'r, P, T> {
    pub fn new(platform: P, transport: T, retained: &'r mut RetainedRegion) -> Self {
        Self {
            platform,
            transport,
            retained,
            fsm: Fsm::default(),
            handler: None,
            battery: None,
            config: DeviceConfig::default(),
            boot: BootClass::Cold,
            wake_cause: WakeCause::Other,
            deep_sleep_override: 0,
            initialized: false,
        }
    }

    /// Register the application callback.
    pub fn with_handler(mut self, handler: impl ProcessHandler + 'r) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// Add a battery reader; reports then carry `vbat`.
    pub fn with_battery(mut self, battery: impl BatteryPort + 'r) -> Self {
        self.battery = Some(Box::new(battery));
        self
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Classify the boot, load the configuration and bring the transport up.
    ///
    /// When the radio transport cannot find its gateway the device is put to
    /// sleep for the backoff period before the error is returned.
    pub fn init(
        &mut self,
        source: &mut impl ConfigSource,
        sink: &mut impl EventSink,
    ) -> Result<()> {
        let mut boot = self.platform.boot_class();
        if boot == BootClass::SleepWake && !self.retained_state_decodes() {
            warn!(
                "IoT: retained state corrupt (state=0x{:02x} return=0x{:02x}), treating as cold boot",
                self.retained.core.state, self.retained.core.return_state
            );
            boot = BootClass::Cold;
        }
        self.boot = boot;
        self.wake_cause = match boot {
            BootClass::SleepWake => self.platform.wake_cause(),
            BootClass::Cold => WakeCause::Other,
        };

        self.config = config::init(&mut self.retained.config, boot == BootClass::Cold, source)?;

        if boot == BootClass::Cold {
            let now = self.platform.now_secs();
            self.retained.core = CoreRetained {
                state: State::Startup.bit(),
                return_state: State::Startup.bit(),
                sequence_number: 0,
                error_count: 0,
                last_duration_ms: 0,
                next_watchdog_at: now + i64::from(self.config.watchdog_interval),
            };
            info!(
                "IoT: cold boot, first watchdog report in {}s",
                self.config.watchdog_interval
            );
        } else {
            debug!(
                "IoT: wake ({:?}), state {} seq {}",
                self.wake_cause,
                self.state().name(),
                self.retained.core.sequence_number
            );
        }

        let result = self.transport.init(TransportInit {
            config: &self.config,
            boot,
            radio: &mut self.retained.radio,
            clock: &mut self.platform,
        });

        match result {
            Ok(()) => {}
            Err(TransportError::GatewayUnreachable { retry_in_secs }) => {
                sink.emit(&AppEvent::DiscoveryBackoff {
                    failures: self.retained.radio.gateway_failures,
                    secs: retry_in_secs,
                });
                self.suspend(retry_in_secs, WakeSource::Timer, sink);
                return Err(Error::Transport(TransportError::GatewayUnreachable {
                    retry_in_secs,
                }));
            }
            Err(e) => {
                error!("IoT: transport init failed: {}", e);
                return Err(e.into());
            }
        }

        self.initialized = true;
        sink.emit(&AppEvent::Started {
            boot,
            state: self.state(),
        });
        Ok(())
    }

    /// Run one FSM step and, if the device is now idle, apply the
    /// duty-cycle policy.
    pub fn process(&mut self, sink: &mut impl EventSink) -> Cycle {
        if !self.initialized {
            error!("IoT: process() called before a successful init()");
            return Cycle::Awake;
        }

        let state = self.state();
        let return_state = self.return_state();

        // 1. Application callback
        let mut ctx = StepContext::new(self.boot, self.wake_cause);
        let result = match self.handler.as_mut() {
            Some(h) => h.process(state, &mut ctx),
            None => UserResult::Completed,
        };
        self.deep_sleep_override = ctx.deep_sleep_duration();
        for _ in 0..ctx.error_increments() {
            self.increment_error_count();
        }
        for pending in ctx.take_reports() {
            let _ = self.send_msg(pending.kind, pending.other_field.as_deref(), sink);
        }

        // 2. Transition
        let now = self.platform.now_secs();
        let input = StepInput {
            result,
            return_state,
            watchdog_due: now >= self.retained.core.next_watchdog_at,
        };
        let t = self.fsm.step(state, &input);
        self.retained.core.state = t.state.bit();
        self.retained.core.return_state = t.return_state.bit();
        if t.state != state {
            sink.emit(&AppEvent::StateChanged {
                from: state,
                to: t.state,
            });
        }

        if let Some(report) = t.report {
            // Soft failure: counted by send_msg, never aborts the step.
            let _ = self.send_msg(report.tag(), None, sink);
        }
        if t.reschedule_watchdog {
            self.retained.core.next_watchdog_at = now + i64::from(self.config.watchdog_interval);
            debug!(
                "IoT: next watchdog report at {}",
                self.retained.core.next_watchdog_at
            );
        }

        // 3. Duty cycle
        let cycle = if NON_SUSPENDING.contains(t.state) {
            Cycle::Awake
        } else {
            match plan_sleep(
                self.deep_sleep_override,
                self.retained.core.next_watchdog_at,
                self.platform.now_secs(),
            ) {
                SleepPlan::StayAwake => Cycle::Awake,
                SleepPlan::Sleep { secs, wake } => {
                    self.suspend(secs, wake, sink);
                    Cycle::Suspended { secs }
                }
            }
        };

        self.deep_sleep_override = 0;
        cycle
    }

    /// Step until the device suspends.  Returns the requested sleep.
    pub fn run(&mut self, sink: &mut impl EventSink) -> u32 {
        loop {
            if let Cycle::Suspended { secs } = self.process(sink) {
                return secs;
            }
        }
    }

    // ── Reporting ─────────────────────────────────────────────

    /// Compose a status report and send it.
    ///
    /// Failure or a missing confirmation increments the error counter; the
    /// sequence number advances after every attempt.
    pub fn send_msg(
        &mut self,
        kind: &'static str,
        other_field: Option<&str>,
        sink: &mut impl EventSink,
    ) -> core::result::Result<(), TransportError> {
        let seq = self.retained.core.sequence_number;
        let vbat = self.battery.as_mut().map(|b| b.read_voltage());
        let fields = ReportFields {
            topic: &self.config.topic_name,
            device_name: &self.config.device_name,
            kind,
            seq,
            duration_ms: self.retained.core.last_duration_ms,
            mac: self.transport.link_identity(),
            errors: self.retained.core.error_count,
            rssi: self.transport.signal_strength(),
            state: self.state(),
            return_state: self.return_state(),
            free_heap: self.platform.free_heap(),
            other: other_field,
            vbat,
            ip: self.transport.network_address(),
        };

        let result = report::compose(&fields).and_then(|msg| {
            debug!("IoT: sending {}", msg);
            if let Some((q, _)) = self.transport.confirmations() {
                q.drain();
            }
            self.transport.send(msg.as_bytes())?;
            match self.transport.confirmations() {
                Some((q, peer)) => q.wait(&mut self.platform, &peer, CONFIRMATION_TIMEOUT_MS),
                None => Ok(()),
            }
        });

        match result {
            Ok(()) => sink.emit(&AppEvent::ReportSent { kind, seq }),
            Err(error) => {
                warn!("IoT: {} report #{} failed: {}", kind, seq, error);
                self.increment_error_count();
                sink.emit(&AppEvent::ReportFailed { kind, seq, error });
            }
        }
        self.retained.core.sequence_number = seq.wrapping_add(1);
        result
    }

    // ── Application-facing controls ───────────────────────────

    pub fn increment_error_count(&mut self) {
        let core = &mut self.retained.core;
        core.error_count = core.error_count.wrapping_add(1);
    }

    pub fn was_reset(&self) -> bool {
        self.boot == BootClass::Cold
    }

    pub fn was_deep_sleep_timeout(&self) -> bool {
        self.boot == BootClass::SleepWake && self.wake_cause == WakeCause::Timer
    }

    /// Release transport, network and battery resources.
    pub fn prepare_for_deep_sleep(&mut self) {
        if let Some(b) = self.battery.as_mut() {
            b.prepare_for_deep_sleep();
        }
        self.transport.release_for_suspension();
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> State {
        State::from_bits(self.retained.core.state).unwrap_or(State::Startup)
    }

    pub fn return_state(&self) -> State {
        State::from_bits(self.retained.core.return_state).unwrap_or(State::WaitForEvent)
    }

    pub fn sequence_number(&self) -> u32 {
        self.retained.core.sequence_number
    }

    pub fn error_count(&self) -> u32 {
        self.retained.core.error_count
    }

    pub fn next_watchdog_at(&self) -> i64 {
        self.retained.core.next_watchdog_at
    }

    pub fn last_duration_ms(&self) -> u32 {
        self.retained.core.last_duration_ms
    }

    pub fn boot_class(&self) -> BootClass {
        self.boot
    }

    pub fn wake_cause(&self) -> WakeCause {
        self.wake_cause
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ── Internal ──────────────────────────────────────────────

    fn retained_state_decodes(&self) -> bool {
        State::from_bits(self.retained.core.state).is_some()
            && State::from_bits(self.retained.core.return_state).is_some()
    }

    fn suspend(&mut self, secs: u32, wake: WakeSource, sink: &mut impl EventSink) {
        self.prepare_for_deep_sleep();
        let awake_ms = u32::try_from(self.platform.uptime_ms()).unwrap_or(u32::MAX);
        self.retained.core.last_duration_ms = awake_ms;
        sink.emit(&AppEvent::Suspending { secs, awake_ms });
        info!("IoT: deep sleep for {}s ({:?}) after {}ms awake", secs, wake, awake_ms);
        self.platform.deep_sleep(secs, wake);
    }
}
