//! Simple IoT firmware: entry point and demo application.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  EspPlatform     LittleFsSource   LogEventSink   NvsAdapter  │
//! │  (Platform)      (ConfigSource)   (EventSink)    (Storage)   │
//! │  EspNowLink / WifiAdapter         BatteryMonitor             │
//! │  (RadioLink)   (Connectivity)     (BatteryPort)              │
//! │                                                              │
//! │  ─────────────── Port Trait Boundary ─────────────────       │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────┐      │
//! │  │  IotService: FSM · sleep policy · status reports   │      │
//! │  └────────────────────────────────────────────────────┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! One wake-up is one `main`: init, step until idle, deep sleep.
#![deny(unused_must_use)]

use anyhow::{Result, anyhow};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;
use log::{error, info};

use simple_iot::adapters::littlefs::LittleFsSource;
use simple_iot::adapters::log_sink::LogEventSink;
use simple_iot::adapters::platform::EspPlatform;
use simple_iot::app::context::StepContext;
use simple_iot::app::service::IotService;
use simple_iot::error::{Error, TransportError};
use simple_iot::fsm::{State, UserResult};
use simple_iot::retained;

/// RTC GPIO that wakes the device for an application event.
const EVENT_PIN: i32 = 4;

// ── Demo application ──────────────────────────────────────────
//
// Reports nothing of its own: every state completes at once, and the
// device sleeps in WAIT_FOR_EVENT until the watchdog or the event pin.

fn demo_process(state: State, ctx: &mut StepContext) -> UserResult {
    match state {
        State::Startup => {
            info!("App: first run after reset");
            UserResult::Completed
        }
        State::WaitForEvent => {
            if ctx.was_deep_sleep_timeout() {
                info!("App: woke on timer");
            }
            UserResult::NotCompleted
        }
        _ => UserResult::Completed,
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("Simple IoT v{}", env!("CARGO_PKG_VERSION"));

    let retained = retained::take().ok_or_else(|| anyhow!("retained region already taken"))?;
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let wifi = EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs_partition))?;

    let platform = EspPlatform::new(Some(EVENT_PIN));

    // ── 2. Transport ──────────────────────────────────────────
    #[cfg(feature = "datagram")]
    let transport = {
        use simple_iot::adapters::wifi::WifiAdapter;
        use simple_iot::transport::DatagramTransport;
        DatagramTransport::new(WifiAdapter::new(wifi, &sysloop)?)
    };

    #[cfg(not(feature = "datagram"))]
    let transport = {
        use simple_iot::adapters::espnow::EspNowLink;
        use simple_iot::adapters::nvs::NvsAdapter;
        use simple_iot::transport::peer::StoredPeerCache;
        use simple_iot::transport::{RadioTransport, SEND_CONFIRMATIONS};
        let storage = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {}", e))?;
        RadioTransport::new(
            EspNowLink::new(wifi, &SEND_CONFIRMATIONS),
            StoredPeerCache::new(storage),
            &SEND_CONFIRMATIONS,
        )
    };

    let service = IotService::new(platform, transport, retained).with_handler(demo_process);

    // ── 3. Battery (optional) ─────────────────────────────────
    #[cfg(feature = "battery-level")]
    let service = {
        use esp_idf_svc::hal::adc::attenuation::DB_11;
        use esp_idf_svc::hal::adc::oneshot::config::AdcChannelConfig;
        use esp_idf_svc::hal::adc::oneshot::{AdcChannelDriver, AdcDriver};
        use esp_idf_svc::hal::gpio::PinDriver;
        use simple_iot::adapters::battery::BatteryMonitor;

        let enable = PinDriver::output(peripherals.pins.gpio25)?;
        let adc = AdcDriver::new(peripherals.adc1)?;
        let config = AdcChannelConfig {
            attenuation: DB_11,
            calibration: true,
            ..Default::default()
        };
        let mut channel = AdcChannelDriver::new(adc, peripherals.pins.gpio34, &config)?;
        service.with_battery(BatteryMonitor::new(enable, move || channel.read().ok()))
    };

    let mut service = service;
    let mut sink = LogEventSink::new();
    let mut source = LittleFsSource::new();

    // ── 4. Wake-up cycle ──────────────────────────────────────
    match service.init(&mut source, &mut sink) {
        Ok(()) => {}
        // The service has already put the device to sleep for the backoff.
        Err(Error::Transport(TransportError::GatewayUnreachable { .. })) => return Ok(()),
        Err(e) => {
            error!("Init failed: {}", e);
            return Err(anyhow!(e));
        }
    }

    let secs = service.run(&mut sink);
    info!("Cycle finished, sleeping {}s", secs);
    Ok(())
}
