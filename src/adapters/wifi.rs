//! WiFi station-mode adapter.
//!
//! Implements [`ConnectivityPort`] for the datagram transport.  `connect`
//! only starts association; the transport polls [`state`] until the
//! station has an address or the attempt failed.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver via `esp_idf_svc::wifi`.
//!   A `StaDisconnected` event during association (wrong password, AP gone)
//!   turns the state into [`WifiState::Failed`].
//! - **all other targets**: a simulated station that associates (or fails)
//!   after a configurable number of state polls, for host-side tests.
//!
//! [`state`]: ConnectivityPort::state

use std::net::Ipv4Addr;

use log::{error, info};

use crate::app::ports::{ConnectivityPort, MacAddr, WifiState};
use crate::error::ConnectivityError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::EspError;
#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent};
#[cfg(target_os = "espidf")]
use log::warn;
#[cfg(target_os = "espidf")]
use std::sync::Arc;
#[cfg(target_os = "espidf")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(not(target_os = "espidf"))]
use core::cell::Cell;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

/// 1 to 32 bytes of printable ASCII (space through `~`).  Also used to
/// filter scan results before gateway matching.
pub(crate) fn is_valid_ssid(ssid: &str) -> bool {
    (1..=32).contains(&ssid.len()) && ssid.bytes().all(|b| b == b' ' || b.is_ascii_graphic())
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if is_valid_ssid(ssid) {
        Ok(())
    } else {
        Err(ConnectivityError::InvalidSsid)
    }
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 32 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    ssid: heapless::String<32>,
    password: heapless::String<32>,
    /// Set when the driver rejected the last `connect`.
    failed: bool,
    #[cfg(target_os = "espidf")]
    wifi: EspWifi<'static>,
    /// Reason code of the last `StaDisconnected` event, 0 for none.
    #[cfg(target_os = "espidf")]
    disconnect_reason: Arc<AtomicU32>,
    #[cfg(target_os = "espidf")]
    _disconnects: EspSubscription<'static, System>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimStation,
}

#[cfg(not(target_os = "espidf"))]
struct SimStation {
    /// State polls between `connect` and an assigned address.
    latency_polls: u32,
    polls: Cell<u32>,
    associating: bool,
    reject: bool,
    /// Association is refused after this many polls.
    fail_after: Option<u32>,
}

impl WifiAdapter {
    /// Wrap the WiFi driver.  Credentials arrive with the configuration,
    /// through [`ConnectivityPort::set_credentials`].
    #[cfg(target_os = "espidf")]
    pub fn new(wifi: EspWifi<'static>, sysloop: &EspSystemEventLoop) -> Result<Self, EspError> {
        let disconnect_reason = Arc::new(AtomicU32::new(0));
        let reason = disconnect_reason.clone();
        let disconnects = sysloop.subscribe::<WifiEvent, _>(move |event| {
            if let WifiEvent::StaDisconnected(info) = event {
                reason.store(u32::from(info.reason()).max(1), Ordering::Release);
            }
        })?;
        Ok(Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            failed: false,
            wifi,
            disconnect_reason,
            _disconnects: disconnects,
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            failed: false,
            sim: SimStation {
                latency_polls: 2,
                polls: Cell::new(0),
                associating: false,
                reject: false,
                fail_after: None,
            },
        }
    }

    /// Simulation: number of `state()` polls before the station is up.
    #[cfg(not(target_os = "espidf"))]
    pub fn with_sim_latency(mut self, polls: u32) -> Self {
        self.sim.latency_polls = polls;
        self
    }

    /// Simulation: make every association attempt fail.
    #[cfg(not(target_os = "espidf"))]
    pub fn with_sim_rejection(mut self) -> Self {
        self.sim.reject = true;
        self
    }

    /// Simulation: the access point refuses the station after `polls`
    /// state polls, as with a wrong password.
    #[cfg(not(target_os = "espidf"))]
    pub fn with_sim_auth_failure(mut self, polls: u32) -> Self {
        self.sim.fail_after = Some(polls);
        self
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: self
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });
        self.wifi.set_configuration(&config).map_err(|e| {
            error!("WiFi: set_configuration failed: {}", e);
            ConnectivityError::ConnectionFailed
        })?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi.start().map_err(|e| {
                error!("WiFi: start failed: {}", e);
                ConnectivityError::ConnectionFailed
            })?;
        }
        self.disconnect_reason.store(0, Ordering::Release);
        self.wifi.connect().map_err(|e| {
            error!("WiFi: connect failed: {}", e);
            ConnectivityError::ConnectionFailed
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        if self.sim.reject {
            return Err(ConnectivityError::ConnectionFailed);
        }
        self.sim.polls.set(0);
        self.sim.associating = true;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_state(&self) -> WifiState {
        if !self.wifi.is_started().unwrap_or(false) {
            return WifiState::Disconnected;
        }
        if !self.wifi.is_connected().unwrap_or(false) {
            let reason = self.disconnect_reason.load(Ordering::Acquire);
            if reason != 0 {
                error!("WiFi: association refused (reason {})", reason);
                return WifiState::Failed;
            }
            return WifiState::Connecting;
        }
        if self.wifi.is_up().unwrap_or(false) {
            WifiState::Connected
        } else {
            WifiState::WaitingForIp
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_state(&self) -> WifiState {
        if !self.sim.associating {
            return WifiState::Disconnected;
        }
        let polls = self.sim.polls.get();
        if self.sim.fail_after.is_some_and(|n| polls >= n) {
            return WifiState::Failed;
        }
        if polls >= self.sim.latency_polls {
            return WifiState::Connected;
        }
        self.sim.polls.set(polls + 1);
        if polls + 1 == self.sim.latency_polls {
            WifiState::WaitingForIp
        } else {
            WifiState::Connecting
        }
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi: disconnect failed: {}", e);
        }
        if let Err(e) = self.wifi.stop() {
            warn!("WiFi: stop failed: {}", e);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        self.sim.associating = false;
    }

    #[cfg(target_os = "espidf")]
    fn platform_rssi(&self) -> Option<i8> {
        let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
        // SAFETY: plain query of the driver; `ap_info` outlives the call.
        let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        (ret == esp_idf_svc::sys::ESP_OK).then_some(ap_info.rssi)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_rssi(&self) -> Option<i8> {
        (self.platform_state() == WifiState::Connected).then_some(-60)
    }

    #[cfg(target_os = "espidf")]
    fn platform_mac(&self) -> MacAddr {
        self.wifi.sta_netif().get_mac().unwrap_or([0; 6])
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_mac(&self) -> MacAddr {
        [0x02, 0x00, 0x00, 0x00, 0x00, 0x01]
    }

    #[cfg(target_os = "espidf")]
    fn platform_ip(&self) -> Option<Ipv4Addr> {
        self.wifi.sta_netif().get_ip_info().ok().map(|info| info.ip)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_ip(&self) -> Option<Ipv4Addr> {
        Some(Ipv4Addr::LOCALHOST)
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityPort for WifiAdapter {
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid
            .push_str(ssid)
            .map_err(|()| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password
            .push_str(password)
            .map_err(|()| ConnectivityError::InvalidPassword)?;
        info!("WiFi: credentials updated (SSID='{}')", self.ssid);
        Ok(())
    }

    fn connect(&mut self) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        info!("WiFi: connecting to '{}'", self.ssid);
        match self.platform_connect() {
            Ok(()) => {
                self.failed = false;
                Ok(())
            }
            Err(e) => {
                error!("WiFi: connection failed: {}", e);
                self.failed = true;
                Err(e)
            }
        }
    }

    fn state(&self) -> WifiState {
        if self.failed {
            return WifiState::Failed;
        }
        self.platform_state()
    }

    fn disconnect(&mut self) {
        self.platform_disconnect();
        self.failed = false;
        info!("WiFi: disconnected");
    }

    fn signal_strength(&self) -> Option<i8> {
        self.platform_rssi()
    }

    fn local_address(&self) -> MacAddr {
        self.platform_mac()
    }

    fn assigned_address(&self) -> Option<Ipv4Addr> {
        if self.state() != WifiState::Connected {
            return None;
        }
        self.platform_ip()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
