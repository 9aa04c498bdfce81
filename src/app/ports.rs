//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ IotService (domain)
//! ```
//!
//! Driven adapters (platform, radio, network, storage, filesystem, battery,
//! event sinks) implement these traits.  The
//! [`IotService`](super::service::IotService) and the transports consume
//! them via generics, so the domain core never touches hardware directly.

use std::net::Ipv4Addr;

use heapless::String;

use crate::error::{ConfigError, ConnectivityError, StorageError, TransportError};
use crate::fsm::{State, UserResult};
use crate::power::WakeSource;
use crate::retained::{BootClass, WakeCause};
use crate::transport::peer::PeerRecord;

use super::context::StepContext;

/// 6-byte link-layer (MAC) address.
pub type MacAddr = [u8; 6];

// ───────────────────────────────────────────────────────────────
// Clock / platform port (driven adapter: domain ↔ SoC services)
// ───────────────────────────────────────────────────────────────

/// Time source shared by the service and the transports.
pub trait Clock {
    /// Milliseconds since boot (monotonic).
    fn uptime_ms(&self) -> u64;

    /// Wall-clock seconds.  Survives deep sleep on the ESP32 (RTC-backed).
    fn now_secs(&self) -> i64;

    /// Block the calling task.
    fn delay_ms(&mut self, ms: u32);
}

/// Reset reason, wake cause, heap and deep sleep.
pub trait PlatformPort: Clock {
    fn boot_class(&self) -> BootClass;

    fn wake_cause(&self) -> WakeCause;

    /// Free heap in bytes, reported in every status message.
    fn free_heap(&self) -> u32;

    /// Enter deep sleep.  On the device this does not return; host
    /// implementations record the request and return.
    fn deep_sleep(&mut self, secs: u32, wake: WakeSource);
}

// ───────────────────────────────────────────────────────────────
// Application callback (driving adapter: user code → domain)
// ───────────────────────────────────────────────────────────────

/// Device-specific behaviour, called exactly once per step with the
/// current state.  Must return in bounded time.
pub trait ProcessHandler {
    fn process(&mut self, state: State, ctx: &mut StepContext) -> UserResult;
}

impl<F> ProcessHandler for F
where
    F: FnMut(State, &mut StepContext) -> UserResult,
{
    fn process(&mut self, state: State, ctx: &mut StepContext) -> UserResult {
        self(state, ctx)
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration source port (driven adapter: domain ← filesystem)
// ───────────────────────────────────────────────────────────────

/// Supplies the raw JSON configuration document.
pub trait ConfigSource {
    /// Mount (if needed), read and release the backing file.
    fn read_config(&mut self) -> Result<Vec<u8>, ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// Write operations MUST be atomic: no partial writes on power loss.  The
/// ESP-IDF NVS API guarantees this per commit; in-memory simulation
/// achieves it trivially.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;
}

/// Cached gateway identity for the radio transport.
pub trait PeerCache {
    fn get(&self) -> Option<PeerRecord>;

    fn set(&mut self, record: &PeerRecord) -> Result<(), StorageError>;

    /// The cached record was completely written.
    fn is_valid(&self) -> bool;

    /// Forget the cached gateway.
    fn invalidate(&mut self) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Connectivity port (driven adapter: domain ↔ WiFi station)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connecting,
    WaitingForIp,
    Connected,
    Failed,
}

/// Network association manager used by the datagram transport.
pub trait ConnectivityPort {
    /// Validate and store the station credentials used by `connect`.
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError>;

    /// Start association.  Progress is observed through [`state`](Self::state).
    fn connect(&mut self) -> Result<(), ConnectivityError>;

    fn state(&self) -> WifiState;

    fn is_connected(&self) -> bool {
        self.state() == WifiState::Connected
    }

    fn disconnect(&mut self);

    /// RSSI of the associated access point in dBm.
    fn signal_strength(&self) -> Option<i8>;

    /// Station MAC address.
    fn local_address(&self) -> MacAddr;

    /// Address assigned by DHCP, once connected.
    fn assigned_address(&self) -> Option<Ipv4Addr>;
}

// ───────────────────────────────────────────────────────────────
// Radio link port (driven adapter: domain ↔ ESP-NOW)
// ───────────────────────────────────────────────────────────────

/// One access point seen during a discovery scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub ssid: String<32>,
    pub bssid: MacAddr,
    pub rssi: i8,
}

/// Registration parameters for the gateway peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerParams<'a> {
    pub address: MacAddr,
    pub channel: u8,
    pub primary_master_key: &'a str,
    /// `Some(lmk)` when the link to this peer is encrypted.
    pub local_master_key: Option<&'a str>,
}

/// Connectionless point-to-point radio.
///
/// Delivery status arrives asynchronously: implementations post a
/// [`SendConfirmation`](crate::transport::SendConfirmation) into the
/// confirmation queue they were constructed with.
pub trait RadioLink {
    /// Bring the radio up in station mode on `channel`, without associating.
    fn start(&mut self, channel: u8, long_range: bool) -> Result<(), TransportError>;

    /// Active scan of `channel`.
    fn scan(&mut self, channel: u8) -> Result<Vec<ScanResult>, TransportError>;

    /// Initialise the peer-to-peer layer, register the send callback and
    /// add `peer`.
    fn open(&mut self, peer: &PeerParams<'_>) -> Result<(), TransportError>;

    /// Queue one frame for `peer`.
    fn transmit(&mut self, peer: &MacAddr, frame: &[u8]) -> Result<(), TransportError>;

    /// Tear down the peer-to-peer layer and the radio.
    fn close(&mut self);

    fn local_address(&self) -> MacAddr;
}

// ───────────────────────────────────────────────────────────────
// Battery port (driven adapter: domain ← ADC)
// ───────────────────────────────────────────────────────────────

pub trait BatteryPort {
    /// Battery voltage in volts.
    fn read_voltage(&mut self) -> f32;

    /// Switch off the measurement circuit.
    fn prepare_for_deep_sleep(&mut self);
}
