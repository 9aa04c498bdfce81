//! Mock adapters for integration tests.
//!
//! A simulated clock, a scripted radio link and in-memory config/peer
//! stores.  Everything records what the service asked of it so tests can
//! assert on the whole wake cycle without touching hardware.

use std::cell::RefCell;
use std::rc::Rc;

use heapless::String;
use simple_iot::app::events::AppEvent;
use simple_iot::app::ports::{
    BatteryPort, Clock, ConfigSource, EventSink, MacAddr, PeerCache, PeerParams, PlatformPort,
    RadioLink, ScanResult,
};
use simple_iot::error::{ConfigError, StorageError, TransportError};
use simple_iot::power::WakeSource;
use simple_iot::retained::{BootClass, WakeCause};
use simple_iot::transport::peer::PeerRecord;
use simple_iot::transport::{ConfirmationQueue, SendConfirmation};

/// Wall clock at the first simulated power-on.
pub const EPOCH: i64 = 1_700_000_000;

pub const GATEWAY: MacAddr = [0xAA, 0xBB, 0xCC, 0x00, 0x11, 0x22];
pub const DEVICE_MAC: MacAddr = [0x24, 0x0A, 0xC4, 0x12, 0x34, 0x56];

// ── MockPlatform ──────────────────────────────────────────────

/// Simulated SoC.  `delay_ms` advances both clocks; `deep_sleep` only
/// records the request.
pub struct MockPlatform {
    pub uptime_ms: u64,
    pub wall_ms: i64,
    pub boot: BootClass,
    pub wake: WakeCause,
    pub sleeps: Vec<(u32, WakeSource)>,
}

#[allow(dead_code)]
impl MockPlatform {
    pub fn cold(now_secs: i64) -> Self {
        Self {
            uptime_ms: 0,
            wall_ms: now_secs * 1000,
            boot: BootClass::Cold,
            wake: WakeCause::Other,
            sleeps: Vec::new(),
        }
    }

    pub fn woken(now_secs: i64, wake: WakeCause) -> Self {
        Self {
            boot: BootClass::SleepWake,
            wake,
            ..Self::cold(now_secs)
        }
    }

    pub fn last_sleep(&self) -> Option<(u32, WakeSource)> {
        self.sleeps.last().copied()
    }
}

impl Clock for MockPlatform {
    fn uptime_ms(&self) -> u64 {
        self.uptime_ms
    }

    fn now_secs(&self) -> i64 {
        self.wall_ms.div_euclid(1000)
    }

    fn delay_ms(&mut self, ms: u32) {
        self.uptime_ms += u64::from(ms);
        self.wall_ms += i64::from(ms);
    }
}

impl PlatformPort for MockPlatform {
    fn boot_class(&self) -> BootClass {
        self.boot
    }

    fn wake_cause(&self) -> WakeCause {
        self.wake
    }

    fn free_heap(&self) -> u32 {
        200_000
    }

    fn deep_sleep(&mut self, secs: u32, wake: WakeSource) {
        self.sleeps.push((secs, wake));
    }
}

// ── MockRadioLink ─────────────────────────────────────────────

/// Scripted radio.  `scan` returns `access_points`; every transmitted
/// frame is recorded and, if `deliver` is set, confirmed through the queue.
pub struct MockRadioLink<'q> {
    pub queue: &'q ConfirmationQueue,
    pub access_points: Vec<ScanResult>,
    /// `None`: the callback never fires.
    pub deliver: Option<bool>,
    /// Failed confirmation from this address posted ahead of each real one.
    pub stray: Option<MacAddr>,
    pub frames: Vec<Vec<u8>>,
    pub starts: u32,
    pub scans: u32,
    pub opened: Vec<(MacAddr, u8, bool)>,
    pub closes: u32,
}

#[allow(dead_code)]
impl<'q> MockRadioLink<'q> {
    pub fn new(queue: &'q ConfirmationQueue) -> Self {
        Self {
            queue,
            access_points: Vec::new(),
            deliver: Some(true),
            stray: None,
            frames: Vec::new(),
            starts: 0,
            scans: 0,
            opened: Vec::new(),
            closes: 0,
        }
    }

    /// Link with one matching gateway in range.
    pub fn with_gateway(queue: &'q ConfirmationQueue) -> Self {
        let mut link = Self::new(queue);
        link.access_points = vec![
            ap("NeighbourNet", [0x10; 6], -80),
            ap("IOT_GW-01", GATEWAY, -55),
        ];
        link
    }
}

pub fn ap(ssid: &str, bssid: MacAddr, rssi: i8) -> ScanResult {
    ScanResult {
        ssid: String::try_from(ssid).unwrap(),
        bssid,
        rssi,
    }
}

impl RadioLink for MockRadioLink<'_> {
    fn start(&mut self, _channel: u8, _long_range: bool) -> Result<(), TransportError> {
        self.starts += 1;
        Ok(())
    }

    fn scan(&mut self, _channel: u8) -> Result<Vec<ScanResult>, TransportError> {
        self.scans += 1;
        Ok(self.access_points.clone())
    }

    fn open(&mut self, peer: &PeerParams<'_>) -> Result<(), TransportError> {
        self.opened
            .push((peer.address, peer.channel, peer.local_master_key.is_some()));
        Ok(())
    }

    fn transmit(&mut self, peer: &MacAddr, frame: &[u8]) -> Result<(), TransportError> {
        self.frames.push(frame.to_vec());
        if let Some(stray) = self.stray {
            self.queue.post(SendConfirmation {
                peer: stray,
                delivered: false,
            });
        }
        if let Some(delivered) = self.deliver {
            self.queue.post(SendConfirmation {
                peer: *peer,
                delivered,
            });
        }
        Ok(())
    }

    fn close(&mut self) {
        self.closes += 1;
    }

    fn local_address(&self) -> MacAddr {
        DEVICE_MAC
    }
}

// ── SharedPeerCache ───────────────────────────────────────────

/// Peer cache that outlives one service instance, like NVS across boots.
#[derive(Clone, Default)]
pub struct SharedPeerCache(pub Rc<RefCell<Option<PeerRecord>>>);

impl PeerCache for SharedPeerCache {
    fn get(&self) -> Option<PeerRecord> {
        *self.0.borrow()
    }

    fn set(&mut self, record: &PeerRecord) -> Result<(), StorageError> {
        *self.0.borrow_mut() = Some(*record);
        Ok(())
    }

    fn is_valid(&self) -> bool {
        self.0.borrow().is_some()
    }

    fn invalidate(&mut self) -> Result<(), StorageError> {
        *self.0.borrow_mut() = None;
        Ok(())
    }
}

// ── MemSource ─────────────────────────────────────────────────

/// In-memory JSON configuration.
pub struct MemSource {
    pub text: Result<std::string::String, ConfigError>,
    pub reads: u32,
}

#[allow(dead_code)]
impl MemSource {
    pub fn new(text: &str) -> Self {
        Self {
            text: Ok(text.to_owned()),
            reads: 0,
        }
    }

    pub fn missing() -> Self {
        Self {
            text: Err(ConfigError::FileNotFound),
            reads: 0,
        }
    }
}

impl ConfigSource for MemSource {
    fn read_config(&mut self) -> Result<Vec<u8>, ConfigError> {
        self.reads += 1;
        self.text.clone().map(std::string::String::into_bytes)
    }
}

// ── FixedBattery ──────────────────────────────────────────────

/// Battery at a constant voltage; counts sleep preparations.
pub struct FixedBattery {
    pub volts: f32,
    pub prepared: Rc<RefCell<u32>>,
}

impl BatteryPort for FixedBattery {
    fn read_voltage(&mut self) -> f32 {
        self.volts
    }

    fn prepare_for_deep_sleep(&mut self) {
        *self.prepared.borrow_mut() += 1;
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(&'static str, u32)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::ReportSent { kind, seq } => Some((*kind, *seq)),
                _ => None,
            })
            .collect()
    }

    pub fn failed(&self) -> Vec<(&'static str, TransportError)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::ReportFailed { kind, error, .. } => Some((*kind, *error)),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}
