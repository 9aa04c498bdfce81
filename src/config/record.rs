//! Fixed-layout retained configuration record.
//!
//! The record lives in retained memory and survives deep sleep, but its
//! contents are indeterminate after power loss.  It is trusted only when the
//! trailing CRC-16 matches the bytes that precede it.
//!
//! ```text
//!  off  len  field
//!    0    4  watchdog_interval (u32 LE, seconds)
//!    4   33  device_name       (NUL padded)
//!   37   33  topic_name        (NUL padded)
//!   70    1  log_level
//!   71    2  udp.port          (u16 LE)
//!   73    2  udp.max_pkt_size  (u16 LE)
//!   75  129  udp.gateway_address
//!  204   33  udp.wifi_ssid
//!  237   33  udp.wifi_psw
//!  270   17  esp_now.primary_master_key
//!  287   17  esp_now.local_master_key
//!  304   17  esp_now.gateway_ssid_prefix
//!  321    1  esp_now.channel
//!  322    2  esp_now.max_pkt_size (u16 LE)
//!  324    1  esp_now.encryption_enabled
//!  325    1  esp_now.enable_long_range
//!  326    2  crc16 over bytes 0..326 (u16 LE)
//! ```

use heapless::String;

use super::{DeviceConfig, EspNowConfig, UdpConfig};
use crate::crc;

/// Bytes covered by the checksum.
pub const BODY_LEN: usize = 326;
/// Total record size including the trailing checksum.
pub const RECORD_LEN: usize = BODY_LEN + 2;

/// Raw retained configuration bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ConfigRecord {
    bytes: [u8; RECORD_LEN],
}

impl ConfigRecord {
    pub const ZEROED: Self = Self {
        bytes: [0; RECORD_LEN],
    };

    pub fn from_bytes(bytes: [u8; RECORD_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; RECORD_LEN] {
        &self.bytes
    }

    /// Raw access for fault-injection in tests and for platform loaders.
    pub fn as_bytes_mut(&mut self) -> &mut [u8; RECORD_LEN] {
        &mut self.bytes
    }

    /// Checksum stored in the trailing two bytes.
    pub fn stored_crc(&self) -> u16 {
        u16::from_le_bytes([self.bytes[BODY_LEN], self.bytes[BODY_LEN + 1]])
    }

    /// Checksum recomputed over the body.
    pub fn computed_crc(&self) -> u16 {
        crc::checksum(&self.bytes[..BODY_LEN])
    }

    pub fn is_valid(&self) -> bool {
        self.stored_crc() == self.computed_crc()
    }

    /// Recompute and store the trailing checksum.
    pub fn seal(&mut self) {
        let crc = self.computed_crc().to_le_bytes();
        self.bytes[BODY_LEN..].copy_from_slice(&crc);
    }

    /// Zero the record, encode `cfg` into it and seal it.
    pub fn store(&mut self, cfg: &DeviceConfig) {
        self.bytes = [0; RECORD_LEN];
        let mut w = Writer::new(&mut self.bytes[..BODY_LEN]);
        w.u32(cfg.watchdog_interval);
        w.str(&cfg.device_name, 33);
        w.str(&cfg.topic_name, 33);
        w.u8(cfg.log_level);

        w.u16(cfg.udp.port);
        w.u16(cfg.udp.max_pkt_size);
        w.str(&cfg.udp.gateway_address, 129);
        w.str(&cfg.udp.wifi_ssid, 33);
        w.str(&cfg.udp.wifi_psw, 33);

        w.str(&cfg.esp_now.primary_master_key, 17);
        w.str(&cfg.esp_now.local_master_key, 17);
        w.str(&cfg.esp_now.gateway_ssid_prefix, 17);
        w.u8(cfg.esp_now.channel);
        w.u16(cfg.esp_now.max_pkt_size);
        w.u8(u8::from(cfg.esp_now.encryption_enabled));
        w.u8(u8::from(cfg.esp_now.enable_long_range));
        debug_assert_eq!(w.pos, BODY_LEN);

        self.seal();
    }

    /// Decode the typed view.  Only meaningful when [`is_valid`](Self::is_valid).
    pub fn load(&self) -> DeviceConfig {
        let mut r = Reader::new(&self.bytes[..BODY_LEN]);
        DeviceConfig {
            watchdog_interval: r.u32(),
            device_name: r.str(33),
            topic_name: r.str(33),
            log_level: r.u8(),
            udp: UdpConfig {
                port: r.u16(),
                max_pkt_size: r.u16(),
                gateway_address: r.str(129),
                wifi_ssid: r.str(33),
                wifi_psw: r.str(33),
            },
            esp_now: EspNowConfig {
                primary_master_key: r.str(17),
                local_master_key: r.str(17),
                gateway_ssid_prefix: r.str(17),
                channel: r.u8(),
                max_pkt_size: r.u16(),
                encryption_enabled: r.u8() != 0,
                enable_long_range: r.u8() != 0,
            },
        }
    }
}

impl core::fmt::Debug for ConfigRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConfigRecord")
            .field("stored_crc", &self.stored_crc())
            .field("valid", &self.is_valid())
            .finish()
    }
}

// ── Cursor helpers ────────────────────────────────────────────

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, data: &[u8]) {
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
    }

    fn u8(&mut self, v: u8) {
        self.bytes(&[v]);
    }

    fn u16(&mut self, v: u16) {
        self.bytes(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }

    /// Fixed-width field; the final byte is always left as the NUL terminator.
    fn str(&mut self, s: &str, width: usize) {
        let len = s.len().min(width - 1);
        self.buf[self.pos..self.pos + len].copy_from_slice(&s.as_bytes()[..len]);
        self.pos += width;
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn str<const N: usize>(&mut self, width: usize) -> String<N> {
        let field = &self.buf[self.pos..self.pos + width];
        self.pos += width;
        let end = field.iter().position(|&b| b == 0).unwrap_or(width);
        let text = core::str::from_utf8(&field[..end]).unwrap_or_default();
        super::truncated(text)
    }
}
