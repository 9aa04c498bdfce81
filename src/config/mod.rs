//! Device configuration.
//!
//! [`DeviceConfig`] is the typed view the rest of the framework reads.  The
//! authoritative copy lives in retained memory as a [`ConfigRecord`]; on a
//! cold boot, or whenever the record's checksum no longer matches, it is
//! rebuilt from the JSON source with every field bounds-checked and
//! defaulted.

pub mod json;
pub mod record;

use heapless::String;
use log::{LevelFilter, info, warn};

use crate::app::ports::ConfigSource;
use crate::error::ConfigError;

pub use json::JsonConfig;
pub use record::ConfigRecord;

/// Well-known location of the JSON source on the device.
pub const CONFIG_PATH: &str = "/littlefs/config.json";

// ── Bounds ────────────────────────────────────────────────────

pub const WATCHDOG_INTERVAL_MIN: u32 = 60;
pub const WATCHDOG_INTERVAL_MAX: u32 = 86_400;
pub const LOG_LEVEL_MAX: u8 = 5;
pub const UDP_MAX_PKT_SIZE_MAX: u16 = 1450;
pub const ESP_NOW_CHANNEL_MAX: u8 = 11;
/// ESP-NOW frames carry at most 250 bytes; two go to the CRC.
pub const ESP_NOW_MAX_PKT_SIZE_MAX: u16 = 248;

/// Core device configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Seconds between watchdog ("still alive") reports.
    pub watchdog_interval: u32,
    /// Name carried in every report.
    pub device_name: String<32>,
    /// Topic prefix of every report.
    pub topic_name: String<32>,
    /// 0 = none, 1 = error, 2 = warn, 3 = info, 4 = debug, 5 = verbose.
    pub log_level: u8,
    pub udp: UdpConfig,
    pub esp_now: EspNowConfig,
}

/// Datagram transport parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpConfig {
    pub port: u16,
    pub max_pkt_size: u16,
    /// Host name or dotted IPv4 address of the gateway.
    pub gateway_address: String<128>,
    pub wifi_ssid: String<32>,
    pub wifi_psw: String<32>,
}

/// Radio (ESP-NOW) transport parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EspNowConfig {
    pub primary_master_key: String<16>,
    pub local_master_key: String<16>,
    /// Gateway SSIDs start with this prefix.
    pub gateway_ssid_prefix: String<16>,
    pub channel: u8,
    pub max_pkt_size: u16,
    pub encryption_enabled: bool,
    pub enable_long_range: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            watchdog_interval: 3600, // hourly
            device_name: truncated("simple-iot"),
            topic_name: truncated("iot"),
            log_level: 3,
            udp: UdpConfig::default(),
            esp_now: EspNowConfig::default(),
        }
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            port: 3333,
            max_pkt_size: 1450,
            gateway_address: truncated("192.168.1.1"),
            wifi_ssid: String::new(),
            wifi_psw: String::new(),
        }
    }
}

impl Default for EspNowConfig {
    fn default() -> Self {
        Self {
            primary_master_key: truncated("pmk1234567890123"),
            local_master_key: truncated("lmk1234567890123"),
            gateway_ssid_prefix: truncated("IOT_GW"),
            channel: 1,
            max_pkt_size: ESP_NOW_MAX_PKT_SIZE_MAX,
            encryption_enabled: false,
            enable_long_range: false,
        }
    }
}

impl DeviceConfig {
    /// Build a configuration from a parsed JSON document, substituting
    /// `defaults` for anything missing or out of bounds.
    pub fn from_json(doc: &JsonConfig, defaults: &DeviceConfig) -> Self {
        let d = defaults;
        let udp = Some("udp");
        let esp_now = Some("esp_now");

        Self {
            log_level: doc.get_integer(None, "log_level", d.log_level.into(), 0, LOG_LEVEL_MAX.into())
                as u8,
            watchdog_interval: doc.get_integer(
                None,
                "watchdog_interval",
                d.watchdog_interval.into(),
                WATCHDOG_INTERVAL_MIN.into(),
                WATCHDOG_INTERVAL_MAX.into(),
            ) as u32,
            device_name: doc.get_string(None, "device_name", &d.device_name),
            topic_name: doc.get_string(None, "topic_name", &d.topic_name),
            udp: UdpConfig {
                port: doc.get_integer(udp, "port", d.udp.port.into(), 1, 65_535) as u16,
                max_pkt_size: doc.get_integer(
                    udp,
                    "max_pkt_size",
                    d.udp.max_pkt_size.into(),
                    2,
                    UDP_MAX_PKT_SIZE_MAX.into(),
                ) as u16,
                gateway_address: doc.get_string(udp, "gateway_address", &d.udp.gateway_address),
                wifi_ssid: doc.get_string(udp, "wifi_ssid", &d.udp.wifi_ssid),
                wifi_psw: doc.get_string(udp, "wifi_psw", &d.udp.wifi_psw),
            },
            esp_now: EspNowConfig {
                encryption_enabled: doc.get_integer(
                    esp_now,
                    "encryption_enabled",
                    d.esp_now.encryption_enabled.into(),
                    0,
                    1,
                ) != 0,
                channel: doc.get_integer(
                    esp_now,
                    "channel",
                    d.esp_now.channel.into(),
                    0,
                    ESP_NOW_CHANNEL_MAX.into(),
                ) as u8,
                max_pkt_size: doc.get_integer(
                    esp_now,
                    "max_pkt_size",
                    d.esp_now.max_pkt_size.into(),
                    1,
                    ESP_NOW_MAX_PKT_SIZE_MAX.into(),
                ) as u16,
                enable_long_range: doc.get_integer(
                    esp_now,
                    "enable_long_range",
                    d.esp_now.enable_long_range.into(),
                    0,
                    1,
                ) != 0,
                primary_master_key: doc.get_string(
                    esp_now,
                    "primary_master_key",
                    &d.esp_now.primary_master_key,
                ),
                local_master_key: doc.get_string(
                    esp_now,
                    "local_master_key",
                    &d.esp_now.local_master_key,
                ),
                gateway_ssid_prefix: doc.get_string(
                    esp_now,
                    "gateway_ssid_prefix",
                    &d.esp_now.gateway_ssid_prefix,
                ),
            },
        }
    }

    /// `log` filter equivalent of [`log_level`](Self::log_level).
    pub fn level_filter(&self) -> LevelFilter {
        match self.log_level {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// Copy as much of `s` as fits in `N` bytes without splitting a character.
pub fn truncated<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

// ── Store ─────────────────────────────────────────────────────

/// Validate the retained record, rebuilding it from `source` when the
/// checksum does not match or `force_rebuild` is set.
///
/// The accepted configuration's log level is applied to the `log` facade.
pub fn init(
    record: &mut ConfigRecord,
    force_rebuild: bool,
    source: &mut impl ConfigSource,
) -> Result<DeviceConfig, ConfigError> {
    let cfg = if !force_rebuild && record.is_valid() {
        info!("Config: retained record valid (crc=0x{:04x})", record.stored_crc());
        record.load()
    } else {
        if force_rebuild {
            info!("Config: rebuilding from {}", CONFIG_PATH);
        } else {
            warn!(
                "Config: retained checksum mismatch (stored=0x{:04x} computed=0x{:04x}), rebuilding",
                record.stored_crc(),
                record.computed_crc()
            );
        }
        rebuild(record, source)?
    };

    log::set_max_level(cfg.level_filter());
    Ok(cfg)
}

/// Unconditionally rebuild `record` from the JSON source.
pub fn rebuild(
    record: &mut ConfigRecord,
    source: &mut impl ConfigSource,
) -> Result<DeviceConfig, ConfigError> {
    let text = source.read_config()?;
    let doc = JsonConfig::parse(&text)?;
    let cfg = DeviceConfig::from_json(&doc, &DeviceConfig::default());
    record.store(&cfg);
    info!(
        "Config: rebuilt for '{}' (crc=0x{:04x})",
        cfg.device_name,
        record.stored_crc()
    );
    Ok(cfg)
}
