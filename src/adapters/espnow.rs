//! ESP-NOW radio link.
//!
//! Implements [`RadioLink`] on the ESP-IDF WiFi driver in station mode
//! (never associated) plus `esp_idf_svc::espnow`.  The send callback runs
//! in the WiFi task and posts each delivery status into the
//! [`ConfirmationQueue`] this link was built with.

use esp_idf_svc::espnow::{EspNow, PeerInfo, SendStatus};
use esp_idf_svc::sys::{
    ESP_OK, esp_wifi_set_channel, esp_wifi_set_protocol, wifi_interface_t_WIFI_IF_STA,
    wifi_second_chan_t_WIFI_SECOND_CHAN_NONE, WIFI_PROTOCOL_LR,
};
use esp_idf_svc::wifi::{ClientConfiguration, Configuration, EspWifi, ScanConfig};
use log::{debug, error, info, warn};

use super::wifi::is_valid_ssid;
use crate::app::ports::{MacAddr, PeerParams, RadioLink, ScanResult};
use crate::error::TransportError;
use crate::transport::{ConfirmationQueue, SendConfirmation};

/// Length of ESP-NOW master keys.
const KEY_LEN: usize = 16;

pub struct EspNowLink {
    wifi: EspWifi<'static>,
    espnow: Option<EspNow<'static>>,
    confirmations: &'static ConfirmationQueue,
}

impl EspNowLink {
    pub fn new(wifi: EspWifi<'static>, confirmations: &'static ConfirmationQueue) -> Self {
        Self {
            wifi,
            espnow: None,
            confirmations,
        }
    }
}

fn key(k: &str) -> [u8; KEY_LEN] {
    let mut out = [0u8; KEY_LEN];
    let len = k.len().min(KEY_LEN);
    out[..len].copy_from_slice(&k.as_bytes()[..len]);
    out
}

fn esp_check(ret: i32, what: &'static str) -> Result<(), TransportError> {
    if ret == ESP_OK {
        Ok(())
    } else {
        error!("ESP-NOW: {} failed ({})", what, ret);
        Err(TransportError::HardwareInit(what))
    }
}

impl RadioLink for EspNowLink {
    fn start(&mut self, channel: u8, long_range: bool) -> Result<(), TransportError> {
        self.wifi
            .set_configuration(&Configuration::Client(ClientConfiguration::default()))
            .map_err(|e| {
                error!("ESP-NOW: WiFi configuration failed: {}", e);
                TransportError::HardwareInit("wifi configuration")
            })?;
        self.wifi.start().map_err(|e| {
            error!("ESP-NOW: WiFi start failed: {}", e);
            TransportError::HardwareInit("wifi start")
        })?;

        // SAFETY: the driver is started; plain configuration calls.
        unsafe {
            esp_check(
                esp_wifi_set_channel(channel, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE),
                "set channel",
            )?;
            if long_range {
                esp_check(
                    esp_wifi_set_protocol(wifi_interface_t_WIFI_IF_STA, WIFI_PROTOCOL_LR as u8),
                    "long range",
                )?;
            }
        }
        debug!("ESP-NOW: radio up on channel {} (LR={})", channel, long_range);
        Ok(())
    }

    fn scan(&mut self, channel: u8) -> Result<Vec<ScanResult>, TransportError> {
        let config = ScanConfig {
            channel: Some(channel),
            show_hidden: false,
            ..Default::default()
        };
        self.wifi.start_scan(&config, true).map_err(|e| {
            error!("ESP-NOW: scan failed: {}", e);
            TransportError::SendFailed
        })?;
        let aps = self.wifi.get_scan_result().map_err(|e| {
            error!("ESP-NOW: scan result failed: {}", e);
            TransportError::SendFailed
        })?;

        Ok(aps
            .into_iter()
            .filter(|ap| is_valid_ssid(ap.ssid.as_str()))
            .filter_map(|ap| {
                Some(ScanResult {
                    ssid: heapless::String::try_from(ap.ssid.as_str()).ok()?,
                    bssid: ap.bssid,
                    rssi: ap.signal_strength,
                })
            })
            .collect())
    }

    fn open(&mut self, peer: &PeerParams<'_>) -> Result<(), TransportError> {
        let espnow = EspNow::take().map_err(|e| {
            error!("ESP-NOW: init failed: {}", e);
            TransportError::HardwareInit("esp-now init")
        })?;

        let queue = self.confirmations;
        espnow
            .register_send_cb(move |mac: &[u8], status: SendStatus| {
                let mut addr: MacAddr = [0; 6];
                if mac.len() == addr.len() {
                    addr.copy_from_slice(mac);
                }
                queue.post(SendConfirmation {
                    peer: addr,
                    delivered: matches!(status, SendStatus::SUCCESS),
                });
            })
            .map_err(|e| {
                error!("ESP-NOW: send callback registration failed: {}", e);
                TransportError::HardwareInit("esp-now send callback")
            })?;

        espnow
            .set_pmk(&key(peer.primary_master_key))
            .map_err(|_| TransportError::HardwareInit("esp-now pmk"))?;

        let mut info = PeerInfo {
            peer_addr: peer.address,
            channel: peer.channel,
            ifidx: wifi_interface_t_WIFI_IF_STA,
            encrypt: peer.local_master_key.is_some(),
            ..Default::default()
        };
        if let Some(lmk) = peer.local_master_key {
            info.lmk = key(lmk);
        }
        espnow.add_peer(info).map_err(|e| {
            error!("ESP-NOW: add peer failed: {}", e);
            TransportError::HardwareInit("esp-now add peer")
        })?;

        info!("ESP-NOW: peer registered");
        self.espnow = Some(espnow);
        Ok(())
    }

    fn transmit(&mut self, peer: &MacAddr, frame: &[u8]) -> Result<(), TransportError> {
        let espnow = self.espnow.as_ref().ok_or(TransportError::NotInitialized)?;
        espnow.send(*peer, frame).map_err(|e| {
            warn!("ESP-NOW: send failed: {}", e);
            TransportError::SendFailed
        })
    }

    fn close(&mut self) {
        // Dropping the handle deinitialises ESP-NOW.
        self.espnow = None;
        if let Err(e) = self.wifi.stop() {
            warn!("ESP-NOW: WiFi stop failed: {}", e);
        }
    }

    fn local_address(&self) -> MacAddr {
        self.wifi.sta_netif().get_mac().unwrap_or([0; 6])
    }
}
