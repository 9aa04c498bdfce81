//! Point-to-point radio transport with gateway discovery.
//!
//! ```text
//!  init ──▶ cached peer usable? ──yes──▶ open link
//!               │ no (cold boot, invalid cache, earlier failure)
//!               ▼
//!           scan channel ──match──▶ cache peer ──▶ open link
//!               │ none
//!               ▼
//!           failures += 1, GatewayUnreachable { min(f⁴·10, 1 day) }
//! ```
//!
//! Every frame is `crc16_le(payload)` (little-endian) followed by the
//! payload.  Delivery status comes back through the [`ConfirmationQueue`].

use log::{debug, error, info, warn};

use super::{ConfirmationQueue, Transport, TransportInit};
use crate::app::ports::{MacAddr, PeerCache, PeerParams, RadioLink};
use crate::app::report::MacDisplay;
use crate::config::EspNowConfig;
use crate::crc;
use crate::error::TransportError;
use crate::power::discovery_backoff_secs;
use crate::retained::{BootClass, RadioRetained};
use crate::transport::peer::PeerRecord;

/// Bytes prepended to every payload.
pub const FRAME_OVERHEAD: usize = 2;

/// Build the on-air frame for `payload`.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    frame.extend_from_slice(&crc::checksum(payload).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Split and verify a received frame.  Used by gateways and tests.
pub fn decode_frame(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() < FRAME_OVERHEAD {
        return None;
    }
    let (head, payload) = frame.split_at(FRAME_OVERHEAD);
    let stored = u16::from_le_bytes([head[0], head[1]]);
    (stored == crc::checksum(payload)).then_some(payload)
}

/// ESP-NOW style transport.
pub struct RadioTransport<'q, L: RadioLink, C: PeerCache> {
    link: L,
    cache: C,
    confirmations: &'q ConfirmationQueue,
    peer: Option<PeerRecord>,
    max_pkt_size: usize,
    opened: bool,
}

impl<'q, L: RadioLink, C: PeerCache> RadioTransport<'q, L, C> {
    pub fn new(link: L, cache: C, confirmations: &'q ConfirmationQueue) -> Self {
        Self {
            link,
            cache,
            confirmations,
            peer: None,
            max_pkt_size: 0,
            opened: false,
        }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Gateway in use after a successful init.
    pub fn peer(&self) -> Option<PeerRecord> {
        self.peer
    }

    fn discover(
        &mut self,
        cfg: &EspNowConfig,
        radio: &mut RadioRetained,
    ) -> Result<PeerRecord, TransportError> {
        debug!(
            "Radio: scanning channel {} for SSID prefix '{}'",
            cfg.channel, cfg.gateway_ssid_prefix
        );
        let found = self.link.scan(cfg.channel)?;
        debug!("Radio: {} access point(s) seen", found.len());

        if let Some(ap) = found
            .iter()
            .find(|ap| ap.ssid.starts_with(cfg.gateway_ssid_prefix.as_str()))
        {
            info!(
                "Radio: gateway '{}' at {} (rssi {})",
                ap.ssid,
                MacDisplay(&ap.bssid),
                ap.rssi
            );
            radio.reset();
            return Ok(PeerRecord {
                address: ap.bssid,
                rssi: ap.rssi,
            });
        }

        radio.gateway_failures = radio.gateway_failures.saturating_add(1);
        radio.discovery_failed = 1;
        let secs = discovery_backoff_secs(radio.gateway_failures);
        error!(
            "Radio: no gateway matching '{}' (failure {}), retry in {}s",
            cfg.gateway_ssid_prefix, radio.gateway_failures, secs
        );
        if self.cache.is_valid() {
            if let Err(e) = self.cache.invalidate() {
                warn!("Radio: could not drop cached gateway: {}", e);
            }
        }
        self.link.close();
        Err(TransportError::GatewayUnreachable {
            retry_in_secs: secs,
        })
    }
}

impl<L: RadioLink, C: PeerCache> Transport for RadioTransport<'_, L, C> {
    fn init(&mut self, ctx: TransportInit<'_>) -> Result<(), TransportError> {
        let cfg = &ctx.config.esp_now;
        self.max_pkt_size = usize::from(cfg.max_pkt_size);

        if ctx.boot == BootClass::Cold {
            ctx.radio.reset();
        }

        self.link.start(cfg.channel, cfg.enable_long_range)?;

        let cached = if self.cache.is_valid()
            && ctx.radio.discovery_failed == 0
            && ctx.boot != BootClass::Cold
        {
            self.cache.get()
        } else {
            None
        };

        let peer = match cached {
            Some(rec) => {
                debug!("Radio: using cached gateway {}", MacDisplay(&rec.address));
                rec
            }
            None => {
                let rec = self.discover(cfg, ctx.radio)?;
                if let Err(e) = self.cache.set(&rec) {
                    warn!("Radio: could not cache gateway: {}", e);
                }
                rec
            }
        };

        let params = PeerParams {
            address: peer.address,
            channel: cfg.channel,
            primary_master_key: &cfg.primary_master_key,
            local_master_key: cfg
                .encryption_enabled
                .then_some(cfg.local_master_key.as_str()),
        };
        self.link.open(&params)?;

        self.peer = Some(peer);
        self.opened = true;
        info!(
            "Radio: ready, gateway {} on channel {}{}",
            MacDisplay(&peer.address),
            cfg.channel,
            if cfg.encryption_enabled { " (encrypted)" } else { "" }
        );
        Ok(())
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let peer = match (self.opened, self.peer) {
            (true, Some(p)) => p,
            _ => return Err(TransportError::NotInitialized),
        };
        if payload.len() > self.max_pkt_size {
            error!(
                "Radio: cannot send {} bytes, max is {}",
                payload.len(),
                self.max_pkt_size
            );
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: self.max_pkt_size,
            });
        }

        let frame = encode_frame(payload);
        self.link.transmit(&peer.address, &frame).map_err(|e| {
            error!("Radio: transmit failed: {}", e);
            TransportError::SendFailed
        })
    }

    fn confirmations(&self) -> Option<(&ConfirmationQueue, MacAddr)> {
        self.peer.map(|p| (self.confirmations, p.address))
    }

    fn release_for_suspension(&mut self) {
        if self.opened {
            self.link.close();
            self.opened = false;
        }
    }

    fn link_identity(&self) -> MacAddr {
        self.link.local_address()
    }

    fn signal_strength(&self) -> i8 {
        self.peer.map_or(0, |p| p.rssi)
    }
}
