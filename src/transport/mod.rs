//! Reliable reporting transports.
//!
//! | Transport           | Link          | Delivery status                 |
//! |---------------------|---------------|---------------------------------|
//! | [`RadioTransport`]  | ESP-NOW style | async, via [`ConfirmationQueue`]|
//! | [`DatagramTransport`]| UDP over WiFi | synchronous send result        |
//!
//! The service only sees the [`Transport`] trait.

pub mod datagram;
pub mod peer;
pub mod radio;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, warn};
use std::net::Ipv4Addr;

use crate::app::ports::{Clock, MacAddr};
use crate::app::report::MacDisplay;
use crate::config::DeviceConfig;
use crate::error::TransportError;
use crate::retained::{BootClass, RadioRetained};

pub use datagram::DatagramTransport;
pub use radio::RadioTransport;

/// How long `send_msg` waits for a delivery confirmation.
pub const CONFIRMATION_TIMEOUT_MS: u32 = 200;
/// Pending confirmations kept before new ones are dropped.
pub const CONFIRMATION_QUEUE_DEPTH: usize = 5;
const CONFIRMATION_POLL_MS: u32 = 5;

// ───────────────────────────────────────────────────────────────
// Transport contract
// ───────────────────────────────────────────────────────────────

/// Inputs available to [`Transport::init`].
pub struct TransportInit<'a> {
    pub config: &'a DeviceConfig,
    pub boot: BootClass,
    /// Discovery bookkeeping, owned by the radio transport.
    pub radio: &'a mut RadioRetained,
    pub clock: &'a mut dyn Clock,
}

pub trait Transport {
    /// Bring the link up.  Called once per wake.
    fn init(&mut self, ctx: TransportInit<'_>) -> Result<(), TransportError>;

    /// Hand one payload to the link.
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Queue carrying asynchronous delivery status, if this transport has
    /// one, and the peer whose confirmations count.
    fn confirmations(&self) -> Option<(&ConfirmationQueue, MacAddr)> {
        None
    }

    /// Release radio / socket resources before deep sleep.
    fn release_for_suspension(&mut self);

    /// Link-layer identity reported as `mac`.
    fn link_identity(&self) -> MacAddr;

    /// RSSI reported as `rssi` (0 when unknown).
    fn signal_strength(&self) -> i8;

    /// Network address reported as `ip`, for routed transports.
    fn network_address(&self) -> Option<Ipv4Addr> {
        None
    }
}

// ───────────────────────────────────────────────────────────────
// Confirmation queue
// ───────────────────────────────────────────────────────────────

/// Delivery status posted by the link layer's send callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendConfirmation {
    pub peer: MacAddr,
    pub delivered: bool,
}

/// Bounded SPSC channel between the send callback (producer, WiFi task) and
/// the reporting path (consumer, main task).
pub struct ConfirmationQueue {
    channel: Channel<CriticalSectionRawMutex, SendConfirmation, CONFIRMATION_QUEUE_DEPTH>,
}

/// Queue the on-device send callback posts into.
pub static SEND_CONFIRMATIONS: ConfirmationQueue = ConfirmationQueue::new();

impl Default for ConfirmationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfirmationQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Producer side.  Never blocks; drops the confirmation when full.
    pub fn post(&self, confirmation: SendConfirmation) {
        if self.channel.try_send(confirmation).is_err() {
            warn!("Transport: confirmation queue full, message lost");
        }
    }

    /// Discard confirmations left over from earlier sends.
    pub fn drain(&self) -> usize {
        let mut dropped = 0;
        while self.channel.try_receive().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Transport: drained {} stale confirmation(s)", dropped);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    /// Wait up to `timeout_ms` for a confirmation from `peer`.  Confirmations
    /// from other peers are discarded.
    pub fn wait(
        &self,
        clock: &mut dyn Clock,
        peer: &MacAddr,
        timeout_ms: u32,
    ) -> Result<(), TransportError> {
        let start = clock.uptime_ms();
        loop {
            while let Ok(c) = self.channel.try_receive() {
                if c.peer != *peer {
                    debug!("Transport: ignoring confirmation from {}", MacDisplay(&c.peer));
                    continue;
                }
                return if c.delivered {
                    Ok(())
                } else {
                    Err(TransportError::NotDelivered)
                };
            }
            if clock.uptime_ms().saturating_sub(start) >= u64::from(timeout_ms) {
                return Err(TransportError::ConfirmationTimeout);
            }
            clock.delay_ms(CONFIRMATION_POLL_MS);
        }
    }
}
