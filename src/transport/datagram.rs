//! UDP datagram transport.
//!
//! Stateless: every report is one datagram to the configured gateway.
//! There is no discovery and no asynchronous confirmation; success is the
//! result of `send_to`.  `init` waits for the WiFi association to finish,
//! polling every 500 ms up to a bound.

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use log::{debug, error, info, warn};

use super::{Transport, TransportInit};
use crate::app::ports::{ConnectivityPort, MacAddr, WifiState};
use crate::error::{ConnectivityError, TransportError};

/// Association poll period.
pub const ASSOCIATION_POLL_MS: u32 = 500;
/// Association polls before giving up (30 s).
pub const ASSOCIATION_MAX_POLLS: u32 = 60;

pub struct DatagramTransport<N: ConnectivityPort> {
    net: N,
    socket: Option<UdpSocket>,
    destination: Option<SocketAddr>,
    max_pkt_size: usize,
}

impl<N: ConnectivityPort> DatagramTransport<N> {
    pub fn new(net: N) -> Self {
        Self {
            net,
            socket: None,
            destination: None,
            max_pkt_size: 0,
        }
    }

    pub fn network(&self) -> &N {
        &self.net
    }

    pub fn network_mut(&mut self) -> &mut N {
        &mut self.net
    }

    pub fn destination(&self) -> Option<SocketAddr> {
        self.destination
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    (host, port)
        .to_socket_addrs()
        .map_err(|e| {
            error!("UDP: cannot resolve '{}': {}", host, e);
            TransportError::AddressResolution
        })?
        .find(SocketAddr::is_ipv4)
        .ok_or(TransportError::AddressResolution)
}

impl<N: ConnectivityPort> Transport for DatagramTransport<N> {
    fn init(&mut self, ctx: TransportInit<'_>) -> Result<(), TransportError> {
        let cfg = &ctx.config.udp;
        self.max_pkt_size = usize::from(cfg.max_pkt_size);

        if !self.net.is_connected() {
            self.net.set_credentials(&cfg.wifi_ssid, &cfg.wifi_psw)?;
            self.net.connect()?;
        }

        let mut polls = 0;
        loop {
            match self.net.state() {
                WifiState::Connected => break,
                WifiState::Failed => {
                    error!("UDP: WiFi association failed");
                    return Err(ConnectivityError::ConnectionFailed.into());
                }
                state => {
                    if polls >= ASSOCIATION_MAX_POLLS {
                        error!("UDP: WiFi still {:?} after {} polls", state, polls);
                        return Err(ConnectivityError::Timeout.into());
                    }
                    debug!("UDP: waiting for association ({:?})", state);
                    ctx.clock.delay_ms(ASSOCIATION_POLL_MS);
                    polls += 1;
                }
            }
        }

        let destination = resolve(&cfg.gateway_address, cfg.port)?;
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(|e| {
            error!("UDP: socket bind failed: {}", e);
            TransportError::HardwareInit("udp socket")
        })?;

        info!(
            "UDP: ready, gateway {} (local ip {:?})",
            destination,
            self.net.assigned_address()
        );
        self.socket = Some(socket);
        self.destination = Some(destination);
        Ok(())
    }

    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let (Some(socket), Some(dest)) = (&self.socket, self.destination) else {
            return Err(TransportError::NotInitialized);
        };
        if payload.len() > self.max_pkt_size {
            error!(
                "UDP: cannot send {} bytes, max is {}",
                payload.len(),
                self.max_pkt_size
            );
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max: self.max_pkt_size,
            });
        }
        match socket.send_to(payload, dest) {
            Ok(n) if n == payload.len() => Ok(()),
            Ok(n) => {
                warn!("UDP: short send ({} of {} bytes)", n, payload.len());
                Err(TransportError::SendFailed)
            }
            Err(e) => {
                error!("UDP: send_to {} failed: {}", dest, e);
                Err(TransportError::SendFailed)
            }
        }
    }

    fn release_for_suspension(&mut self) {
        self.socket = None;
        self.net.disconnect();
    }

    fn link_identity(&self) -> MacAddr {
        self.net.local_address()
    }

    fn signal_strength(&self) -> i8 {
        self.net.signal_strength().unwrap_or(0)
    }

    fn network_address(&self) -> Option<Ipv4Addr> {
        self.net.assigned_address()
    }
}
