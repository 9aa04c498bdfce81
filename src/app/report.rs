//! Status report wire format.
//!
//! ```text
//! <topic>;{name:<dev>,type:<tag>,seq:<n>,dur:<ms>,mac:"<addr>",err:<n>,rssi:<n>,
//!          st:<state>,rst:<state>,heap:<bytes>[,<field>][,vbat:<v>][,ip:"<addr>"]}
//! ```
//!
//! States are sent as their bit values.  The record is built on the stack;
//! the transport enforces its own packet-size limit on top of
//! [`REPORT_CAPACITY`].

use core::fmt::{self, Write};
use std::net::Ipv4Addr;

use heapless::String;

use crate::app::ports::MacAddr;
use crate::error::TransportError;
use crate::fsm::State;

/// Largest report that can be composed (the UDP packet ceiling).
pub const REPORT_CAPACITY: usize = 1450;

/// Everything that goes into one report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportFields<'a> {
    pub topic: &'a str,
    pub device_name: &'a str,
    pub kind: &'a str,
    pub seq: u32,
    pub duration_ms: u32,
    pub mac: MacAddr,
    pub errors: u32,
    pub rssi: i8,
    pub state: State,
    pub return_state: State,
    pub free_heap: u32,
    pub other: Option<&'a str>,
    pub vbat: Option<f32>,
    pub ip: Option<Ipv4Addr>,
}

/// Lower-case, colon separated MAC address.
pub struct MacDisplay<'a>(pub &'a MacAddr);

impl fmt::Display for MacDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl fmt::Display for ReportFields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{};{{name:{},type:{},seq:{},dur:{},mac:\"{}\",err:{},rssi:{},st:{},rst:{},heap:{}",
            self.topic,
            self.device_name,
            self.kind,
            self.seq,
            self.duration_ms,
            MacDisplay(&self.mac),
            self.errors,
            self.rssi,
            self.state.bit(),
            self.return_state.bit(),
            self.free_heap,
        )?;
        if let Some(other) = self.other {
            write!(f, ",{other}")?;
        }
        if let Some(v) = self.vbat {
            write!(f, ",vbat:{v:.2}")?;
        }
        if let Some(ip) = self.ip {
            write!(f, ",ip:\"{ip}\"")?;
        }
        f.write_char('}')
    }
}

struct Counter(usize);

impl Write for Counter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0 += s.len();
        Ok(())
    }
}

/// Serialise `fields`.  Fails without truncating when the record would not
/// fit in [`REPORT_CAPACITY`] bytes.
pub fn compose(fields: &ReportFields<'_>) -> Result<String<REPORT_CAPACITY>, TransportError> {
    let mut counter = Counter(0);
    write!(counter, "{fields}").map_err(|_| TransportError::SendFailed)?;
    if counter.0 > REPORT_CAPACITY {
        return Err(TransportError::PayloadTooLarge {
            len: counter.0,
            max: REPORT_CAPACITY,
        });
    }

    let mut out = String::new();
    write!(out, "{fields}").map_err(|_| TransportError::SendFailed)?;
    Ok(out)
}
