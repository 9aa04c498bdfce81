//! Simple IoT device framework.
//!
//! A duty-cycled device runs one short awake phase per wake-up: it steps a
//! six-state machine, reports over a pluggable transport and goes back to
//! deep sleep.  Everything that must survive sleep lives in the
//! [`retained`] region.
//!
//! The pure-logic modules build and test on the host.  ESP-IDF code is
//! guarded by `#[cfg(target_os = "espidf")]` within each adapter.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod crc;
pub mod fsm;
pub mod power;
pub mod retained;
pub mod transport;

pub mod error;

pub mod adapters;
