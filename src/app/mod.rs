//! Application core: duty-cycle orchestration with zero direct I/O.
//!
//! Hardware, radio, storage and time are reached only through the **port
//! traits** in [`ports`]; [`service::IotService`] ties the FSM, the sleep
//! policy and status reporting together over them.

pub mod context;
pub mod events;
pub mod ports;
pub mod report;
pub mod service;
