//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter    | Implements            | Connects to                  |
//! |------------|-----------------------|------------------------------|
//! | `battery`  | BatteryPort           | Divider enable pin + ADC     |
//! | `espnow`   | RadioLink             | ESP-IDF WiFi STA + ESP-NOW   |
//! | `littlefs` | ConfigSource          | LittleFS `config.json`       |
//! | `log_sink` | EventSink             | Serial log output            |
//! | `nvs`      | StoragePort           | NVS / in-memory store        |
//! | `platform` | PlatformPort, Clock   | Reset/sleep/timer services   |
//! | `wifi`     | ConnectivityPort      | ESP-IDF WiFi STA             |

pub mod battery;
#[cfg(target_os = "espidf")]
pub mod espnow;
pub mod littlefs;
pub mod log_sink;
pub mod nvs;
pub mod platform;
pub mod wifi;
