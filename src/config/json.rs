//! Bounded field extraction from the JSON configuration source.
//!
//! The source is a flat object with at most one level of nested sections:
//!
//! ```json
//! { "device_name": "porch", "watchdog_interval": 3600,
//!   "esp_now": { "channel": 6, "gateway_ssid_prefix": "GW_" } }
//! ```
//!
//! Every accessor takes a default; a missing, mistyped or out-of-bounds
//! value falls back to it with a warning, so a partial file still yields a
//! complete configuration.

use heapless::String;
use log::{debug, warn};
use serde_json::Value;

use crate::error::ConfigError;

/// Parsed configuration document.
pub struct JsonConfig {
    root: Value,
}

impl JsonConfig {
    /// Parse `text`.  The root must be a JSON object.
    pub fn parse(text: &[u8]) -> Result<Self, ConfigError> {
        let root: Value = serde_json::from_slice(text).map_err(|e| {
            warn!("Config: JSON parse failed: {}", e);
            ConfigError::ParseFailed
        })?;
        if !root.is_object() {
            warn!("Config: JSON root is not an object");
            return Err(ConfigError::ParseFailed);
        }
        Ok(Self { root })
    }

    fn lookup(&self, section: Option<&str>, name: &str) -> Option<&Value> {
        match section {
            Some(sub) => self.root.get(sub)?.get(name),
            None => self.root.get(name),
        }
    }

    /// Integer field within `[min, max]`.
    ///
    /// JSON numbers are truncated toward zero; booleans count as 0 / 1.
    pub fn get_integer(
        &self,
        section: Option<&str>,
        name: &str,
        default: i64,
        min: i64,
        max: i64,
    ) -> i64 {
        let value = match self.lookup(section, name) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64)),
            Some(Value::Bool(b)) => Some(i64::from(*b)),
            _ => None,
        };

        let result = match value {
            Some(v) if (min..=max).contains(&v) => v,
            Some(v) => {
                warn!(
                    "Config: {}{} = {} outside [{}, {}], using default {}",
                    section_prefix(section),
                    name,
                    v,
                    min,
                    max,
                    default
                );
                default
            }
            None => {
                warn!(
                    "Config: {}{} missing, using default {}",
                    section_prefix(section),
                    name,
                    default
                );
                default
            }
        };
        debug!("Config: {}{} = {}", section_prefix(section), name, result);
        result
    }

    /// String field of at most `N` bytes.
    ///
    /// Empty or over-long strings, strings holding a NUL and non-string
    /// values fall back to `default`, which is itself truncated to `N` bytes.
    pub fn get_string<const N: usize>(
        &self,
        section: Option<&str>,
        name: &str,
        default: &str,
    ) -> String<N> {
        let result = match self.lookup(section, name) {
            Some(Value::String(s)) if !s.is_empty() && s.len() <= N && !s.contains('\0') => {
                super::truncated(s)
            }
            Some(Value::String(s)) => {
                warn!(
                    "Config: {}{} length {} not in 1..={} or contains NUL, using default",
                    section_prefix(section),
                    name,
                    s.len(),
                    N
                );
                super::truncated(default)
            }
            _ => {
                warn!(
                    "Config: {}{} missing, using default",
                    section_prefix(section),
                    name
                );
                super::truncated(default)
            }
        };
        debug!("Config: {}{} = '{}'", section_prefix(section), name, result);
        result
    }
}

fn section_prefix(section: Option<&str>) -> SectionPrefix<'_> {
    SectionPrefix(section)
}

struct SectionPrefix<'a>(Option<&'a str>);

impl core::fmt::Display for SectionPrefix<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.0 {
            Some(s) => write!(f, "{s}."),
            None => Ok(()),
        }
    }
}
