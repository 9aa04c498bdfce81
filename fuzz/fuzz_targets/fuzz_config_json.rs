//! Fuzz target: configuration rebuild
//!
//! Drives arbitrary bytes through the JSON parser and the bounded field
//! getters, then stores the result in a retained record and loads it
//! back.  Whatever the input, the accepted configuration must be in
//! bounds and survive the record unchanged.
//!
//! cargo fuzz run fuzz_config_json

#![no_main]

use libfuzzer_sys::fuzz_target;
use simple_iot::config::{
    ConfigRecord, DeviceConfig, ESP_NOW_CHANNEL_MAX, JsonConfig, WATCHDOG_INTERVAL_MAX,
    WATCHDOG_INTERVAL_MIN,
};

fuzz_target!(|data: &[u8]| {
    let Ok(doc) = JsonConfig::parse(data) else {
        return;
    };
    let cfg = DeviceConfig::from_json(&doc, &DeviceConfig::default());

    assert!((WATCHDOG_INTERVAL_MIN..=WATCHDOG_INTERVAL_MAX).contains(&cfg.watchdog_interval));
    assert!(cfg.esp_now.channel <= ESP_NOW_CHANNEL_MAX);
    assert!(!cfg.device_name.is_empty(), "empty names fall back to the default");

    let mut record = ConfigRecord::ZEROED;
    record.store(&cfg);
    assert!(record.is_valid());
    assert_eq!(record.load(), cfg);
});
