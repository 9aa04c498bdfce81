//! CRC-16 used for the retained configuration record and radio frames.
//!
//! Matches the ESP32 ROM `crc16_le` (reflected CCITT polynomial, seed and
//! result inverted), so `crc16_le(u16::MAX, data)` equals
//! `esp_crc16_le(UINT16_MAX, data, len)` computed by a gateway running the
//! stock IDF routine.

/// Seed used everywhere in the framework.
pub const SEED: u16 = u16::MAX;

const POLY_REFLECTED: u16 = 0x8408;

/// Little-endian (reflected) CRC-16 with an explicit seed.
pub fn crc16_le(seed: u16, bytes: &[u8]) -> u16 {
    let mut crc = !seed;
    for &b in bytes {
        crc ^= u16::from(b);
        for _ in 0..8 {
            if (crc & 1) != 0 {
                crc = (crc >> 1) ^ POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

/// CRC-16 with the framework seed.
pub fn checksum(bytes: &[u8]) -> u16 {
    crc16_le(SEED, bytes)
}
