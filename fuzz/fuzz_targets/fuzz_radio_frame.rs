//! Fuzz target: radio frame decoding
//!
//! Arbitrary received bytes must never panic the decoder, and anything it
//! accepts must re-encode to the identical frame.
//!
//! cargo fuzz run fuzz_radio_frame

#![no_main]

use libfuzzer_sys::fuzz_target;
use simple_iot::transport::radio::{FRAME_OVERHEAD, decode_frame, encode_frame};

fuzz_target!(|data: &[u8]| {
    if let Some(payload) = decode_frame(data) {
        assert_eq!(payload.len() + FRAME_OVERHEAD, data.len());
        assert_eq!(encode_frame(payload), data);
    }

    let frame = encode_frame(data);
    assert_eq!(decode_frame(&frame), Some(data));
});
