//! Fuzz target: `RicRestMsg::decode_with_limit`
//!
//! Any byte string either decodes or returns a `DecodeError`. Decoded
//! fields must respect the payload limit and the 24-bit block position.
//!
//! cargo fuzz run fuzz_ricrest_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use ricxfer::comms::ricrest::{ElementCode, MAX_REST_BODY_SIZE, RicRestMsg};

const LIMIT: usize = 256;

fuzz_target!(|data: &[u8]| {
    let Ok(msg) = RicRestMsg::decode_with_limit(data, LIMIT) else {
        return;
    };
    // Lossy UTF-8 may widen invalid bytes, so allow for replacement chars
    assert!(msg.payload_text().chars().count() <= LIMIT);
    match msg.elem_code() {
        ElementCode::FileBlock => {
            assert!(msg.buffer_pos() <= 0x00ff_ffff);
            assert!(msg.stream_id() <= 0xff);
        }
        ElementCode::Body => {
            assert!(msg.total_bytes() <= MAX_REST_BODY_SIZE);
            assert!(msg.buffer_pos() <= msg.total_bytes());
        }
        _ => {}
    }
});
