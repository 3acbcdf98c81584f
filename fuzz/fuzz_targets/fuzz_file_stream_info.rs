//! Fuzz target: command-frame parsing into `FileStreamMsgInfo` and router
//! query strings.
//!
//! The JSON part of a command frame comes straight from the peer; neither
//! the transfer-verb parser nor the query builder may panic on it.
//!
//! cargo fuzz run fuzz_file_stream_info

#![no_main]

use libfuzzer_sys::fuzz_target;
use ricxfer::comms::ricrest::{ElementCode, RicRestMsg, encode_bytes};
use ricxfer::exchange::query::{query_from_json, request_from_json};
use ricxfer::filestream::FileStreamMsgInfo;

fuzz_target!(|data: &[u8]| {
    let frame = encode_bytes(data, ElementCode::CommandFrame);
    let Ok(msg) = RicRestMsg::decode(&frame) else {
        return;
    };
    let _ = FileStreamMsgInfo::parse(&msg);
    let _ = request_from_json(msg.payload_json());
    let query = query_from_json(msg.payload_json());
    if query.is_empty() {
        return;
    }
    assert!(!query.contains('?'));
    // Escaping keeps every pair to exactly one '='
    for pair in query.split('&') {
        assert_eq!(pair.matches('=').count(), 1, "{}", query);
    }
});
