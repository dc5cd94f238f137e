//! Fuzz target for ClientMessage::decode
//!
//! Feeds arbitrary text frames to the inbound decoder to find:
//! - Panics on malformed JSON or wrong payload shapes
//! - Oversized frames that get parsed instead of rejected
//! - Accepted frames that do not survive re-encoding
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use electron_proto::{ClientMessage, MAX_MESSAGE_SIZE};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(message) = ClientMessage::decode(text) else {
        return;
    };

    assert!(text.len() <= MAX_MESSAGE_SIZE, "oversized frame decoded");

    let encoded = message.encode().expect("decoded message must re-encode");
    let again = ClientMessage::decode(&encoded).expect("re-encoded message must decode");
    assert_eq!(again.event_name(), message.event_name());
});
