//! Fuzz target for event envelope decoding
//!
//! Arbitrary text is decoded as both inbound and outbound events. Decoding
//! must never panic, and anything that decodes must encode again.

#![no_main]

use huddle_proto::{InboundEvent, OutboundEvent, decode, encode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(event) = decode::<InboundEvent>(text) {
        let _ = event.name();
        let _ = event.is_call_signal();
        encode(&event).expect("decoded inbound event encodes");
    }

    if let Ok(event) = decode::<OutboundEvent>(text) {
        let encoded = encode(&event).expect("decoded outbound event encodes");
        let again: OutboundEvent = decode(&encoded).expect("encoded outbound event decodes");
        assert_eq!(again, event);
    }
});
