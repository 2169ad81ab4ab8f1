#![no_main]

use devbridge::core::cobs;
use devbridge::core::codec::FrameAssembler;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary wire bytes must never panic the assembler or the decoder
    let mut assembler = FrameAssembler::new();
    for frame in assembler.push(data) {
        if let Ok(payload) = cobs::decode(&frame) {
            assert!(!cobs::encode(&payload).contains(&0));
        }
    }

    // Any payload survives stuffing
    let stuffed = cobs::encode(data);
    assert_eq!(cobs::decode(&stuffed).ok().as_deref(), Some(data));
});
