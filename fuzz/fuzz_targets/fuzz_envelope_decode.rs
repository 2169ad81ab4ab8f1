#![no_main]

use devbridge::core::envelope::Envelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 16 {
        return;
    }

    if let Ok(envelope) = Envelope::from_bytes(data) {
        if let Ok(serialized) = envelope.to_bytes() {
            let _ = Envelope::from_bytes(&serialized);
        }
    }
});
