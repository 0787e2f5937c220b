#![no_main]

use heirloom_core::{recover_signer, verify_detached, SignerId};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First 32 bytes are the digest, the rest the signature.
    if data.len() >= 32 {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&data[..32]);
        let _ = recover_signer(&digest, &data[32..]);
    }

    // Identities arrive as hex strings from clients.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(id) = s.parse::<SignerId>() {
            let _ = verify_detached(b"fuzz", data, &id);
        }
    }
});
