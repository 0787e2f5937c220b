#![no_main]

use heirloom_shamir::{reconstruct_secret, Share};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Share::from_bytes must never panic, and neither may reconstruction
    // from whatever it accepts.
    let Ok(share) = Share::from_bytes(data) else {
        return;
    };
    let _ = reconstruct_secret(std::slice::from_ref(&share));

    // Split the input into two shares to reach interpolation over pairs.
    let mid = data.len() / 2;
    if let (Ok(a), Ok(b)) = (Share::from_bytes(&data[..mid]), Share::from_bytes(&data[mid..])) {
        let _ = reconstruct_secret(&[a, b]);
    }
});
